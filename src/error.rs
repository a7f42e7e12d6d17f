//! Error taxonomy for the configuration and derived-column pipeline.
//!
//! Boundary code (ingestion, rendering, the CLI) wraps these in `anyhow`.

use thiserror::Error;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("config does not match the expected schema: {0}")]
    SchemaValidation(String),

    #[error("required columns are not available: {}", .0.join(", "))]
    MissingRequiredColumns(Vec<String>),

    #[error("operation #{index} ({kind} -> '{destination}') references missing column '{column}'")]
    OperationLookup {
        index: usize,
        kind: &'static str,
        destination: String,
        column: String,
    },

    #[error("plot axis {axis} refers to '{column}', which is not among the selected columns")]
    RenderAxis { axis: &'static str, column: String },

    #[error("filter #{index} on '{column}' is invalid: {reason}")]
    InvalidFilter {
        index: usize,
        column: String,
        reason: String,
    },

    #[error("column '{column}' must be {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
    },

    #[error("column '{0}' not found")]
    ColumnNotFound(String),
}
