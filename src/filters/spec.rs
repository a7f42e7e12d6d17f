//! User-facing filter specifications and the executable operation descriptors
//! they expand into.
//!
//! A filter is declared in `data.filters`:
//! {"source": "Speed", "destination": "Distance", "type": "integral"}
//!
//! An operation is what ends up in `data._operations`:
//! {"source": "Speed", "destination": "_Speed*delta_x", "type": "product", "by": {"column": "delta_x"}}

use serde::{Deserialize, Serialize};

/// One user-declared transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub source: String,

    /// Defaults to `source` (overwrite in place).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    #[serde(flatten)]
    pub kind: FilterKind,
}

impl FilterSpec {
    pub fn destination(&self) -> &str {
        self.destination.as_deref().unwrap_or(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterKind {
    #[serde(alias = "lti", alias = "linear_filter")]
    Lfilter {
        coefficients: Coefficients,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_conditions: Option<Vec<f64>>,
    },
    Accumulator {},
    Integral {},
    Differential {},
    Average {
        coefficients: Vec<f64>,
        #[serde(default)]
        offset: i64,
    },
    Product {
        #[serde(default)]
        column: Option<String>,
        #[serde(default)]
        constant: Option<f64>,
    },
    Quotient {
        #[serde(default)]
        column: Option<String>,
        #[serde(default)]
        constant: Option<f64>,
    },
    Sum {
        #[serde(default)]
        column: Option<String>,
        #[serde(default)]
        constant: Option<f64>,
    },
    Difference {
        #[serde(default)]
        column: Option<String>,
        #[serde(default)]
        constant: Option<f64>,
        #[serde(default)]
        align: Option<Align>,
        #[serde(default)]
        dtype: Option<Dtype>,
    },
}

/// Transfer-function coefficients of a linear filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub numerator: Vec<f64>,
    pub denominator: Vec<f64>,
    #[serde(default)]
    pub dtype: Dtype,
}

/// Numeric type used for coefficients and outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    #[default]
    Float64,
    Float32,
    Int64,
}

impl Dtype {
    /// Round `x` through this type.
    pub fn cast(self, x: f64) -> f64 {
        match self {
            Dtype::Float64 => x,
            Dtype::Float32 => x as f32 as f64,
            Dtype::Int64 => x.trunc(),
        }
    }
}

/// Which edge of a differenced signal is zero-padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    /// `[d0, d1, ..., 0]`
    Left,
    /// `[0, d0, d1, ...]`
    Right,
}

/// Right-hand side of an elementwise operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Column(String),
    Constant(f64),
}

/// Executable form of a filter: always names its input and output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub source: String,
    pub destination: String,

    #[serde(flatten)]
    pub kind: OperationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    Lfilter {
        numerator: Vec<f64>,
        denominator: Vec<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_conditions: Option<Vec<f64>>,
        #[serde(default)]
        dtype: Dtype,
    },
    Convolution {
        window: Vec<f64>,
        #[serde(default)]
        offset: i64,
    },
    /// Row-to-row difference of the source column.
    AdjacentDifference {
        align: Align,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dtype: Option<Dtype>,
    },
    Difference { by: Operand },
    Product { by: Operand },
    Quotient { by: Operand },
    Sum { by: Operand },
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Lfilter { .. } => "lfilter",
            OperationKind::Convolution { .. } => "convolution",
            OperationKind::AdjacentDifference { .. } => "adjacent_difference",
            OperationKind::Difference { .. } => "difference",
            OperationKind::Product { .. } => "product",
            OperationKind::Quotient { .. } => "quotient",
            OperationKind::Sum { .. } => "sum",
        }
    }
}
