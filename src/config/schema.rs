//! Typed shape of the configuration tree and validation of persisted documents.
//!
//! JSON shape of a config file:
//! {
//!   "cdplot": {
//!     "output_path": "~/plots/drive.html",
//!     "data": {
//!       "csv_path": ["trip.csv"],
//!       "include_pattern": ["Engine*"],
//!       "filters": [{"source": "Speed", "type": "integral", "destination": "Distance"}]
//!     },
//!     "plot": {"x": "GPS Time", "y": ["Distance"]}
//!   }
//! }

use crate::error::{CoreError, CoreResult};
use crate::filters::{FilterSpec, Operation};

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level key of a persisted config document.
pub const SECTION: &str = "cdplot";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_path: Option<PathBuf>,
    pub data: DataConfig,
    pub plot: PlotConfig,

    #[serde(rename = "_metadata", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Ingestion and column-selection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    #[serde(deserialize_with = "one_or_many")]
    pub csv_path: Vec<PathBuf>,
    pub session: Option<usize>,

    /// Final column list; when set, selection rules are skipped.
    pub columns: Option<Vec<String>>,
    #[serde(deserialize_with = "one_or_many")]
    pub include: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub exclude: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub include_pattern: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub exclude_pattern: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub require: Vec<String>,

    pub filters: Vec<FilterSpec>,
    #[serde(rename = "_operations")]
    pub operations: Vec<Operation>,

    pub dtype: BTreeMap<String, ColumnType>,
    pub default_type: Option<ColumnType>,
    pub skipinitialspace: bool,
    pub parse_dates: bool,
    pub date_format: Option<String>,
    pub dropna: bool,
    pub dropna_threshold: Option<usize>,
    pub fillna: Option<f64>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            csv_path: Vec::new(),
            session: None,
            columns: None,
            include: Vec::new(),
            exclude: Vec::new(),
            include_pattern: Vec::new(),
            exclude_pattern: Vec::new(),
            require: Vec::new(),
            filters: Vec::new(),
            operations: Vec::new(),
            dtype: BTreeMap::new(),
            default_type: None,
            skipinitialspace: true,
            parse_dates: true,
            date_format: None,
            dropna: false,
            dropna_threshold: None,
            fillna: None,
        }
    }
}

/// Column type hints accepted by `dtype` and `default_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[serde(alias = "float", alias = "float32")]
    Float64,
    #[serde(alias = "int", alias = "int32")]
    Int64,
    #[serde(alias = "timestamp", alias = "datetime64")]
    Datetime,
    #[serde(alias = "str", alias = "string")]
    Text,
}

/// Render parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub x: Option<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub y: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub y2: Vec<String>,

    #[serde(rename = "type")]
    pub kind: PlotKind,
    pub title: Option<String>,

    /// Forwarded to the plot layout.
    pub layout: Map<String, Value>,
    /// Forwarded to every trace.
    pub traces: Map<String, Value>,

    /// Free-form settings (e.g. `key=value` pairs from the command line).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotKind {
    #[default]
    Line,
    Scatter,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// Accept a single value, a list, or `null` for list-valued keys.
fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(v)) => vec![v],
        Some(OneOrMany::Many(v)) => v,
    })
}

#[derive(Deserialize)]
struct Document {
    #[serde(rename = "cdplot")]
    _section: Config,
}

/// Validate a persisted document and return its `cdplot` section untouched,
/// ready to be merged.
pub fn validate_document(document: &Value) -> CoreResult<Value> {
    let Some(root) = document.as_object() else {
        return Err(CoreError::SchemaValidation("document must be an object".into()));
    };
    match root.get(SECTION) {
        Some(Value::Object(_)) => {}
        Some(_) => {
            return Err(CoreError::SchemaValidation(format!("'{}' must be an object", SECTION)));
        }
        None => {
            return Err(CoreError::SchemaValidation(format!("missing required section '{}'", SECTION)));
        }
    }

    Document::deserialize(document).map_err(|e| CoreError::SchemaValidation(e.to_string()))?;
    Ok(root[SECTION].clone())
}

/// Keys that accept a single value in place of a list.
const DATA_LISTS: &[&str] = &[
    "csv_path",
    "include",
    "exclude",
    "include_pattern",
    "exclude_pattern",
    "require",
];
const PLOT_LISTS: &[&str] = &["y", "y2"];

/// Wrap single values of list-valued keys in an array, so that merging
/// concatenates them instead of replacing.
pub fn normalize_lists(section: &mut Value) {
    for (name, keys) in [("data", DATA_LISTS), ("plot", PLOT_LISTS)] {
        let Some(Value::Object(map)) = section.get_mut(name) else {
            continue;
        };
        for key in keys.iter().copied() {
            match map.get_mut(key) {
                Some(value) if !value.is_array() && !value.is_null() => {
                    *value = Value::Array(vec![value.take()]);
                }
                _ => {}
            }
        }
    }
}

/// Build the typed config from a merged tree.
pub fn from_tree(tree: &Value) -> CoreResult<Config> {
    Config::deserialize(tree).map_err(|e| CoreError::SchemaValidation(e.to_string()))
}
