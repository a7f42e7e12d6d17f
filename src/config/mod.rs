//! Configuration layers: built-in defaults < config file < command line.

pub mod merge;
pub mod schema;

pub use merge::merge_configs;
pub use schema::{ColumnType, Config, DataConfig, PlotConfig, PlotKind};

use crate::Result;
use crate::error::{CoreError, CoreResult};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The built-in defaults as a mergeable tree.
pub fn default_tree() -> CoreResult<Value> {
    serde_json::to_value(Config::default()).map_err(|e| CoreError::SchemaValidation(e.to_string()))
}

/// Read and validate a config file, returning its `cdplot` section.
pub fn load_file(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("read config file {}", path.display()))?;
    let document: Value =
        serde_json::from_str(&text).with_context(|| format!("parse config file {}", path.display()))?;
    let section = schema::validate_document(&document).with_context(|| format!("validate config file {}", path.display()))?;
    debug!(path = %path.display(), "loaded config file");
    Ok(section)
}

/// Merge the layers in precedence order, then normalize.
pub fn resolve(defaults: &Value, file: Option<&Value>, overrides: Option<&Value>) -> CoreResult<Config> {
    let mut tree = defaults.clone();
    for layer in [file, overrides].into_iter().flatten() {
        let mut layer = layer.clone();
        schema::normalize_lists(&mut layer);
        tree = merge_configs(&tree, &layer);
    }

    let mut config = schema::from_tree(&tree)?;
    normalize_config(&mut config);
    Ok(config)
}

/// Defaults, optional file, then command-line overrides.
pub fn process_config(config_file: Option<&Path>, overrides: &Overrides) -> Result<Config> {
    let defaults = default_tree()?;
    let file = config_file.map(load_file).transpose()?;
    let config = resolve(&defaults, file.as_ref(), Some(&overrides.to_tree()))?;
    Ok(config)
}

/// Expand paths and make the x-axis a required column.
pub fn normalize_config(config: &mut Config) {
    config.data.csv_path = config.data.csv_path.iter().map(PathBuf::as_path).map(expand_path).collect();
    if let Some(path) = &config.output_path {
        config.output_path = Some(expand_path(path));
    }

    // required columns always win over exclusions, so the x-axis survives selection
    if let Some(x) = &config.plot.x {
        config.data.require.retain(|name| name != x);
        config.data.require.insert(0, x.clone());
    }
}

fn expand_path(path: &Path) -> PathBuf {
    let expanded = match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    };
    std::path::absolute(&expanded).unwrap_or(expanded)
}

/// Serialize a config as a re-loadable document, stamped with render metadata.
pub fn serialize_config(config: &Config) -> CoreResult<String> {
    let mut config = config.clone();
    let mut metadata = match config.metadata.take() {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    metadata.insert(
        "rendered".into(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    metadata.insert("versions".into(), json!({ "cdplot": env!("CARGO_PKG_VERSION") }));
    config.metadata = Some(Value::Object(metadata));

    let section = serde_json::to_value(&config).map_err(|e| CoreError::SchemaValidation(e.to_string()))?;
    let mut document = Map::new();
    document.insert(schema::SECTION.to_string(), section);
    serde_json::to_string_pretty(&document).map_err(|e| CoreError::SchemaValidation(e.to_string()))
}

/// Command-line settings, routed into the root, `data` and `plot` sections.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub output_path: Option<PathBuf>,

    pub csv_path: Vec<PathBuf>,
    pub session: Option<usize>,
    pub columns: Option<Vec<String>>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub include_pattern: Vec<String>,
    pub exclude_pattern: Vec<String>,
    pub default_type: Option<String>,
    pub dropna: Option<bool>,
    pub dropna_threshold: Option<usize>,
    pub fillna: Option<f64>,

    pub x: Option<String>,
    pub y: Option<Vec<String>>,
    pub y2: Option<Vec<String>>,
    /// Free-form `key=value` plot settings.
    pub plot: Vec<(String, String)>,
}

impl Overrides {
    /// Override layer containing only what was actually set.
    pub fn to_tree(&self) -> Value {
        let mut root = Map::new();
        if let Some(p) = &self.output_path {
            root.insert("output_path".into(), Value::String(p.to_string_lossy().into_owned()));
        }

        let mut data = Map::new();
        let lists = [
            ("include", &self.include),
            ("exclude", &self.exclude),
            ("include_pattern", &self.include_pattern),
            ("exclude_pattern", &self.exclude_pattern),
        ];
        if !self.csv_path.is_empty() {
            let paths = self
                .csv_path
                .iter()
                .map(|p| Value::String(p.to_string_lossy().into_owned()))
                .collect();
            data.insert("csv_path".into(), Value::Array(paths));
        }
        insert_opt(&mut data, "session", &self.session);
        insert_opt(&mut data, "columns", &self.columns);
        for (key, values) in lists {
            if !values.is_empty() {
                data.insert(key.into(), json!(values));
            }
        }
        insert_opt(&mut data, "default_type", &self.default_type);
        insert_opt(&mut data, "dropna", &self.dropna);
        insert_opt(&mut data, "dropna_threshold", &self.dropna_threshold);
        insert_opt(&mut data, "fillna", &self.fillna);

        let mut plot: Map<String, Value> = self
            .plot
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        insert_opt(&mut plot, "x", &self.x);
        insert_opt(&mut plot, "y", &self.y);
        insert_opt(&mut plot, "y2", &self.y2);

        if !data.is_empty() {
            root.insert("data".into(), Value::Object(data));
        }
        if !plot.is_empty() {
            root.insert("plot".into(), Value::Object(plot));
        }
        Value::Object(root)
    }
}

fn insert_opt<T: serde::Serialize>(map: &mut Map<String, Value>, key: &str, value: &Option<T>) {
    if let Some(v) = value {
        map.insert(key.to_string(), serde_json::to_value(v).unwrap_or(Value::Null));
    }
}
