//! Column selection: reconciles include/exclude rules with required columns.
//!
//! Rules run in a fixed order, each one narrowing or extending a working set:
//! 1) `columns` (verbatim, short-circuits everything else)
//! 2) `include_pattern`
//! 3) `include`
//! 4) `exclude_pattern`
//! 5) `exclude`
//! 6) `require`
//!
//! The result follows the source column order, with columns that were only
//! added back by `require` appended last in `require` order.

pub mod glob;

pub use glob::Glob;

use crate::config::DataConfig;
use crate::error::{CoreError, CoreResult};

use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Decide the final column list and record it in `data.columns`.
pub fn determine_columns(columns: &[String], data: &mut DataConfig) -> CoreResult<Vec<String>> {
    if let Some(explicit) = &data.columns {
        return Ok(explicit.clone());
    }

    let selected = select(columns, data)?;
    debug!(count = selected.len(), "selected columns");
    data.columns = Some(selected.clone());
    Ok(selected)
}

fn select(columns: &[String], data: &DataConfig) -> CoreResult<Vec<String>> {
    let mut working: Option<Vec<&String>> = None;

    // include patterns: pattern order, then source order
    if !data.include_pattern.is_empty() {
        let mut set: Vec<&String> = Vec::new();
        for glob in compile(&data.include_pattern)? {
            for column in columns.iter().filter(|c| glob.matches(c)) {
                if !set.contains(&column) {
                    set.push(column);
                }
            }
        }
        working = Some(set);
    }

    if !data.include.is_empty() {
        let include: BTreeSet<&str> = data.include.iter().map(String::as_str).collect();
        let set = working.get_or_insert_with(Vec::new);
        for column in columns.iter().filter(|c| include.contains(c.as_str())) {
            if !set.contains(&column) {
                set.push(column);
            }
        }

        let missing: Vec<&str> = data
            .include
            .iter()
            .filter(|name| !columns.contains(name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            warn!(
                "some columns were requested in data.include but are not in the csv: {}",
                missing.join(", ")
            );
        }
    }

    if !data.exclude_pattern.is_empty() {
        let globs = compile(&data.exclude_pattern)?;
        let set = working.get_or_insert_with(|| columns.iter().collect());
        set.retain(|c| !globs.iter().any(|g| g.matches(c)));
    }

    if !data.exclude.is_empty() {
        let exclude: BTreeSet<&str> = data.exclude.iter().map(String::as_str).collect();
        let set = working.get_or_insert_with(|| columns.iter().collect());
        set.retain(|c| !exclude.contains(c.as_str()));
    }

    // required columns must exist; they win over any exclusion
    let missing: Vec<String> = data
        .require
        .iter()
        .filter(|name| !columns.contains(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(CoreError::MissingRequiredColumns(missing));
    }

    let Some(set) = working else {
        return Ok(columns.to_vec());
    };

    let mut selected: Vec<String> = columns
        .iter()
        .filter(|c| set.contains(c))
        .cloned()
        .collect();
    for name in &data.require {
        if !selected.contains(name) {
            selected.push(name.clone());
        }
    }
    Ok(selected)
}

fn compile(patterns: &[String]) -> CoreResult<Vec<Glob>> {
    patterns
        .iter()
        .map(|p| {
            Glob::new(p).map_err(|e| CoreError::SchemaValidation(format!("invalid column pattern '{}': {}", p, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn run(columns: &[&str], configure: impl FnOnce(&mut DataConfig)) -> CoreResult<Vec<String>> {
        let mut data = DataConfig::default();
        configure(&mut data);
        determine_columns(&cols(columns), &mut data)
    }

    const ALL: &[&str] = &["a", "b", "c", "a2", "b2"];

    #[test]
    fn no_rules_is_identity() {
        assert_eq!(run(&["a", "b", "c"], |_| {}).unwrap(), cols(&["a", "b", "c"]));
    }

    #[test]
    fn explicit_columns_short_circuit() {
        let out = run(ALL, |d| {
            d.columns = Some(cols(&["b2", "a"]));
            d.exclude = cols(&["a"]);
        });
        assert_eq!(out.unwrap(), cols(&["b2", "a"]));
    }

    #[test]
    fn includes() {
        assert_eq!(run(&["a", "b", "c"], |d| d.include = cols(&["c"])).unwrap(), cols(&["c"]));
        assert_eq!(run(&["a", "b", "c"], |d| d.include = cols(&["d"])).unwrap(), Vec::<String>::new());
        assert_eq!(run(&["a", "b", "c"], |d| d.include = cols(&["b", "a"])).unwrap(), cols(&["a", "b"]));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn unavailable_includes_are_warned_about() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .finish();

        let out = tracing::subscriber::with_default(subscriber, || {
            run(&["a", "b", "c"], |d| d.include = cols(&["a", "d", "e"]))
        });
        assert_eq!(out.unwrap(), cols(&["a"]));

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("not in the csv: d, e"), "{logs}");
    }

    #[test]
    fn include_patterns() {
        assert_eq!(run(ALL, |d| d.include_pattern = cols(&["*"])).unwrap(), cols(ALL));
        assert_eq!(run(ALL, |d| d.include_pattern = cols(&["a*"])).unwrap(), cols(&["a", "a2"]));
        assert_eq!(run(ALL, |d| d.include_pattern = cols(&["a*", "c"])).unwrap(), cols(&["a", "c", "a2"]));
    }

    #[test]
    fn exclude_patterns() {
        assert_eq!(run(ALL, |d| d.exclude_pattern = cols(&["*"])).unwrap(), Vec::<String>::new());
        assert_eq!(run(ALL, |d| d.exclude_pattern = cols(&["a*"])).unwrap(), cols(&["b", "c", "b2"]));
        assert_eq!(run(ALL, |d| d.exclude_pattern = cols(&["a*", "c"])).unwrap(), cols(&["b", "b2"]));
    }

    #[test]
    fn include_and_exclude() {
        let out = run(ALL, |d| {
            d.include = cols(&["a"]);
            d.exclude = cols(&["b"]);
        });
        assert_eq!(out.unwrap(), cols(&["a"]));

        let out = run(ALL, |d| {
            d.include = cols(&["a"]);
            d.exclude = cols(&["a"]);
        });
        assert_eq!(out.unwrap(), Vec::<String>::new());

        let out = run(ALL, |d| {
            d.include_pattern = cols(&["a*"]);
            d.exclude = cols(&["a"]);
        });
        assert_eq!(out.unwrap(), cols(&["a2"]));

        let out = run(ALL, |d| {
            d.include = cols(&["a", "b", "b2"]);
            d.exclude_pattern = cols(&["b*"]);
        });
        assert_eq!(out.unwrap(), cols(&["a"]));

        let out = run(ALL, |d| {
            d.include_pattern = cols(&["a*"]);
            d.include = cols(&["b", "c"]);
            d.exclude_pattern = cols(&["b*"]);
            d.exclude = cols(&["c"]);
        });
        assert_eq!(out.unwrap(), cols(&["a", "a2"]));
    }

    #[test]
    fn require_alone_keeps_everything() {
        assert_eq!(run(ALL, |d| d.require = cols(&["a"])).unwrap(), cols(ALL));
    }

    #[test]
    fn require_extends_includes() {
        let out = run(ALL, |d| {
            d.include = cols(&["a"]);
            d.require = cols(&["b"]);
        });
        assert_eq!(out.unwrap(), cols(&["a", "b"]));
    }

    #[test]
    fn require_overrides_exclusion_and_goes_last() {
        let out = run(ALL, |d| {
            d.exclude_pattern = cols(&["a*"]);
            d.require = cols(&["a2", "a"]);
        });
        assert_eq!(out.unwrap(), cols(&["b", "c", "b2", "a2", "a"]));
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let err = run(ALL, |d| d.require = cols(&["z", "a", "y"])).unwrap_err();
        assert_eq!(err, CoreError::MissingRequiredColumns(cols(&["z", "y"])));
    }

    #[test]
    fn result_is_recorded_in_config() {
        let mut data = DataConfig {
            exclude: cols(&["b"]),
            ..DataConfig::default()
        };
        let out = determine_columns(&cols(&["a", "b"]), &mut data).unwrap();
        assert_eq!(data.columns, Some(out));

        // a second pass honours the recorded decision
        data.exclude.clear();
        assert_eq!(determine_columns(&cols(&["a", "b"]), &mut data).unwrap(), cols(&["a"]));
    }

    #[test]
    fn bad_pattern_is_reported() {
        let err = run(ALL, |d| d.include_pattern = cols(&["[z-a]"])).unwrap_err();
        assert!(matches!(err, CoreError::SchemaValidation(_)));
    }
}
