//! Expands declarative filters into an ordered list of operations.
//!
//! Intermediates (the shared `delta_x` column and `source * delta_x`
//! products) are synthesized on demand, always before the operation that
//! consumes them, so the resulting list can be executed front to back.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::filters::spec::{Align, Coefficients, Dtype, FilterKind, FilterSpec, Operand, Operation, OperationKind};

use std::collections::BTreeMap;
use tracing::debug;

/// Registry key of the x-axis step column.
pub const DELTA_X: &str = "delta_x";

/// Result of one factory run, merged back into the config afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub operations: Vec<Operation>,
    /// Intermediate columns that must not survive column selection.
    pub exclusions: Vec<String>,
    /// Semantic key -> index of the producing operation.
    intermediates: BTreeMap<String, usize>,
}

impl Expansion {
    /// Name of the column produced for `key`, if it was synthesized.
    pub fn intermediate(&self, key: &str) -> Option<&str> {
        self.intermediates
            .get(key)
            .map(|&i| self.operations[i].destination.as_str())
    }
}

pub struct OperatorFactory<'a> {
    x_axis: Option<&'a str>,
    available: &'a [String],
    expansion: Expansion,
}

impl<'a> OperatorFactory<'a> {
    pub fn new(config: &'a Config, available: &'a [String]) -> Self {
        Self {
            x_axis: config.plot.x.as_deref(),
            available,
            expansion: Expansion::default(),
        }
    }

    /// Expand every filter in declared order.
    pub fn expand(mut self, filters: &[FilterSpec]) -> CoreResult<Expansion> {
        for (index, filter) in filters.iter().enumerate() {
            self.add_filter(index, filter)?;
        }
        Ok(self.expansion)
    }

    fn add_filter(&mut self, index: usize, filter: &FilterSpec) -> CoreResult<()> {
        let source = filter.source.as_str();
        let destination = filter.destination();
        let invalid = |reason: &str| CoreError::InvalidFilter {
            index,
            column: source.to_string(),
            reason: reason.to_string(),
        };

        match &filter.kind {
            FilterKind::Lfilter {
                coefficients,
                initial_conditions,
            } => {
                let kind = lfilter(coefficients, initial_conditions.clone()).map_err(|r| invalid(&r))?;
                self.push(source, destination, kind);
            }
            FilterKind::Accumulator {} => {
                self.push(source, destination, running_filter(vec![1.0, -1.0]));
            }
            FilterKind::Integral {} | FilterKind::Differential {} => {
                let delta_x = self.delta_x().map_err(|r| invalid(&r))?;
                let product = self.scaled_by(source, &delta_x);
                let denominator = match filter.kind {
                    FilterKind::Integral {} => vec![1.0, -1.0],
                    _ => vec![1.0, 1.0],
                };
                self.push(&product, destination, running_filter(denominator));
            }
            FilterKind::Average { coefficients, offset } => {
                if coefficients.is_empty() {
                    return Err(invalid("averaging window is empty"));
                }
                let kind = OperationKind::Convolution {
                    window: coefficients.clone(),
                    offset: *offset,
                };
                self.push(source, destination, kind);
            }
            FilterKind::Product { column, constant } => {
                let by = operand(column, constant).map_err(|r| invalid(&r))?;
                self.push(source, destination, OperationKind::Product { by });
            }
            FilterKind::Quotient { column, constant } => {
                let by = operand(column, constant).map_err(|r| invalid(&r))?;
                self.push(source, destination, OperationKind::Quotient { by });
            }
            FilterKind::Sum { column, constant } => {
                let by = operand(column, constant).map_err(|r| invalid(&r))?;
                self.push(source, destination, OperationKind::Sum { by });
            }
            FilterKind::Difference {
                column,
                constant,
                align,
                dtype,
            } => {
                let kind = if column.is_none() && constant.is_none() {
                    let align = align.ok_or_else(|| invalid("row difference requires 'align' (left or right)"))?;
                    OperationKind::AdjacentDifference { align, dtype: *dtype }
                } else {
                    let by = operand(column, constant).map_err(|r| invalid(&r))?;
                    OperationKind::Difference { by }
                };
                self.push(source, destination, kind);
            }
        }
        Ok(())
    }

    fn push(&mut self, source: &str, destination: &str, kind: OperationKind) -> usize {
        debug!(source, destination, kind = kind.name(), "adding operation");
        self.invalidate(destination);
        self.expansion.operations.push(Operation {
            source: source.to_string(),
            destination: destination.to_string(),
            kind,
        });
        self.expansion.operations.len() - 1
    }

    /// Forget intermediates that read or wrote a column about to be overwritten.
    fn invalidate(&mut self, destination: &str) {
        let operations = &self.expansion.operations;
        self.expansion
            .intermediates
            .retain(|_, &mut i| operations[i].source != destination && operations[i].destination != destination);
        // whoever overwrites an intermediate owns the column now
        self.expansion.exclusions.retain(|name| name != destination);
    }

    fn register(&mut self, key: String, index: usize) {
        let name = self.expansion.operations[index].destination.clone();
        self.expansion.exclusions.push(name);
        self.expansion.intermediates.insert(key, index);
    }

    /// Right-aligned step of the x-axis column, computed once per run.
    fn delta_x(&mut self) -> Result<String, String> {
        if let Some(name) = self.expansion.intermediate(DELTA_X) {
            return Ok(name.to_string());
        }

        let x_axis = match self.x_axis {
            Some(x) => x.to_string(),
            None => self
                .available
                .first()
                .cloned()
                .ok_or_else(|| "no x-axis column available to integrate against".to_string())?,
        };

        let name = self.unique_name(DELTA_X);
        let kind = OperationKind::AdjacentDifference {
            align: Align::Right,
            dtype: Some(Dtype::Float64),
        };
        let index = self.push(&x_axis, &name, kind);
        self.register(DELTA_X.to_string(), index);
        Ok(name)
    }

    /// `source * delta_x`, shared between filters on the same source.
    fn scaled_by(&mut self, source: &str, delta_x: &str) -> String {
        let key = format!("{}*{}", source, delta_x);
        if let Some(name) = self.expansion.intermediate(&key) {
            return name.to_string();
        }

        let name = self.unique_name(&key);
        let kind = OperationKind::Product {
            by: Operand::Column(delta_x.to_string()),
        };
        let index = self.push(source, &name, kind);
        self.register(key, index);
        name
    }

    /// `base`, or `base_N` when the name is already taken by a loaded or derived column.
    fn unique_name(&self, base: &str) -> String {
        let taken = |name: &str| {
            self.available.iter().any(|c| c == name)
                || self.expansion.operations.iter().any(|op| op.destination == name)
        };
        if !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}

/// Operations to run for `config`, recording them (and any intermediate
/// exclusions) back into the config.
///
/// A config that already carries `_operations` (e.g. one re-loaded from a
/// serialized run) is used as-is.
pub fn create_data_operators(config: &mut Config, available: &[String]) -> CoreResult<Vec<Operation>> {
    if !config.data.operations.is_empty() {
        debug!(count = config.data.operations.len(), "reusing recorded operations");
        return Ok(config.data.operations.clone());
    }
    if config.data.filters.is_empty() {
        return Ok(Vec::new());
    }

    let expansion = OperatorFactory::new(config, available).expand(&config.data.filters)?;
    config.data.exclude.extend(expansion.exclusions.iter().cloned());
    config.data.operations = expansion.operations.clone();
    Ok(expansion.operations)
}

fn lfilter(coefficients: &Coefficients, initial_conditions: Option<Vec<f64>>) -> Result<OperationKind, String> {
    let Coefficients {
        numerator,
        denominator,
        dtype,
    } = coefficients;

    match denominator.first() {
        None => return Err("denominator is empty".into()),
        Some(a0) if *a0 == 0.0 => return Err("leading denominator coefficient must be non-zero".into()),
        Some(_) => {}
    }
    if numerator.is_empty() {
        return Err("numerator is empty".into());
    }
    if let Some(zi) = &initial_conditions {
        let order = numerator.len().max(denominator.len()) - 1;
        if zi.len() != order {
            return Err(format!(
                "initial_conditions must have {} entries, got {}",
                order,
                zi.len()
            ));
        }
    }

    Ok(OperationKind::Lfilter {
        numerator: numerator.clone(),
        denominator: denominator.clone(),
        initial_conditions,
        dtype: *dtype,
    })
}

/// `y[n] = x[n] - a1 * y[n-1]` with numerator `[1]`.
fn running_filter(denominator: Vec<f64>) -> OperationKind {
    OperationKind::Lfilter {
        numerator: vec![1.0],
        denominator,
        initial_conditions: None,
        dtype: Dtype::Float64,
    }
}

fn operand(column: &Option<String>, constant: &Option<f64>) -> Result<Operand, String> {
    match (column, constant) {
        (Some(c), None) => Ok(Operand::Column(c.clone())),
        (None, Some(k)) => Ok(Operand::Constant(*k)),
        (Some(_), Some(_)) => Err("give either 'column' or 'constant', not both".into()),
        (None, None) => Err("one of 'column' or 'constant' is required".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config_with(x: Option<&str>, filters: serde_json::Value) -> Config {
        let mut tree = json!({"data": {"filters": filters}});
        if let Some(x) = x {
            tree["plot"] = json!({"x": x});
        }
        crate::config::schema::from_tree(&tree).unwrap()
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_filters_no_operations() {
        let mut config = Config::default();
        let ops = create_data_operators(&mut config, &columns(&["a"])).unwrap();
        assert!(ops.is_empty());
        assert!(config.data.exclude.is_empty());
    }

    #[test]
    fn integral_orders_producers_first() {
        let config = config_with(Some("t"), json!([{"source": "v", "destination": "d", "type": "integral"}]));
        let available = columns(&["t", "v"]);
        let expansion = OperatorFactory::new(&config, &available)
            .expand(&config.data.filters)
            .unwrap();

        let ops = &expansion.operations;
        assert_eq!(ops.len(), 3);

        assert_eq!((ops[0].source.as_str(), ops[0].destination.as_str()), ("t", "delta_x"));
        assert_eq!(
            ops[0].kind,
            OperationKind::AdjacentDifference {
                align: Align::Right,
                dtype: Some(Dtype::Float64)
            }
        );

        assert_eq!((ops[1].source.as_str(), ops[1].destination.as_str()), ("v", "v*delta_x"));
        assert_eq!(ops[1].kind, OperationKind::Product { by: Operand::Column("delta_x".into()) });

        assert_eq!((ops[2].source.as_str(), ops[2].destination.as_str()), ("v*delta_x", "d"));
        assert_eq!(ops[2].kind, running_filter(vec![1.0, -1.0]));

        assert_eq!(expansion.exclusions, columns(&["delta_x", "v*delta_x"]));
    }

    #[test]
    fn delta_x_is_shared_between_filters() {
        let config = config_with(
            Some("t"),
            json!([
                {"source": "v", "destination": "d", "type": "integral"},
                {"source": "a", "destination": "j", "type": "differential"},
                {"source": "v", "destination": "d2", "type": "integral"},
            ]),
        );
        let available = columns(&["t", "v", "a"]);
        let expansion = OperatorFactory::new(&config, &available)
            .expand(&config.data.filters)
            .unwrap();

        let producers = expansion
            .operations
            .iter()
            .filter(|op| op.destination == "delta_x")
            .count();
        assert_eq!(producers, 1);

        let products: Vec<_> = expansion
            .operations
            .iter()
            .filter(|op| matches!(op.kind, OperationKind::Product { .. }))
            .map(|op| op.destination.as_str())
            .collect();
        assert_eq!(products, vec!["v*delta_x", "a*delta_x"]);
        assert_eq!(expansion.operations.len(), 6);
        assert_eq!(expansion.operations[4].kind, running_filter(vec![1.0, 1.0]));
    }

    #[test]
    fn delta_x_defaults_to_first_column_and_avoids_collisions() {
        let config = config_with(None, json!([{"source": "v", "type": "integral"}]));
        let available = columns(&["t", "v", "delta_x"]);
        let expansion = OperatorFactory::new(&config, &available)
            .expand(&config.data.filters)
            .unwrap();

        assert_eq!(expansion.operations[0].source, "t");
        assert_eq!(expansion.intermediate(DELTA_X), Some("delta_x_1"));
        assert_eq!(expansion.operations[2].destination, "v");
    }

    #[test]
    fn overwritten_source_recomputes_product() {
        let config = config_with(
            Some("t"),
            json!([
                {"source": "v", "type": "integral"},
                {"source": "v", "destination": "w", "type": "integral"},
            ]),
        );
        let available = columns(&["t", "v"]);
        let expansion = OperatorFactory::new(&config, &available)
            .expand(&config.data.filters)
            .unwrap();

        let products: Vec<_> = expansion
            .operations
            .iter()
            .filter(|op| matches!(op.kind, OperationKind::Product { .. }))
            .map(|op| op.destination.as_str())
            .collect();
        assert_eq!(products, vec!["v*delta_x", "v*delta_x_1"]);
    }

    #[test]
    fn overwritten_delta_x_is_synthesized_again() {
        let config = config_with(
            Some("t"),
            json!([
                {"source": "v", "destination": "d", "type": "integral"},
                {"source": "v", "destination": "delta_x", "type": "product", "constant": 100.0},
                {"source": "w", "destination": "e", "type": "integral"},
            ]),
        );
        let available = columns(&["t", "v", "w"]);
        let expansion = OperatorFactory::new(&config, &available)
            .expand(&config.data.filters)
            .unwrap();

        assert_eq!(expansion.intermediate(DELTA_X), Some("delta_x_1"));
        assert_eq!(expansion.exclusions, columns(&["v*delta_x", "delta_x_1", "w*delta_x_1"]));
        assert_eq!(expansion.operations[5].source, "w");
        assert_eq!(
            expansion.operations[5].kind,
            OperationKind::Product { by: Operand::Column("delta_x_1".into()) }
        );
    }

    #[test]
    fn simple_kinds_expand_to_one_operation() {
        let config = config_with(
            None,
            json!([
                {"source": "a", "type": "accumulator"},
                {"source": "a", "destination": "b", "type": "average", "coefficients": [0.5, 0.5]},
                {"source": "a", "destination": "c", "type": "product", "constant": 2},
                {"source": "a", "destination": "c", "type": "quotient", "column": "b"},
                {"source": "a", "destination": "c", "type": "sum", "constant": 1.5},
                {"source": "a", "destination": "e", "type": "difference", "column": "b"},
                {"source": "a", "destination": "f", "type": "difference", "align": "left", "dtype": "int64"},
            ]),
        );
        let available = columns(&["a", "b"]);
        let expansion = OperatorFactory::new(&config, &available)
            .expand(&config.data.filters)
            .unwrap();

        let kinds: Vec<_> = expansion.operations.iter().map(|op| op.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                running_filter(vec![1.0, -1.0]),
                OperationKind::Convolution {
                    window: vec![0.5, 0.5],
                    offset: 0
                },
                OperationKind::Product { by: Operand::Constant(2.0) },
                OperationKind::Quotient { by: Operand::Column("b".into()) },
                OperationKind::Sum { by: Operand::Constant(1.5) },
                OperationKind::Difference { by: Operand::Column("b".into()) },
                OperationKind::AdjacentDifference {
                    align: Align::Left,
                    dtype: Some(Dtype::Int64)
                },
            ]
        );
        assert!(expansion.exclusions.is_empty());
    }

    #[test]
    fn invalid_filters_are_reported_with_their_index() {
        let cases = [
            json!([{"source": "a", "type": "difference"}]),
            json!([{"source": "a", "type": "product"}]),
            json!([{"source": "a", "type": "sum", "column": "b", "constant": 1}]),
            json!([{"source": "a", "type": "average", "coefficients": []}]),
            json!([{"source": "a", "type": "lfilter", "coefficients": {"numerator": [1], "denominator": [0, 1]}}]),
            json!([{"source": "a", "type": "lfilter",
                    "coefficients": {"numerator": [1, 1], "denominator": [1]},
                    "initial_conditions": [0, 0]}]),
        ];
        for filters in cases {
            let config = config_with(None, filters);
            let available = columns(&["a"]);
            let err = OperatorFactory::new(&config, &available)
                .expand(&config.data.filters)
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidFilter { index: 0, .. }), "{err}");
        }
    }

    #[test]
    fn operations_are_recorded_and_reused() {
        let mut config = config_with(Some("t"), json!([{"source": "v", "type": "integral"}]));
        let available = columns(&["t", "v"]);
        let first = create_data_operators(&mut config, &available).unwrap();
        assert_eq!(config.data.operations, first);
        assert_eq!(config.data.exclude, columns(&["delta_x", "v*delta_x"]));

        let again = create_data_operators(&mut config, &available).unwrap();
        assert_eq!(again, first);
        assert_eq!(config.data.exclude.len(), 2);
    }
}
