use crate::error::{CoreError, CoreResult};
use crate::filters::signal;
use crate::filters::spec::{Align, Dtype, Operand, Operation, OperationKind};
use crate::table::{Column, Table};

use chrono::TimeDelta;
use tracing::debug;

/// Apply `operations` in order, writing one column per operation.
///
/// Each operation only reads columns that exist at that point (loaded
/// columns or earlier destinations); a missing column aborts the pass.
pub fn process_data<'t>(table: &'t mut Table, operations: &[Operation]) -> CoreResult<&'t mut Table> {
    for (index, op) in operations.iter().enumerate() {
        let column = run(table, index, op)?;
        debug!(
            index,
            kind = op.kind.name(),
            source = %op.source,
            destination = %op.destination,
            "applied operation"
        );
        table.insert(op.destination.clone(), column);
    }
    Ok(table)
}

fn run(table: &Table, index: usize, op: &Operation) -> CoreResult<Column> {
    let lookup = |name: &str| {
        table.column(name).ok_or_else(|| CoreError::OperationLookup {
            index,
            kind: op.kind.name(),
            destination: op.destination.clone(),
            column: name.to_string(),
        })
    };
    let source = lookup(&op.source)?;

    match &op.kind {
        OperationKind::Lfilter {
            numerator,
            denominator,
            initial_conditions,
            dtype,
        } => {
            let b: Vec<f64> = numerator.iter().map(|&v| dtype.cast(v)).collect();
            let a: Vec<f64> = denominator.iter().map(|&v| dtype.cast(v)).collect();
            if a.first().is_none_or(|&a0| a0 == 0.0) {
                return Err(CoreError::InvalidFilter {
                    index,
                    column: op.source.clone(),
                    reason: "leading denominator coefficient must be non-zero".into(),
                });
            }
            let x = numeric(&op.source, source)?;
            let y = signal::lfilter(&b, &a, &x, initial_conditions.as_deref());
            Ok(typed(y, Some(*dtype)))
        }
        OperationKind::Convolution { window, offset } => {
            let x = numeric(&op.source, source)?;
            Ok(Column::Float(signal::convolve_same(&x, window, *offset)))
        }
        OperationKind::AdjacentDifference { align, dtype } => adjacent(&op.source, source, *align, *dtype),
        OperationKind::Difference { by } => elementwise(&op.source, source, by, lookup, |a, b| a - b),
        OperationKind::Product { by } => elementwise(&op.source, source, by, lookup, |a, b| a * b),
        OperationKind::Quotient { by } => elementwise(&op.source, source, by, lookup, |a, b| a / b),
        OperationKind::Sum { by } => elementwise(&op.source, source, by, lookup, |a, b| a + b),
    }
}

fn numeric(name: &str, column: &Column) -> CoreResult<Vec<f64>> {
    column.to_f64().ok_or_else(|| CoreError::TypeMismatch {
        column: name.to_string(),
        expected: "numeric",
    })
}

fn elementwise<'c, L>(name: &str, source: &Column, by: &Operand, lookup: L, f: fn(f64, f64) -> f64) -> CoreResult<Column>
where
    L: Fn(&str) -> CoreResult<&'c Column>,
{
    let x = numeric(name, source)?;
    let out = match by {
        Operand::Constant(k) => x.iter().map(|&a| f(a, *k)).collect(),
        Operand::Column(other) => {
            let y = numeric(other, lookup(other)?)?;
            x.iter().zip(&y).map(|(&a, &b)| f(a, b)).collect()
        }
    };
    Ok(Column::Float(out))
}

/// Row-to-row difference. Integer columns stay integer unless a float dtype is
/// requested; timestamp steps are expressed in hours.
fn adjacent(name: &str, column: &Column, align: Align, dtype: Option<Dtype>) -> CoreResult<Column> {
    let sub = |a: f64, b: f64| a - b;
    match column {
        Column::Int(v) if matches!(dtype, None | Some(Dtype::Int64)) => Ok(Column::Int(signal::adjacent_difference(
            v,
            align,
            0,
            i64::wrapping_sub,
        ))),
        Column::Int(_) | Column::Float(_) => {
            let x = numeric(name, column)?;
            Ok(typed(signal::adjacent_difference(&x, align, 0.0, sub), dtype))
        }
        Column::Timestamp(v) => {
            let hour = TimeDelta::hours(1).num_milliseconds() as f64;
            let hours: Vec<f64> = match v.first() {
                Some(&t0) => v.iter().map(|&t| (t - t0).num_milliseconds() as f64 / hour).collect(),
                None => Vec::new(),
            };
            Ok(typed(signal::adjacent_difference(&hours, align, 0.0, sub), dtype))
        }
        Column::Text(_) => Err(CoreError::TypeMismatch {
            column: name.to_string(),
            expected: "numeric or datetime",
        }),
    }
}

fn typed(values: Vec<f64>, dtype: Option<Dtype>) -> Column {
    match dtype {
        None | Some(Dtype::Float64) => Column::Float(values),
        Some(Dtype::Float32) => Column::Float(values.into_iter().map(|v| Dtype::Float32.cast(v)).collect()),
        Some(Dtype::Int64) => Column::Int(values.into_iter().map(|v| v as i64).collect()),
    }
}
