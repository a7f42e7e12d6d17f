//! CSV ingestion: split files into sessions, parse typed columns, then apply
//! the configured missing-value policy.

pub mod session;

pub use session::{Session, split_sessions};

use crate::Result;
use crate::config::{ColumnType, DataConfig};
use crate::table::{Column, Table};

use anyhow::{Context, anyhow, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, Trim};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Cells read as "no value".
const NA_VALUES: &[&str] = &["", "-", "NA", "N/A", "NaN", "nan", "null", "NULL"];

const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d-%b-%Y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
];

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%b-%Y"];

/// Load every configured file into one table.
///
/// With `session` set only that session (counted across all files) is
/// parsed; otherwise all sessions are concatenated row-wise.
pub fn load_from_csv(data: &DataConfig) -> Result<Table> {
    if data.csv_path.is_empty() {
        bail!("nothing to plot: no csv_path configured");
    }

    let mut sessions: Vec<(&Path, Session)> = Vec::new();
    for path in &data.csv_path {
        let text = fs::read_to_string(path).with_context(|| format!("read csv file {}", path.display()))?;
        let found = split_sessions(&text)?;
        debug!(path = %path.display(), sessions = found.len(), "split csv file");
        sessions.extend(found.into_iter().map(|s| (path.as_path(), s)));
    }
    if sessions.is_empty() {
        bail!("nothing to plot: no header row found in the csv input");
    }

    let chosen = match data.session {
        Some(index) => {
            let count = sessions.len();
            let picked = sessions
                .into_iter()
                .nth(index)
                .ok_or_else(|| anyhow!("session {} requested but only {} found", index, count))?;
            vec![picked]
        }
        None => sessions,
    };
    if chosen.len() > 1 {
        info!(sessions = chosen.len(), "concatenating sessions");
    }

    let mut table = Table::new();
    for (path, session) in chosen {
        let at = || format!("session at {}:{}", path.display(), session.header_line);
        let part = parse_session(&session.text, data).with_context(|| format!("parse {}", at()))?;
        table.append(part).with_context(|| format!("concatenate {}", at()))?;
    }

    apply_missing_policy(&mut table, data);
    debug!(rows = table.num_rows(), columns = table.num_columns(), "loaded table");
    Ok(table)
}

fn parse_session(text: &str, data: &DataConfig) -> Result<Table> {
    let trim = if data.skipinitialspace { Trim::All } else { Trim::None };
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(trim)
        .from_reader(text.as_bytes());

    let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];
    for record in reader.records() {
        let record = record?;
        for (i, column) in cells.iter_mut().enumerate() {
            column.push(record.get(i).unwrap_or("").to_string());
        }
    }

    let mut table = Table::new();
    for (name, raw) in names.into_iter().zip(cells) {
        let hint = data.dtype.get(&name).copied().or(data.default_type);
        let column = parse_column(&raw, hint, data).with_context(|| format!("column '{}'", name))?;
        table.insert(name, column);
    }
    Ok(table)
}

fn parse_column(raw: &[String], hint: Option<ColumnType>, data: &DataConfig) -> Result<Column> {
    let format = data.date_format.as_deref();
    let kind = hint.unwrap_or_else(|| infer(raw, data));

    let column = match kind {
        ColumnType::Int64 => Column::Int(
            raw.iter()
                .map(|s| s.parse::<i64>().map_err(|_| anyhow!("'{}' is not an integer", s)))
                .collect::<Result<_>>()?,
        ),
        ColumnType::Float64 => Column::Float(
            raw.iter()
                .map(|s| parse_float(s).ok_or_else(|| anyhow!("'{}' is not a number", s)))
                .collect::<Result<_>>()?,
        ),
        ColumnType::Datetime => Column::Timestamp(
            raw.iter()
                .map(|s| parse_timestamp(s, format).ok_or_else(|| anyhow!("'{}' is not a timestamp", s)))
                .collect::<Result<_>>()?,
        ),
        ColumnType::Text => Column::Text(raw.to_vec()),
    };
    Ok(column)
}

/// int64, then float64, then datetime (when enabled), then text.
fn infer(raw: &[String], data: &DataConfig) -> ColumnType {
    let present: Vec<&str> = raw.iter().map(String::as_str).filter(|s| !is_na(s)).collect();
    if present.is_empty() {
        return ColumnType::Float64;
    }
    let complete = present.len() == raw.len();

    if complete && present.iter().all(|s| s.parse::<i64>().is_ok()) {
        ColumnType::Int64
    } else if present.iter().all(|s| s.parse::<f64>().is_ok()) {
        ColumnType::Float64
    } else if data.parse_dates
        && complete
        && present
            .iter()
            .all(|s| parse_timestamp(s, data.date_format.as_deref()).is_some())
    {
        ColumnType::Datetime
    } else {
        ColumnType::Text
    }
}

fn is_na(cell: &str) -> bool {
    NA_VALUES.contains(&cell.trim())
}

fn parse_float(cell: &str) -> Option<f64> {
    if is_na(cell) {
        return Some(f64::NAN);
    }
    cell.trim().parse().ok()
}

pub fn parse_timestamp(cell: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    let cell = cell.trim();
    let midnight = |d: NaiveDate| d.and_hms_opt(0, 0, 0);

    if let Some(fmt) = format {
        return NaiveDateTime::parse_from_str(cell, fmt)
            .ok()
            .or_else(|| NaiveDate::parse_from_str(cell, fmt).ok().and_then(midnight));
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(cell) {
        return Some(t.naive_utc());
    }
    DATETIME_LAYOUTS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(cell, f).ok())
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(cell, f).ok())
                .and_then(midnight)
        })
}

/// `dropna` wins over `fillna`.
fn apply_missing_policy(table: &mut Table, data: &DataConfig) {
    if data.dropna {
        let width = table.num_columns();
        let keep: Vec<bool> = (0..table.num_rows())
            .map(|row| {
                let present = table.iter().filter(|(_, c)| !c.is_missing(row)).count();
                present >= data.dropna_threshold.unwrap_or(width)
            })
            .collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        table.retain_rows(&keep);
        debug!(dropped, "dropped rows with missing values");
    } else if let Some(value) = data.fillna {
        table.fill_missing(value);
    }
}
