//! Session splitting.
//!
//! A logger may restart mid-file and write a fresh header row, possibly with
//! different columns. Every header starts a new session; a line is a header
//! when none of its fields looks numeric.

use crate::Result;

use regex::Regex;
use tracing::{debug, warn};

/// Matches a comma-delimited numeric field.
const NUMERIC_FIELD_RE: &str = r#"(,\s?-?\d+([\.,]\d*)?([eE]\d+[\.,]?\d*)?,)+"#;

/// One header line plus the data rows that follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// 1-based line of the header in its file.
    pub header_line: usize,
    pub text: String,
}

fn is_header(numeric: &Regex, line: &str) -> bool {
    // pad so the first and last fields are comma-delimited too
    !numeric.is_match(&format!(",{},", line.trim_end()))
}

/// Logger quirk: infinity is written as a glyph (sometimes mis-encoded).
pub fn fix_torque_data(line: &str) -> String {
    line.replace("âˆž", "inf").replace('∞', "inf")
}

pub fn split_sessions(text: &str) -> Result<Vec<Session>> {
    let numeric = Regex::new(NUMERIC_FIELD_RE)?;
    let mut sessions: Vec<Session> = Vec::new();
    let mut orphaned = 0usize;

    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line = fix_torque_data(line);

        if is_header(&numeric, &line) {
            debug!(session = sessions.len(), header = line.trim(), "found session header");
            sessions.push(Session {
                header_line: lineno + 1,
                text: String::new(),
            });
        }

        match sessions.last_mut() {
            Some(session) => {
                session.text.push_str(&line);
                session.text.push('\n');
            }
            None => orphaned += 1,
        }
    }

    if orphaned > 0 {
        warn!(rows = orphaned, "skipping rows that appear before the first header");
    }
    Ok(sessions)
}
