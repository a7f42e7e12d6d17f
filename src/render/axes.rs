//! Assigns columns to the x, left-y and right-y axes.

use crate::config::PlotConfig;
use crate::error::{CoreError, CoreResult};

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axes {
    pub x: String,
    pub y: Vec<String>,
    pub y2: Vec<String>,
}

/// Resolve the axes against the final column list and record them in `plot`.
///
/// `x` defaults to the first column and `y` to every remaining column not
/// already on `y2`. Every configured name must be one of `columns`.
pub fn layout_axes(columns: &[String], plot: &mut PlotConfig) -> CoreResult<Axes> {
    let check = |axis: &'static str, name: &str| {
        if columns.iter().any(|c| c == name) {
            Ok(())
        } else {
            Err(CoreError::RenderAxis {
                axis,
                column: name.to_string(),
            })
        }
    };

    let x = match &plot.x {
        Some(x) => {
            check("x", x)?;
            x.clone()
        }
        None => columns.first().cloned().ok_or_else(|| CoreError::RenderAxis {
            axis: "x",
            column: String::new(),
        })?,
    };
    for name in &plot.y2 {
        check("y2", name)?;
    }
    for name in &plot.y {
        check("y", name)?;
    }

    let y = if plot.y.is_empty() {
        columns
            .iter()
            .filter(|c| **c != x && !plot.y2.contains(c))
            .cloned()
            .collect()
    } else {
        plot.y.clone()
    };

    debug!(x = %x, y = y.len(), y2 = plot.y2.len(), "laid out axes");
    plot.x = Some(x.clone());
    plot.y = y.clone();
    Ok(Axes {
        x,
        y,
        y2: plot.y2.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_use_first_column_as_x() {
        let mut plot = PlotConfig::default();
        let axes = layout_axes(&cols(&["t", "a", "b"]), &mut plot).unwrap();
        assert_eq!(
            axes,
            Axes {
                x: "t".into(),
                y: cols(&["a", "b"]),
                y2: vec![],
            }
        );
        assert_eq!(plot.x.as_deref(), Some("t"));
        assert_eq!(plot.y, cols(&["a", "b"]));
    }

    #[test]
    fn configured_x_and_y2_are_kept_off_y() {
        let mut plot = PlotConfig {
            x: Some("b".into()),
            y2: cols(&["c"]),
            ..PlotConfig::default()
        };
        let axes = layout_axes(&cols(&["a", "b", "c", "d"]), &mut plot).unwrap();
        assert_eq!(axes.x, "b");
        assert_eq!(axes.y, cols(&["a", "d"]));
        assert_eq!(axes.y2, cols(&["c"]));
    }

    #[test]
    fn explicit_y_is_used_verbatim() {
        let mut plot = PlotConfig {
            y: cols(&["c", "a"]),
            ..PlotConfig::default()
        };
        let axes = layout_axes(&cols(&["a", "b", "c"]), &mut plot).unwrap();
        assert_eq!(axes.y, cols(&["c", "a"]));
    }

    #[test]
    fn unknown_axis_columns_are_rejected() {
        let columns = cols(&["a", "b"]);

        let mut plot = PlotConfig {
            x: Some("zz".into()),
            ..PlotConfig::default()
        };
        assert_eq!(
            layout_axes(&columns, &mut plot).unwrap_err(),
            CoreError::RenderAxis {
                axis: "x",
                column: "zz".into()
            }
        );

        let mut plot = PlotConfig {
            y2: cols(&["q"]),
            ..PlotConfig::default()
        };
        assert!(matches!(
            layout_axes(&columns, &mut plot),
            Err(CoreError::RenderAxis { axis: "y2", .. })
        ));
    }

    #[test]
    fn no_columns_means_no_x_axis() {
        let mut plot = PlotConfig::default();
        assert!(matches!(
            layout_axes(&[], &mut plot),
            Err(CoreError::RenderAxis { axis: "x", .. })
        ));
    }
}
