use crate::Result;
use crate::config::{PlotConfig, PlotKind};
use crate::render::axes::Axes;
use crate::table::Table;

use anyhow::Context;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Serialize)]
struct Trace<'a> {
    name: &'a str,
    axis: &'static str,
    values: Value,
}

#[derive(Debug, Serialize)]
struct PlotData<'a> {
    title: &'a str,
    mode: &'static str,
    x_name: &'a str,
    x: Value,
    traces: Vec<Trace<'a>>,
    layout: &'a Map<String, Value>,
    trace_options: &'a Map<String, Value>,
}

/// Render a self-contained HTML page (plotly.js, data embedded as JSON).
///
/// The template is filled with `replace` rather than `format!()` because the
/// embedded JS is full of braces.
pub fn render_html(table: &Table, axes: &Axes, plot: &PlotConfig) -> Result<String> {
    let column = |name: &str| {
        table
            .column(name)
            .map(|c| c.to_json())
            .with_context(|| format!("column '{}' vanished before rendering", name))
    };

    let mut traces = Vec::with_capacity(axes.y.len() + axes.y2.len());
    for (axis, names) in [("y", &axes.y), ("y2", &axes.y2)] {
        for name in names {
            traces.push(Trace {
                name,
                axis,
                values: column(name)?,
            });
        }
    }

    let data = PlotData {
        title: plot.title.as_deref().unwrap_or("cdplot"),
        mode: match plot.kind {
            PlotKind::Line => "lines",
            PlotKind::Scatter => "markers",
        },
        x_name: &axes.x,
        x: column(&axes.x)?,
        traces,
        layout: &plot.layout,
        trace_options: &plot.traces,
    };
    // keep column names like "</script>" from closing the tag
    let json = serde_json::to_string(&data)?.replace("</", "<\\/");

    const TEMPLATE: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>cdplot</title>
<script src="https://cdn.plot.ly/plotly-2.35.2.min.js" charset="utf-8"></script>
<style>
  html, body { margin: 0; height: 100%; font-family: system-ui, -apple-system, Segoe UI, Roboto, Arial, sans-serif; }
  #plot { width: 100%; height: 100vh; }
</style>
</head>
<body>
<div id="plot"></div>
<script>
// Embedded plot data (JSON object literal)
const DATA = __DATA__;

document.title = DATA.title;

const traces = DATA.traces.map((t) => Object.assign({
  type: "scatter",
  mode: DATA.mode,
  name: t.name,
  x: DATA.x,
  y: t.values,
  yaxis: t.axis,
}, DATA.trace_options));

const hasY2 = DATA.traces.some((t) => t.axis === "y2");
const layout = Object.assign({
  title: { text: DATA.title },
  xaxis: { title: { text: DATA.x_name } },
  yaxis: {},
  legend: { orientation: "h" },
  hovermode: "x unified",
}, hasY2 ? { yaxis2: { overlaying: "y", side: "right" } } : {}, DATA.layout);

Plotly.newPlot("plot", traces, layout, { responsive: true });
</script>
</body>
</html>
"#;

    Ok(TEMPLATE.replace("__DATA__", &json))
}
