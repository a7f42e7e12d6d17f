pub mod axes;
pub mod html;

pub use axes::layout_axes;
pub use html::render_html;

use crate::Result;
use crate::config::PlotConfig;
use crate::table::Table;

/// Lay out the axes over `table`'s columns, then build the HTML page.
pub fn render_plot(table: &Table, plot: &mut PlotConfig) -> Result<String> {
    let axes = layout_axes(table.column_names(), plot)?;
    render_html(table, &axes, plot)
}
