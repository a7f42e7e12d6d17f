use clap::{ArgAction, Parser};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod filters;
mod ingest;
mod render;
mod select;
mod table;

use anyhow::Context;
use config::{Config, Overrides, serialize_config};
use table::Table;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "cdplot")]
#[command(about = "Plot columns of CSV logs, with derived columns computed from declarative filters", long_about = None)]
struct Cli {
    /// CSV file(s) to plot.
    #[arg(short = 'f', long, num_args = 1..)]
    csv_path: Vec<PathBuf>,

    /// JSON config file; command-line settings take precedence over it.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Write the HTML plot here instead of stdout.
    #[arg(short = 'o', long)]
    output_path: Option<PathBuf>,

    /// Plot only this session (0-based, counted across files).
    #[arg(short = 's', long)]
    session: Option<usize>,

    /// Exact column list; disables include/exclude rules.
    #[arg(long, num_args = 1..)]
    columns: Option<Vec<String>>,

    #[arg(short = 'i', long, action = ArgAction::Append)]
    include: Vec<String>,

    #[arg(short = 'e', long, action = ArgAction::Append)]
    exclude: Vec<String>,

    /// Glob pattern for including columns.
    #[arg(short = 'I', long, action = ArgAction::Append)]
    include_pattern: Vec<String>,

    /// Glob pattern for excluding columns.
    #[arg(short = 'E', long, action = ArgAction::Append)]
    exclude_pattern: Vec<String>,

    /// Type for columns without a dtype entry (float64, int64, datetime, text).
    #[arg(long)]
    default_type: Option<String>,

    /// Drop rows with missing values.
    #[arg(long, alias = "drop-na")]
    dropna: bool,

    /// With --dropna, keep rows with at least this many values.
    #[arg(long, alias = "drop-na-threshold")]
    dropna_threshold: Option<usize>,

    /// Replace missing values.
    #[arg(long, alias = "fill-na")]
    fillna: Option<f64>,

    /// Column for the x-axis.
    #[arg(short = 'x', long)]
    x: Option<String>,

    /// Column(s) for the y-axis.
    #[arg(short = 'y', long, num_args = 1..)]
    y: Option<Vec<String>>,

    /// Column(s) for the right y-axis.
    #[arg(long, num_args = 1..)]
    y2: Option<Vec<String>>,

    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// Extra plot settings as key=value.
    #[arg(value_parser = parse_key_val)]
    settings: Vec<(String, String)>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            output_path: self.output_path.clone(),
            csv_path: self.csv_path.clone(),
            session: self.session,
            columns: self.columns.clone(),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            include_pattern: self.include_pattern.clone(),
            exclude_pattern: self.exclude_pattern.clone(),
            default_type: self.default_type.clone(),
            dropna: self.dropna.then_some(true),
            dropna_threshold: self.dropna_threshold,
            fillna: self.fillna,
            x: self.x.clone(),
            y: self.y.clone(),
            y2: self.y2.clone(),
            plot: self.settings.clone(),
        }
    }
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = config::process_config(cli.config.as_deref(), &cli.overrides())?;
    if let Err(err) = plot_data(&mut config) {
        match serialize_config(&config) {
            Ok(text) => error!("plotting failed, here's the config\n{}", text),
            Err(e) => error!("plotting failed and the config could not be serialized: {}", e),
        }
        return Err(err);
    }
    Ok(())
}

fn plot_data(config: &mut Config) -> Result<()> {
    // 1) Load.
    let table = ingest::load_from_csv(&config.data)?;

    // 2) Derive columns, then narrow to the selection.
    let table = augment_data(table, config)?;

    // 3) Render.
    let html = render::render_plot(&table, &mut config.plot)?;

    match serialize_config(config) {
        Ok(text) => debug!("to reproduce this plot, put the following into its own config file\n{}", text),
        Err(e) => debug!("config could not be serialized: {}", e),
    }

    match &config.output_path {
        Some(path) => {
            fs::write(path, html).with_context(|| format!("write {}", path.display()))?;
            info!("written to {}", path.display());
        }
        None => println!("{}", html),
    }
    info!("done");
    Ok(())
}

/// Apply the filter pipeline and keep only the selected columns.
fn augment_data(mut table: Table, config: &mut Config) -> Result<Table> {
    let operations = filters::create_data_operators(config, table.column_names())?;
    filters::process_data(&mut table, &operations)?;

    let columns = select::determine_columns(table.column_names(), &mut config.data)?;
    Ok(table.select(&columns)?)
}
