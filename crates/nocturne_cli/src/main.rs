//! Nocturne CLI
//!
//! Render dark theme overrides for stylesheets without a browser.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use nocturne_theme::{css_filter_value, svg_filter_matrix_value, ColorModifier, FilterMode};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

mod config;
mod render;

use config::{NocturneConfig, CONFIG_FILE};
use render::SourceSheet;

#[derive(Parser)]
#[command(name = "nocturne")]
#[command(version)]
#[command(about = "Render dark theme overrides for stylesheets")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file or directory containing nocturne.toml
    #[arg(short, long, global = true, default_value = ".")]
    config: PathBuf,

    /// Force light mode regardless of the config
    #[arg(long, global = true)]
    light: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the overrides generated for stylesheets
    Render(RenderArgs),

    /// Transform colors with the configured filter
    Color {
        /// CSS color values
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Print the CSS and SVG filter values for the configured filter
    Filter,

    /// Write a default nocturne.toml
    Init {
        /// Directory to write into
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct RenderArgs {
    /// Stylesheets to theme
    files: Vec<PathBuf>,

    /// Render as an embedded frame
    #[arg(long)]
    iframe: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Css)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Css,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { path, force } => cmd_init(path, force),
        Commands::Render(args) => cmd_render(load_config(&cli.config, cli.light)?, args),
        Commands::Color { values } => cmd_color(&load_config(&cli.config, cli.light)?, &values),
        Commands::Filter => cmd_filter(&load_config(&cli.config, cli.light)?),
    }
}

fn load_config(path: &Path, light: bool) -> Result<NocturneConfig> {
    let mut config = NocturneConfig::load_or_default(path)?;
    if light {
        config.filter.mode = FilterMode::Light;
    }
    Ok(config)
}

fn cmd_init(path: PathBuf, force: bool) -> Result<()> {
    let target = path.join(CONFIG_FILE);
    if target.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite.",
            target.display()
        );
    }
    fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    fs::write(&target, NocturneConfig::default().to_toml()?)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    info!("Created {}", target.display());
    Ok(())
}

fn cmd_render(mut config: NocturneConfig, args: RenderArgs) -> Result<()> {
    config.render.iframe |= args.iframe;
    let sheets = args
        .files
        .into_iter()
        .map(SourceSheet::read)
        .collect::<Result<Vec<_>>>()?;
    info!(sheets = sheets.len(), mode = ?config.filter.mode, "Rendering");

    let output = render::render(&config, &sheets)?;
    match args.format {
        Format::Css => print!("{}", output.to_text()),
        Format::Json => println!("{}", serde_json::to_string_pretty(&output)?),
    }
    Ok(())
}

fn cmd_color(config: &NocturneConfig, values: &[String]) -> Result<()> {
    let mut modifier = ColorModifier::new();
    for value in values {
        let color = modifier
            .transform(value, &config.filter)
            .with_context(|| format!("Cannot transform '{}'", value))?;
        println!("{value} -> {color}");
    }
    Ok(())
}

fn cmd_filter(config: &NocturneConfig) -> Result<()> {
    match css_filter_value(&config.filter) {
        Some(value) => println!("filter: {value}"),
        None => println!("filter: none"),
    }
    println!("matrix: {}", svg_filter_matrix_value(&config.filter));
    Ok(())
}
