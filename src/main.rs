//! polygen Command Line Interface
//!
//! Usage:
//!   polygen [OPTIONS] <DOMAIN>
//!   polygen --help
//!
//! Examples:
//!   polygen '[n] -> { S[i] : 0 <= i < n }' --param n=5
//!   polygen '{ S[i,j] : 0 <= i,j < 100 }' --schedule '{ S[i,j] -> [i,j] }' --tile-sizes=32,32
//!   polygen --emit=schedule -f domain.txt --schedule '{ S[i] -> [i] }'

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info};
use polygen::transform::{Pipeline, PipelineConfig};
use std::fs;
use std::path::PathBuf;
use std::process;

/// polygen - polyhedral loop generation
#[derive(Parser, Debug)]
#[command(name = "polygen")]
#[command(version)]
#[command(about = "Generate tiled loop nests from integer-set domains", long_about = None)]
struct Cli {
    /// Union domain, e.g. '[n] -> { S[i] : 0 <= i < n }'
    #[arg(value_name = "DOMAIN", required_unless_present = "file")]
    domain: Option<String>,

    /// Read the domain from a file instead
    #[arg(short, long, value_name = "FILE", conflicts_with = "domain")]
    file: Option<PathBuf>,

    /// Bind a parameter (repeatable), e.g. --param n=5
    #[arg(short, long = "param", value_name = "NAME=VALUE", value_parser = parse_binding)]
    params: Vec<(String, i64)>,

    /// Parameter context, e.g. '[n] -> { : n >= 1 }'
    #[arg(long, value_name = "SET")]
    context: Option<String>,

    /// Schedule map inserted as a band
    #[arg(short, long, value_name = "MAP")]
    schedule: Option<String>,

    /// Split the leftmost band before this member
    #[arg(long, value_name = "POS")]
    split: Option<usize>,

    /// Tile sizes for the leftmost band (comma-separated)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    tile_sizes: Option<Vec<i64>>,

    /// What to emit
    #[arg(long, default_value = "ast")]
    emit: EmitKind,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitKind {
    /// Loop code
    Ast,
    /// Transformed schedule tree
    Schedule,
    /// Schedule tree followed by loop code
    Both,
}

fn parse_binding(text: &str) -> Result<(String, i64), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", text))?;
    let value = value
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid value for '{}': {}", name.trim(), e))?;
    Ok((name.trim().to_string(), value))
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("polygen v{}", polygen::VERSION);

    if let Err(e) = run(&cli) {
        eprintln!("error: {:#}", e);
        let code = e
            .downcast_ref::<polygen::utils::errors::PolyError>()
            .map_or(1, |p| p.exit_code());
        process::exit(code);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let domain = match (&cli.domain, &cli.file) {
        (_, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read domain file: {:?}", path))?,
        (Some(text), None) => text.clone(),
        (None, None) => return Err(anyhow!("no domain given")),
    };

    let config = build_config(cli);
    debug!("Pipeline config: {:?}", config);

    let output = Pipeline::with_config(domain.trim(), config).run()?;
    let text = match cli.emit {
        EmitKind::Ast => output.ast_text,
        EmitKind::Schedule => format!("{}\n", output.schedule_text),
        EmitKind::Both => format!("{}\n\n{}", output.schedule_text, output.ast_text),
    };
    write_output(&cli.output, &text)
}

fn build_config(cli: &Cli) -> PipelineConfig {
    PipelineConfig {
        param_values: cli.params.clone(),
        param_context: cli.context.clone(),
        schedule: cli.schedule.clone(),
        split: cli.split,
        tile_sizes: cli.tile_sizes.clone(),
    }
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content)
                .with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
