mod batch;
mod cli;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, OutputFormat, RulesArgs, ValidateArgs};

fn main() {
    init_tracing();

    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            error!(error = %err, "command failed");
            for cause in err.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            std::process::exit(1);
        }
    }
}

/// Returns whether the command succeeded cleanly.
fn run() -> Result<bool> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate(args) => validate(args),
        Commands::Rules(args) => rules(args),
    }
}

fn validate(args: ValidateArgs) -> Result<bool> {
    let rules = args.rules.load()?;
    info!(rules = %rules.name, files = args.files.len(), jobs = args.jobs, "validating transcripts");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let summary = runtime.block_on(batch::validate_batch(args.files, rules, args.jobs))?;

    let output = match args.format {
        OutputFormat::Text => render::render_text(&summary),
        OutputFormat::Json => render::render_json(&summary)?,
    };
    println!("{output}");

    info!(
        valid = summary.valid,
        invalid = summary.invalid,
        crashed = summary.crashed,
        "validation finished"
    );

    Ok(summary.is_clean())
}

fn rules(args: RulesArgs) -> Result<bool> {
    let rules = args.rules.load()?;
    let yaml = rules.to_yaml().context("failed to render rules")?;
    print!("{yaml}");
    Ok(true)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
