use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use transcheck_core::{RuleConfig, RulePreset};

#[derive(Parser, Debug)]
#[command(
    name = "transcheck",
    version,
    about = "Validate tagged conversation transcripts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate one or more transcript files
    Validate(ValidateArgs),
    /// Print the effective rule configuration as YAML
    Rules(RulesArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RuleArgs {
    #[arg(long, value_enum, default_value_t = PresetArg::Standard)]
    pub preset: PresetArg,

    /// YAML or JSON rule file; overrides --preset
    #[arg(long)]
    pub rules: Option<PathBuf>,
}

impl RuleArgs {
    pub fn load(&self) -> Result<RuleConfig> {
        match &self.rules {
            Some(path) => RuleConfig::from_file(path)
                .with_context(|| format!("failed to load rules from {}", path.display())),
            None => Ok(RulePreset::from(self.preset).config()),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub rules: RuleArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Maximum number of files validated at once
    #[arg(long, default_value_t = 4)]
    pub jobs: usize,
}

#[derive(Args, Debug, Clone)]
pub struct RulesArgs {
    #[command(flatten)]
    pub rules: RuleArgs,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum PresetArg {
    Standard,
    Strict,
}

impl From<PresetArg> for RulePreset {
    fn from(preset: PresetArg) -> Self {
        match preset {
            PresetArg::Standard => RulePreset::Standard,
            PresetArg::Strict => RulePreset::Strict,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
