//! Rule configuration.
//!
//! Thresholds, the restricted-instruction denylist and the length-check
//! policy are immutable configuration injected into the validator. Two named
//! presets cover the authoring guidelines in use; custom configurations load
//! from YAML or JSON and are checked against `schema/rules.schema.json`.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::validate_rules_schema;

/// Minimum number of checks (`instructions` + `llm_judge`) a turn must declare.
pub const MIN_TURN_METADATA: usize = 8;

/// Minimum adjusted failure rate that tolerates human/automated disagreement.
pub const MIN_FAIL_PERCENTAGE: f64 = 50.0;

/// Instruction ids too easily gamed to certify.
pub const DEFAULT_RESTRICTED_INSTRUCTIONS: [&str; 18] = [
    "length_constraints:number_words",
    "length_constraints:number_characters",
    "length_constraints:number_sentences",
    "length_constraints:number_paragraphs",
    "length_constraints:nth_paragraph_first_word",
    "length_constraints:sentence_length",
    "length_constraints:word_length",
    "change_case:english_capital",
    "change_case:english_lowercase",
    "change_case:capital_word_frequency",
    "change_case:lowercase_word_frequency",
    "keywords:frequency",
    "keywords:letter_frequency",
    "keywords:alliteration",
    "keywords:palindrome_word",
    "keywords:vowel_count",
    "keywords:consonant_count",
    "punctuation:no_comma",
];

/// Errors that can occur when loading a rule configuration.
#[derive(Error, Debug)]
pub enum RulesError {
    #[error("Failed to read rules file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Rules do not match schema: {0}")]
    SchemaError(String),

    #[error("Rules validation failed: {0}")]
    ValidationError(String),

    #[error("Unknown rule preset: {0}")]
    UnknownPreset(String),
}

/// How user prompt word counts are checked against their range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserPromptPolicy {
    /// The rounded mean across all user cells must fall in range
    #[default]
    Average,
    /// Every user cell must fall in range on its own
    PerTurn,
}

/// How a human report is reconciled with its validation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationPolicy {
    /// Disagreement is tolerated while the adjusted failure rate stays high
    #[default]
    Tolerant,
    /// Judge results must match exactly
    Exact,
}

/// Named rule presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulePreset {
    Standard,
    Strict,
}

impl RulePreset {
    pub fn config(self) -> RuleConfig {
        match self {
            RulePreset::Standard => RuleConfig::standard(),
            RulePreset::Strict => RuleConfig::strict(),
        }
    }
}

impl fmt::Display for RulePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulePreset::Standard => f.write_str("standard"),
            RulePreset::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for RulePreset {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(RulePreset::Standard),
            "strict" => Ok(RulePreset::Strict),
            other => Err(RulesError::UnknownPreset(other.to_string())),
        }
    }
}

/// Validation rules applied to every transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleConfig {
    /// Human-readable name
    pub name: String,

    /// Minimum `instructions` + `llm_judge` entries in the turn metadata
    pub min_turn_metadata: usize,

    /// Adjusted failure rate (percent) that tolerates review disagreement
    pub min_fail_percentage: f64,

    /// Instruction ids that may not appear in the turn metadata
    pub restricted_instructions: Vec<String>,

    pub user_prompt_policy: UserPromptPolicy,

    /// Whether `[conversation_end]` must follow the final assistant response
    pub require_conversation_end: bool,

    pub reconciliation: ReconciliationPolicy,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleConfig {
    /// Average user-prompt length, optional end marker, tolerant reconciliation.
    pub fn standard() -> Self {
        Self {
            name: RulePreset::Standard.to_string(),
            min_turn_metadata: MIN_TURN_METADATA,
            min_fail_percentage: MIN_FAIL_PERCENTAGE,
            restricted_instructions: DEFAULT_RESTRICTED_INSTRUCTIONS
                .iter()
                .map(|id| id.to_string())
                .collect(),
            user_prompt_policy: UserPromptPolicy::Average,
            require_conversation_end: false,
            reconciliation: ReconciliationPolicy::Tolerant,
        }
    }

    /// Per-turn user-prompt length, required end marker, exact reconciliation.
    pub fn strict() -> Self {
        Self {
            name: RulePreset::Strict.to_string(),
            user_prompt_policy: UserPromptPolicy::PerTurn,
            require_conversation_end: true,
            reconciliation: ReconciliationPolicy::Exact,
            ..Self::standard()
        }
    }

    /// Parse a rule configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, RulesError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a rule configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, RulesError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Load a rule configuration file; `.json` files are read as JSON,
    /// everything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RulesError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    fn from_value(value: serde_json::Value) -> Result<Self, RulesError> {
        validate_rules_schema(&value).map_err(|errors| RulesError::SchemaError(errors.join("; ")))?;
        let rules: RuleConfig = serde_json::from_value(value)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Validate values the schema cannot express.
    fn validate(&self) -> Result<(), RulesError> {
        if self.name.trim().is_empty() {
            return Err(RulesError::ValidationError("name must not be empty".to_string()));
        }

        if !(0.0..=100.0).contains(&self.min_fail_percentage) {
            return Err(RulesError::ValidationError(format!(
                "min_fail_percentage must be within 0..=100, got {}",
                self.min_fail_percentage
            )));
        }

        let mut seen = HashSet::new();
        for id in &self.restricted_instructions {
            if !seen.insert(id) {
                return Err(RulesError::ValidationError(format!(
                    "Duplicate restricted instruction: {}",
                    id
                )));
            }
        }

        Ok(())
    }

    /// Whether an instruction id is on the denylist.
    pub fn is_restricted(&self, instruction_id: &str) -> bool {
        self.restricted_instructions.iter().any(|id| id == instruction_id)
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, RulesError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
