//! JSON Schema checks for transcript envelopes and rule configurations.
//!
//! Both schemas are embedded at compile time from `schema/` at the workspace
//! root and compiled once on first use.

use std::sync::OnceLock;

use thiserror::Error;

const TRANSCRIPT_SCHEMA_JSON: &str = include_str!("../../../schema/transcript.schema.json");
const RULES_SCHEMA_JSON: &str = include_str!("../../../schema/rules.schema.json");

static TRANSCRIPT_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static RULES_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema loading.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn compile(source: &str) -> Result<jsonschema::Validator, String> {
    let schema_value: serde_json::Value =
        serde_json::from_str(source).map_err(|e| format!("Invalid schema JSON: {}", e))?;

    jsonschema::options()
        .build(&schema_value)
        .map_err(|e| format!("Failed to compile schema: {}", e))
}

fn get_validator(
    slot: &'static OnceLock<Result<jsonschema::Validator, String>>,
    source: &str,
) -> Result<&'static jsonschema::Validator, SchemaError> {
    match slot.get_or_init(|| compile(source)) {
        Ok(v) => Ok(v),
        Err(e) => Err(SchemaError::LoadError(e.clone())),
    }
}

fn collect_errors(
    validator: &jsonschema::Validator,
    value: &serde_json::Value,
) -> Result<(), Vec<String>> {
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a decoded transcript against the envelope schema.
///
/// Returns every schema violation, not just the first.
pub fn validate_transcript_schema(value: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator =
        get_validator(&TRANSCRIPT_SCHEMA, TRANSCRIPT_SCHEMA_JSON).map_err(|e| vec![e.to_string()])?;
    collect_errors(validator, value)
}

/// Validate a rule configuration against the rules schema.
pub fn validate_rules_schema(value: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator =
        get_validator(&RULES_SCHEMA, RULES_SCHEMA_JSON).map_err(|e| vec![e.to_string()])?;
    collect_errors(validator, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_transcript_passes() {
        let value = json!({ "cells": [] });
        assert!(validate_transcript_schema(&value).is_ok());
    }

    #[test]
    fn test_line_and_text_sources_pass() {
        let value = json!({
            "cells": [
                { "source": ["- Conversation length: 1-3\n"] },
                { "source": "**[user]**\n\nHello", "metadata": {} }
            ]
        });
        assert!(validate_transcript_schema(&value).is_ok());
    }

    #[test]
    fn test_missing_cells_fails() {
        let value = json!({ "metadata": {} });
        let errors = validate_transcript_schema(&value).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_non_string_source_fails() {
        let value = json!({ "cells": [ { "source": 42 } ] });
        assert!(validate_transcript_schema(&value).is_err());
    }

    #[test]
    fn test_non_string_cell_tag_fails() {
        let value = json!({ "cells": [ { "source": "x", "metadata": { "tag": 3 } } ] });
        assert!(validate_transcript_schema(&value).is_err());
    }

    #[test]
    fn test_rules_schema_accepts_partial_config() {
        let value = json!({ "name": "custom", "min_turn_metadata": 10 });
        assert!(validate_rules_schema(&value).is_ok());
    }

    #[test]
    fn test_rules_schema_rejects_unknown_fields() {
        let value = json!({ "name": "custom", "threshold": 3 });
        assert!(validate_rules_schema(&value).is_err());
    }

    #[test]
    fn test_rules_schema_rejects_bad_policy() {
        let value = json!({ "user_prompt_policy": "median" });
        assert!(validate_rules_schema(&value).is_err());
    }

    #[test]
    fn test_rules_schema_rejects_out_of_range_percentage() {
        let value = json!({ "min_fail_percentage": 120 });
        assert!(validate_rules_schema(&value).is_err());
    }
}
