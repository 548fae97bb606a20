//! # transcheck-core
//!
//! Deterministic validation engine for tagged conversation transcripts.
//!
//! A transcript is an ordered list of cells: a metadata header followed by
//! tagged blocks (`[system]`, `[user]`, `[thinking]`, `[assistant]`, ...) and
//! a trailing region of model comparison blocks with JSON reports. The engine
//! answers:
//! - Is every cell a well-formed tagged block?
//! - Does the tag sequence follow the conversation grammar?
//! - Do turn and word counts fall within the declared ranges?
//! - Do the JSON reports parse and agree with the turn metadata?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same document and rules always produce the same report
//! 2. **Exhaustive**: Every violation is reported; no stage stops another
//! 3. **Located**: Every issue cites its cell when there is one
//! 4. **Configurable**: Thresholds and policies come from an injected [`RuleConfig`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use transcheck_core::{Document, RuleConfig, Validator};
//!
//! let document = Document::from_file("transcript.json")?;
//! let report = Validator::new(RuleConfig::strict()).validate(&document);
//!
//! for error in &report.errors {
//!     println!("{}: {}", error.kind, error.message);
//! }
//! ```

pub mod aggregator;
pub mod checks;
pub mod document;
pub mod issue;
pub mod range;
pub mod rules;
pub mod schema;
pub mod tags;
pub mod types;

// Re-export main types at crate root
pub use aggregator::{Aggregator, IssueStreams};
pub use checks::{
    Check, CheckInput, CrossReferenceCheck, JsonBlockValidator, LengthCheck, StructureCheck,
};
pub use document::{CellExtractor, Document, DocumentError, Extraction, FrontEnd, RawCell};
pub use issue::{Issue, IssueBuilder};
pub use range::{parse_range, Range, UPPER_SENTINEL};
pub use rules::{
    ReconciliationPolicy, RuleConfig, RulePreset, RulesError, UserPromptPolicy,
};
pub use tags::{Family, TagLabel};
pub use types::{Cell, ErrorKind, Metadata, Report, Stage, Stats};

use std::path::Path;

use tracing::debug;

/// Validates transcripts against one rule configuration.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: RuleConfig,
}

impl Validator {
    pub fn new(rules: RuleConfig) -> Self {
        Self { rules }
    }

    pub fn with_preset(preset: RulePreset) -> Self {
        Self::new(preset.config())
    }

    pub fn rules(&self) -> &RuleConfig {
        &self.rules
    }

    /// Validate a decoded document.
    ///
    /// Extraction runs first; its cells feed the JSON scan and the three
    /// checks, which never see each other's output.
    pub fn validate(&self, document: &Document) -> Report {
        let extraction = CellExtractor::new().extract(document);
        let total_cells = extraction.cells.len();

        let scan = JsonBlockValidator::new().scan(&extraction.cells);

        let input = CheckInput {
            cells: &extraction.cells,
            metadata: &extraction.metadata,
            rules: &self.rules,
            payloads: &scan.payloads,
        };
        let structure = StructureCheck::new().run(&input);
        let length = LengthCheck::new().run(&input);
        let cross_reference = CrossReferenceCheck::new().run(&input);

        let streams = IssueStreams {
            format: extraction.issues,
            structure,
            length,
            json: scan.issues,
            cross_reference,
        };
        let report = Aggregator::new().aggregate(streams, extraction.metadata, total_cells);

        debug!(
            rules = %self.rules.name,
            valid = report.valid,
            errors = report.errors.len(),
            "transcript validated"
        );

        report
    }

    /// Decode and validate raw JSON bytes.
    pub fn validate_slice(&self, bytes: &[u8]) -> Result<Report, DocumentError> {
        let document = Document::from_slice(bytes)?;
        Ok(self.validate(&document))
    }

    /// Read, decode and validate a transcript file.
    pub fn validate_file(&self, path: impl AsRef<Path>) -> Result<Report, DocumentError> {
        let document = Document::from_file(path)?;
        Ok(self.validate(&document))
    }
}

/// Validate a document with the standard rules.
pub fn validate(document: &Document) -> Report {
    Validator::default().validate(document)
}

/// Validate a document with explicit rules.
pub fn validate_with_rules(document: &Document, rules: &RuleConfig) -> Report {
    Validator::new(rules.clone()).validate(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_assistant_is_invalid() {
        let document = Document::from_cells(vec![
            RawCell::text(""),
            RawCell::text("**[system]**\n\nYou are a travel planner."),
            RawCell::text("**[user]**\n\nPlan a weekend in Rome."),
        ]);

        let report = validate(&document);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, ErrorKind::StructureError);
        assert_eq!(report.stats.total_cells, 2);
        assert_eq!(report.stats.count(ErrorKind::StructureError), 1);
    }

    #[test]
    fn test_stages_report_in_order() {
        let document = Document::from_cells(vec![
            RawCell::text("- Conversation length: lots"),
            RawCell::text("plain prose with no tag"),
            RawCell::text("**[user]**\n\nHello"),
            RawCell::text("**[turn_metadata]**\n\n{}"),
            RawCell::text("**[thinking]**\n\nHmm"),
            RawCell::text("**[assistant]**\n\nHi"),
        ]);

        let report = validate(&document);
        let kinds: Vec<ErrorKind> = report.errors.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ErrorKind::FormatError,
                ErrorKind::StructureError,
                ErrorKind::MetadataError,
                ErrorKind::JsonFormatError,
            ]
        );
        assert_eq!(
            report.metadata.get("conversation length").map(String::as_str),
            Some("lots")
        );
    }

    #[test]
    fn test_validate_slice_rejects_undecodable_input() {
        let validator = Validator::with_preset(RulePreset::Strict);
        assert_eq!(validator.rules().name, "strict");
        assert!(matches!(
            validator.validate_slice(b"not json"),
            Err(DocumentError::JsonError(_))
        ));
    }
}
