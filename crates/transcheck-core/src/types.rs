//! Core types shared across the validation pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::issue::Issue;
use crate::tags::TagLabel;

/// Lower-cased metadata key to free-text value.
pub type Metadata = BTreeMap<String, String>;

/// One tagged cell of a transcript.
///
/// Only cells that carried a recognized tag make it into the tag sequence;
/// every other cell is represented by the format issue it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Position in the source document (the metadata header is 0)
    pub index: usize,

    pub tag: TagLabel,

    /// Content after the marker line and its blank separator
    pub body: String,

    /// First non-blank body line, markup stripped and truncated
    pub preview: String,
}

/// Classification of a single violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Tag marker or header shape
    FormatError,
    /// Grammar violations in the tag sequence
    StructureError,
    /// Block index ordering
    SequenceError,
    /// Turn or word counts outside declared ranges
    LengthError,
    /// Unparsable range text in the metadata header
    MetadataError,
    /// JSON fence missing or malformed
    #[serde(rename = "JSONFormatError")]
    JsonFormatError,
    /// Payload is not valid JSON
    #[serde(rename = "JSONSyntaxError")]
    JsonSyntaxError,
    /// Counts or judgments disagree between dependent payloads
    CrossReferenceError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::FormatError,
        ErrorKind::StructureError,
        ErrorKind::SequenceError,
        ErrorKind::LengthError,
        ErrorKind::MetadataError,
        ErrorKind::JsonFormatError,
        ErrorKind::JsonSyntaxError,
        ErrorKind::CrossReferenceError,
    ];

    /// Human-readable name used in rendered reports.
    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::FormatError => "Format Error",
            ErrorKind::StructureError => "Structure Error",
            ErrorKind::SequenceError => "Sequence Error",
            ErrorKind::LengthError => "Length Error",
            ErrorKind::MetadataError => "Metadata Error",
            ErrorKind::JsonFormatError => "JSON Format Error",
            ErrorKind::JsonSyntaxError => "JSON Syntax Error",
            ErrorKind::CrossReferenceError => "Cross-Reference Error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Pipeline stages, in the order their issues appear in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Structure,
    Length,
    JsonBlocks,
    CrossReference,
}

impl Stage {
    pub fn description(&self) -> &'static str {
        match self {
            Stage::Extraction => "Is every cell a well-formed tagged block?",
            Stage::Structure => "Does the tag sequence follow the conversation grammar?",
            Stage::Length => "Do turn and word counts fall within the declared ranges?",
            Stage::JsonBlocks => "Do metadata and report cells carry a parsable JSON payload?",
            Stage::CrossReference => "Do the reports agree with the turn metadata and each other?",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extraction => "extraction",
            Stage::Structure => "structure",
            Stage::Length => "length",
            Stage::JsonBlocks => "json_blocks",
            Stage::CrossReference => "cross_reference",
        };
        f.write_str(name)
    }
}

/// Summary statistics for a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of cells that entered the tag sequence
    pub total_cells: usize,

    /// Issue count per kind; every kind is present, zero or not
    pub counts: BTreeMap<ErrorKind, usize>,
}

impl Stats {
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

/// The result of validating one transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// True iff `errors` is empty
    pub valid: bool,

    /// Every violation, in discovery order
    pub errors: Vec<Issue>,

    /// Parsed metadata header
    pub metadata: Metadata,

    pub stats: Stats,
}

impl Report {
    /// Issues of one kind, in report order.
    pub fn errors_of(&self, kind: ErrorKind) -> impl Iterator<Item = &Issue> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::JsonFormatError).unwrap(),
            "\"JSONFormatError\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::CrossReferenceError).unwrap(),
            "\"CrossReferenceError\""
        );
    }

    #[test]
    fn test_stats_serialize_with_kind_keys() {
        let mut counts = BTreeMap::new();
        counts.insert(ErrorKind::JsonSyntaxError, 2);
        let stats = Stats { total_cells: 4, counts };

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["counts"]["JSONSyntaxError"], 2);
        assert_eq!(stats.count(ErrorKind::FormatError), 0);
    }
}
