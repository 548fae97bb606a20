//! Transcript decoding from JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::validate_transcript_schema;

/// Errors that make a document impossible to validate at all.
///
/// These are distinct from validation issues: a document that fails to decode
/// never produces a report.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to read document file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Document does not match the transcript schema: {0}")]
    SchemaError(String),
}

/// Source text of a cell: a list of lines or a single string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellSource {
    Lines(Vec<String>),
    Text(String),
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::Text(String::new())
    }
}

impl CellSource {
    /// The full cell text. Lines already carry their own newlines.
    pub fn text(&self) -> String {
        match self {
            CellSource::Lines(lines) => lines.concat(),
            CellSource::Text(text) => text.clone(),
        }
    }
}

/// Per-cell metadata; only the tag is read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellMetadata {
    #[serde(default)]
    pub tag: Option<String>,
}

/// A cell as it appears in the serialized document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCell {
    #[serde(default)]
    pub source: CellSource,

    #[serde(default)]
    pub metadata: CellMetadata,
}

impl RawCell {
    /// A cell whose tag lives in its marker line.
    pub fn text(source: impl Into<String>) -> Self {
        Self {
            source: CellSource::Text(source.into()),
            metadata: CellMetadata::default(),
        }
    }

    /// A cell whose tag lives in its metadata.
    pub fn tagged(tag: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            source: CellSource::Text(source.into()),
            metadata: CellMetadata {
                tag: Some(tag.into()),
            },
        }
    }
}

/// Document-level metadata; only the declared length constraints are read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub length_constraints: Option<BTreeMap<String, serde_json::Value>>,
}

/// A transcript document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub cells: Vec<RawCell>,

    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Build a document from cells in authoring order.
    pub fn from_cells(cells: Vec<RawCell>) -> Self {
        Self {
            cells,
            metadata: DocumentMetadata::default(),
        }
    }

    /// Parse a document from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a document from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Parse a document from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let bytes = fs::read(path)?;
        Self::from_slice(&bytes)
    }

    fn from_value(value: serde_json::Value) -> Result<Self, DocumentError> {
        validate_transcript_schema(&value)
            .map_err(|errors| DocumentError::SchemaError(errors.join("; ")))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Whether tags are carried in cell metadata instead of marker lines.
    pub fn uses_cell_tags(&self) -> bool {
        self.metadata.length_constraints.is_some()
            || self.cells.iter().any(|c| c.metadata.tag.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_sources() {
        let doc = Document::from_json(
            r#"{
                "cells": [
                    { "cell_type": "markdown", "source": ["- Conversation length: 1-3\n", "- User prompt length: 5"] },
                    { "cell_type": "markdown", "source": "**[user]**\n\nHello there" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(doc.cells.len(), 2);
        assert_eq!(
            doc.cells[0].source.text(),
            "- Conversation length: 1-3\n- User prompt length: 5"
        );
        assert!(!doc.uses_cell_tags());
    }

    #[test]
    fn test_parse_tagged_variant() {
        let doc = Document::from_json(
            r#"{
                "metadata": { "length_constraints": { "conversation_length": "1-3" } },
                "cells": [
                    { "source": "" },
                    { "source": "Hello", "metadata": { "tag": "user" } }
                ]
            }"#,
        )
        .unwrap();

        assert!(doc.uses_cell_tags());
        assert_eq!(doc.cells[1].metadata.tag.as_deref(), Some("user"));
    }

    #[test]
    fn test_malformed_json_is_fatal() {
        let result = Document::from_json("{ \"cells\": [ ");
        assert!(matches!(result, Err(DocumentError::JsonError(_))));
    }

    #[test]
    fn test_wrong_shape_is_fatal() {
        let result = Document::from_json(r#"{ "cells": "not a list" }"#);
        assert!(matches!(result, Err(DocumentError::SchemaError(_))));
    }

    #[test]
    fn test_missing_source_defaults_to_empty() {
        let doc = Document::from_json(r#"{ "cells": [ {} ] }"#).unwrap();
        assert_eq!(doc.cells[0].source.text(), "");
    }
}
