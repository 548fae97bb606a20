//! Cell extraction.
//!
//! Cell 0 is always the metadata header and never enters the tag sequence.
//! Every later cell is classified by its tag, split into body and preview,
//! or reported as a format issue and left out of the sequence.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::parser::{Document, RawCell};
use crate::issue::{Issue, IssueBuilder};
use crate::tags::{parse_marker, TagLabel};
use crate::types::{Cell, ErrorKind, Metadata, Stage};

/// Preview of a cell with no content.
pub const EMPTY_PREVIEW: &str = "<empty content>";

const PREVIEW_CHARS: usize = 60;

lazy_static! {
    /// Header line: optional bullet, key, first `:` or `-`, value.
    static ref META_LINE_PATTERN: Regex = Regex::new(r"^\s*[-*]?\s*(.*?)\s*[:\-](.*)$").unwrap();
}

/// Which front-end produced the cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontEnd {
    /// Tags come from `**[label]**` marker lines, metadata from cell 0's text
    MarkerLines,
    /// Tags come from `cell.metadata.tag`, metadata from `length_constraints`
    CellMetadata,
}

/// Output of the cell extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Tagged cells in authoring order
    pub cells: Vec<Cell>,
    pub metadata: Metadata,
    /// Format issues, in document order
    pub issues: Vec<Issue>,
    pub front_end: FrontEnd,
}

/// Splits a document into its metadata header and tagged cells.
pub struct CellExtractor;

impl CellExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract cells with the front-end the document calls for.
    pub fn extract(&self, document: &Document) -> Extraction {
        let extraction = if document.uses_cell_tags() {
            self.extract_cell_metadata(document)
        } else {
            self.extract_marker_lines(document)
        };

        debug!(
            stage = %Stage::Extraction,
            front_end = ?extraction.front_end,
            cells = extraction.cells.len(),
            issues = extraction.issues.len(),
            metadata_keys = extraction.metadata.len(),
            "cells extracted"
        );

        extraction
    }

    fn extract_marker_lines(&self, document: &Document) -> Extraction {
        let metadata = document
            .cells
            .first()
            .map(|header| parse_header(&header.source.text()))
            .unwrap_or_default();

        let mut cells = Vec::new();
        let mut issues = Vec::new();

        for (index, raw) in document.cells.iter().enumerate().skip(1) {
            match marker_cell(index, raw) {
                Ok(Some(cell)) => cells.push(cell),
                Ok(None) => {}
                Err(issue) => issues.push(issue),
            }
        }

        Extraction {
            cells,
            metadata,
            issues,
            front_end: FrontEnd::MarkerLines,
        }
    }

    fn extract_cell_metadata(&self, document: &Document) -> Extraction {
        let metadata = document
            .metadata
            .length_constraints
            .as_ref()
            .map(|constraints| {
                constraints
                    .iter()
                    .filter_map(|(key, value)| {
                        let value = match value {
                            serde_json::Value::Null => return None,
                            serde_json::Value::String(s) => s.trim().to_string(),
                            other => other.to_string(),
                        };
                        Some((key.trim().to_lowercase().replace('_', " "), value))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut cells = Vec::new();
        let mut issues = Vec::new();

        for (index, raw) in document.cells.iter().enumerate().skip(1) {
            match metadata_cell(index, raw) {
                Ok(Some(cell)) => cells.push(cell),
                Ok(None) => {}
                Err(issue) => issues.push(issue),
            }
        }

        Extraction {
            cells,
            metadata,
            issues,
            front_end: FrontEnd::CellMetadata,
        }
    }
}

impl Default for CellExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify a cell by its marker line. Blank cells yield `Ok(None)`.
fn marker_cell(index: usize, raw: &RawCell) -> Result<Option<Cell>, Issue> {
    let text = raw.source.text();
    let lines: Vec<&str> = text.lines().collect();

    let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return Ok(None);
    };
    let cell_preview = preview(&lines);
    let marker = lines[first].trim();

    let Some(label) = parse_marker(marker) else {
        return Err(IssueBuilder::new(
            ErrorKind::FormatError,
            "Found a cell without a **[tag]** header.",
        )
        .cell(index)
        .snippet(cell_preview)
        .build());
    };

    let tag = TagLabel::parse(label).map_err(|e| {
        IssueBuilder::new(ErrorKind::FormatError, format!("Unrecognized tag: {}.", e.0))
            .cell(index)
            .snippet(cell_preview.clone())
            .build()
    })?;

    let rest = &lines[first + 1..];
    let spaced = rest.len() >= 2 && rest[0].trim().is_empty() && !rest[1].trim().is_empty();
    if !spaced {
        return Err(IssueBuilder::new(
            ErrorKind::FormatError,
            "The tag must be followed by exactly one blank line before content.",
        )
        .cell(index)
        .tag(tag)
        .snippet(cell_preview)
        .build());
    }

    let body_lines = &rest[1..];
    Ok(Some(Cell {
        index,
        tag,
        body: body_lines.join("\n"),
        preview: preview(body_lines),
    }))
}

/// Classify a cell by its metadata tag. Blank untagged cells yield `Ok(None)`.
fn metadata_cell(index: usize, raw: &RawCell) -> Result<Option<Cell>, Issue> {
    let text = raw.source.text();
    let lines: Vec<&str> = text.lines().collect();
    let cell_preview = preview(&lines);
    let has_content = lines.iter().any(|l| !l.trim().is_empty());

    let label = raw
        .metadata
        .tag
        .as_deref()
        .map(|t| t.trim().trim_start_matches('[').trim_end_matches(']'))
        .filter(|t| !t.is_empty());

    let Some(label) = label else {
        if !has_content {
            return Ok(None);
        }
        return Err(IssueBuilder::new(
            ErrorKind::FormatError,
            "Found a cell without a tag in its metadata.",
        )
        .cell(index)
        .snippet(cell_preview)
        .build());
    };

    let tag = TagLabel::parse(label).map_err(|e| {
        IssueBuilder::new(ErrorKind::FormatError, format!("Unrecognized tag: {}.", e.0))
            .cell(index)
            .snippet(cell_preview.clone())
            .build()
    })?;

    if !has_content {
        return Err(IssueBuilder::new(ErrorKind::FormatError, "Tagged cell has no content.")
            .cell(index)
            .tag(tag)
            .snippet(cell_preview)
            .build());
    }

    Ok(Some(Cell {
        index,
        tag,
        body: text.trim_end_matches(['\n', '\r']).to_string(),
        preview: cell_preview,
    }))
}

/// Parse the free-text metadata header.
///
/// Each line is split on its first `:` or `-`. Keys are lower-cased with
/// markup stripped; later duplicates overwrite earlier ones.
pub(crate) fn parse_header(text: &str) -> Metadata {
    let mut metadata = Metadata::new();

    for line in text.lines() {
        let Some(caps) = META_LINE_PATTERN.captures(line) else {
            continue;
        };

        let key = caps[1]
            .replace('*', "")
            .trim()
            .trim_end_matches(':')
            .to_lowercase();
        let value = caps[2]
            .trim()
            .trim_start_matches(['*', '-'])
            .trim()
            .to_string();

        if !key.is_empty() {
            metadata.insert(key, value);
        }
    }

    metadata
}

/// First non-blank line with `*` and `` ` `` stripped, truncated to 60 chars.
pub fn preview<S: AsRef<str>>(lines: &[S]) -> String {
    let Some(line) = lines
        .iter()
        .map(|l| l.as_ref().trim())
        .find(|l| !l.is_empty())
    else {
        return EMPTY_PREVIEW.to_string();
    };

    let clean = line.replace(['*', '`'], "");
    if clean.chars().count() > PREVIEW_CHARS {
        let head: String = clean.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parser::DocumentMetadata;
    use std::collections::BTreeMap;

    fn marker_doc(cells: &[&str]) -> Document {
        Document::from_cells(cells.iter().map(|c| RawCell::text(*c)).collect())
    }

    #[test]
    fn test_header_is_never_tagged() {
        let doc = marker_doc(&["**[user]**\n\nlooks like a tag", "**[user]**\n\nHello"]);
        let extraction = CellExtractor::new().extract(&doc);

        assert_eq!(extraction.cells.len(), 1);
        assert_eq!(extraction.cells[0].index, 1);
        assert_eq!(extraction.cells[0].tag, TagLabel::User);
        assert_eq!(extraction.cells[0].body, "Hello");
    }

    #[test]
    fn test_header_metadata() {
        let metadata = parse_header(
            "- Conversation length: 80-120\n\
             * **System prompt length:** above 50\n\
             User Prompt Length - up to 30\n\
             no delimiter here\n\
             : empty key",
        );

        assert_eq!(metadata.get("conversation length").map(String::as_str), Some("80-120"));
        assert_eq!(metadata.get("system prompt length").map(String::as_str), Some("above 50"));
        assert_eq!(metadata.get("user prompt length").map(String::as_str), Some("up to 30"));
        assert_eq!(metadata.len(), 3);
    }

    #[test]
    fn test_cell_without_marker() {
        let doc = marker_doc(&["", "Just some prose"]);
        let extraction = CellExtractor::new().extract(&doc);

        assert!(extraction.cells.is_empty());
        assert_eq!(extraction.issues.len(), 1);
        assert_eq!(extraction.issues[0].kind, ErrorKind::FormatError);
        assert_eq!(extraction.issues[0].cell, Some(1));
        assert_eq!(extraction.issues[0].snippet, "Just some prose");
    }

    #[test]
    fn test_blank_cells_are_skipped() {
        let doc = marker_doc(&["", "", "   \n\n"]);
        let extraction = CellExtractor::new().extract(&doc);

        assert!(extraction.cells.is_empty());
        assert!(extraction.issues.is_empty());
    }

    #[test]
    fn test_marker_needs_exactly_one_blank_line() {
        let doc = marker_doc(&[
            "",
            "**[user]**\nHello",
            "**[user]**\n\n\nHello",
            "**[user]**\n\n",
            "**[user]**",
        ]);
        let extraction = CellExtractor::new().extract(&doc);

        assert!(extraction.cells.is_empty());
        assert_eq!(extraction.issues.len(), 4);
        for issue in &extraction.issues {
            assert_eq!(issue.kind, ErrorKind::FormatError);
            assert_eq!(issue.tag, Some(TagLabel::User));
        }
    }

    #[test]
    fn test_leading_blank_lines_before_marker() {
        let doc = marker_doc(&["", "\n\n**[thinking]**\n\nLet me think."]);
        let extraction = CellExtractor::new().extract(&doc);

        assert_eq!(extraction.cells.len(), 1);
        assert_eq!(extraction.cells[0].tag, TagLabel::Thinking);
    }

    #[test]
    fn test_unrecognized_label() {
        let doc = marker_doc(&["", "**[narrator]**\n\nOnce upon a time"]);
        let extraction = CellExtractor::new().extract(&doc);

        assert!(extraction.cells.is_empty());
        assert_eq!(extraction.issues.len(), 1);
        assert!(extraction.issues[0].message.contains("narrator"));
        assert_eq!(extraction.issues[0].tag, None);
    }

    #[test]
    fn test_body_keeps_all_lines() {
        let doc = marker_doc(&["", "**[assistant]**\n\nLine one\n\nLine **two**"]);
        let extraction = CellExtractor::new().extract(&doc);

        assert_eq!(extraction.cells[0].body, "Line one\n\nLine **two**");
        assert_eq!(extraction.cells[0].preview, "Line one");
    }

    #[test]
    fn test_preview_strips_and_truncates() {
        assert_eq!(preview(&["", "  **bold** `code`  "]), "bold code");
        assert_eq!(preview::<&str>(&[]), EMPTY_PREVIEW);

        let long = "x".repeat(61);
        let shown = preview(&[long.as_str()]);
        assert_eq!(shown.chars().count(), 63);
        assert!(shown.ends_with("..."));

        let exact = "y".repeat(60);
        assert_eq!(preview(&[exact.as_str()]), exact);
    }

    #[test]
    fn test_cell_metadata_front_end() {
        let mut constraints = BTreeMap::new();
        constraints.insert("Conversation_Length".to_string(), serde_json::json!("1-3"));
        constraints.insert("user_prompt_length".to_string(), serde_json::json!(20));
        constraints.insert("system_prompt_length".to_string(), serde_json::Value::Null);

        let doc = Document {
            cells: vec![
                RawCell::text("ignored header"),
                RawCell::tagged("[system]", "You are helpful."),
                RawCell::tagged("user", "Hello\n"),
                RawCell::text("untagged prose"),
                RawCell::tagged("user", "   "),
                RawCell::tagged("oracle", "?"),
                RawCell::text(""),
            ],
            metadata: DocumentMetadata {
                length_constraints: Some(constraints),
            },
        };

        let extraction = CellExtractor::new().extract(&doc);

        assert_eq!(extraction.front_end, FrontEnd::CellMetadata);
        assert_eq!(extraction.metadata.get("conversation length").map(String::as_str), Some("1-3"));
        assert_eq!(extraction.metadata.get("user prompt length").map(String::as_str), Some("20"));
        assert!(!extraction.metadata.contains_key("system prompt length"));

        let tags: Vec<TagLabel> = extraction.cells.iter().map(|c| c.tag).collect();
        assert_eq!(tags, vec![TagLabel::System, TagLabel::User]);
        assert_eq!(extraction.cells[1].body, "Hello");

        let issue_cells: Vec<Option<usize>> = extraction.issues.iter().map(|i| i.cell).collect();
        assert_eq!(issue_cells, vec![Some(3), Some(4), Some(5)]);
    }
}
