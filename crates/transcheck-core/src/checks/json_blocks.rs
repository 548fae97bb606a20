//! Fenced JSON payload extraction.
//!
//! `[turn_metadata]` and report cells carry their payload inside a fenced
//! block. Payloads that parse are handed to the cross-reference check keyed
//! by tag-sequence position; everything else becomes an issue scoped to its
//! cell.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use super::Payloads;
use crate::issue::Issue;
use crate::types::{Cell, ErrorKind, Stage};

lazy_static! {
    /// Three or more backticks, optionally followed by `json`.
    static ref FENCE_OPENER: Regex = Regex::new(r"(?i)^`{3,}\s*(?:json)?\s*$").unwrap();
}

const FENCE_CLOSER: &str = "```";

/// Why a cell body holds no fenced payload.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceError {
    #[error("Cell is empty. Expected a ```json block.")]
    Empty,

    #[error("Content must start explicitly with a ```json fence.")]
    MissingOpener,

    #[error("Missing closing ``` for the JSON block.")]
    MissingCloser,
}

/// Return the text strictly between the opening fence and its closer.
pub fn extract_fenced_json(body: &str) -> Result<String, FenceError> {
    let lines: Vec<&str> = body.lines().collect();

    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .ok_or(FenceError::Empty)?;

    if !FENCE_OPENER.is_match(lines[start].trim()) {
        return Err(FenceError::MissingOpener);
    }

    let content = &lines[start + 1..];
    let end = content
        .iter()
        .position(|l| l.trim().starts_with(FENCE_CLOSER))
        .ok_or(FenceError::MissingCloser)?;

    Ok(content[..end].join("\n"))
}

/// Result of scanning every payload-carrying cell.
#[derive(Debug, Clone, Default)]
pub struct JsonScan {
    pub payloads: Payloads,
    pub issues: Vec<Issue>,
}

/// Extracts and parses the JSON payload of every cell that must carry one.
pub struct JsonBlockValidator;

impl JsonBlockValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn stage(&self) -> Stage {
        Stage::JsonBlocks
    }

    pub fn scan(&self, cells: &[Cell]) -> JsonScan {
        let mut scan = JsonScan::default();

        for (pos, cell) in cells.iter().enumerate() {
            if !cell.tag.carries_json() {
                continue;
            }

            let text = match extract_fenced_json(&cell.body) {
                Ok(text) => text,
                Err(e) => {
                    scan.issues
                        .push(Issue::at_cell(ErrorKind::JsonFormatError, cell, e.to_string()));
                    continue;
                }
            };

            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => {
                    scan.payloads.insert(pos, value);
                }
                Err(e) => {
                    scan.issues
                        .push(Issue::at_cell(ErrorKind::JsonSyntaxError, cell, e.to_string()));
                }
            }
        }

        debug!(
            stage = %self.stage(),
            payloads = scan.payloads.len(),
            issues = scan.issues.len(),
            "payloads scanned"
        );

        scan
    }
}

impl Default for JsonBlockValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{Family, TagLabel};

    fn cell(tag: TagLabel, body: &str) -> Cell {
        Cell {
            index: 1,
            tag,
            body: body.to_string(),
            preview: String::new(),
        }
    }

    #[test]
    fn test_extract_plain_fence() {
        let body = "\n```json\n{\"a\": 1}\n```\ntrailing prose";
        assert_eq!(extract_fenced_json(body).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_opener_variants() {
        assert!(extract_fenced_json("```JSON\n{}\n```").is_ok());
        assert!(extract_fenced_json("````\n{}\n````").is_ok());
        assert!(extract_fenced_json("  ``` json  \n{}\n```").is_ok());
        assert_eq!(
            extract_fenced_json("```yaml\na: 1\n```"),
            Err(FenceError::MissingOpener)
        );
        assert_eq!(
            extract_fenced_json("{\"a\": 1}"),
            Err(FenceError::MissingOpener)
        );
    }

    #[test]
    fn test_missing_closer_and_empty() {
        assert_eq!(
            extract_fenced_json("```json\n{\"a\": 1}"),
            Err(FenceError::MissingCloser)
        );
        assert_eq!(extract_fenced_json("  \n\n"), Err(FenceError::Empty));
    }

    #[test]
    fn test_scan_keys_payloads_by_position() {
        let cells = vec![
            cell(TagLabel::User, "not json at all"),
            cell(TagLabel::TurnMetadata, "```json\n{\"instructions\": []}\n```"),
            cell(
                TagLabel::HumanReport {
                    family: Family::Nemo,
                    index: 1,
                },
                "```json\n[]\n```",
            ),
        ];

        let scan = JsonBlockValidator::new().scan(&cells);
        assert!(scan.issues.is_empty());
        assert_eq!(scan.payloads.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert!(scan.payloads[&2].is_array());
    }

    #[test]
    fn test_scan_reports_each_cell() {
        let cells = vec![
            cell(TagLabel::TurnMetadata, "{}"),
            cell(
                TagLabel::ValidationReport {
                    family: Family::Qwen,
                    index: 1,
                },
                "```json\n{\"results\": [\n```",
            ),
            cell(TagLabel::Assistant, "```json\nnot parsed\n```"),
        ];

        let scan = JsonBlockValidator::new().scan(&cells);
        assert!(scan.payloads.is_empty());
        assert_eq!(scan.issues.len(), 2);
        assert_eq!(scan.issues[0].kind, ErrorKind::JsonFormatError);
        assert!(scan.issues[0].message.starts_with("Content must start"));
        assert_eq!(scan.issues[1].kind, ErrorKind::JsonSyntaxError);
        assert!(!scan.issues[1].message.is_empty());
    }
}
