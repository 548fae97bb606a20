//! Issues raised during validation.
//!
//! Every issue points at the cell that caused it when there is one, so a
//! reader can jump straight to the offending block.

use serde::{Deserialize, Serialize};

use crate::tags::TagLabel;
use crate::types::{Cell, ErrorKind};

/// A single violation found in a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: ErrorKind,

    /// Document position of the offending cell
    pub cell: Option<usize>,

    /// Tag of the offending cell, when it had a recognized one
    pub tag: Option<TagLabel>,

    pub message: String,

    /// Short preview of the offending content
    pub snippet: String,
}

impl Issue {
    /// Create an issue that is not tied to any cell.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            cell: None,
            tag: None,
            message: message.into(),
            snippet: String::new(),
        }
    }

    /// Create an issue located at a tagged cell.
    pub fn at_cell(kind: ErrorKind, cell: &Cell, message: impl Into<String>) -> Self {
        Self {
            kind,
            cell: Some(cell.index),
            tag: Some(cell.tag),
            message: message.into(),
            snippet: cell.preview.clone(),
        }
    }

    /// Create an issue located at a cell if one exists at that position.
    pub fn near(kind: ErrorKind, cell: Option<&Cell>, message: impl Into<String>) -> Self {
        match cell {
            Some(cell) => Self::at_cell(kind, cell, message),
            None => Self::new(kind, message),
        }
    }
}

/// Builder for issues raised before a cell has a tag.
pub struct IssueBuilder {
    kind: ErrorKind,
    message: String,
    cell: Option<usize>,
    tag: Option<TagLabel>,
    snippet: String,
}

impl IssueBuilder {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cell: None,
            tag: None,
            snippet: String::new(),
        }
    }

    pub fn cell(mut self, index: usize) -> Self {
        self.cell = Some(index);
        self
    }

    pub fn tag(mut self, tag: TagLabel) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn build(self) -> Issue {
        Issue {
            kind: self.kind,
            cell: self.cell,
            tag: self.tag,
            message: self.message,
            snippet: self.snippet,
        }
    }
}
