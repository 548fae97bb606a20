//! Aggregator: merges per-stage issue streams into one report.
//!
//! The aggregator applies fixed ordering rules:
//! 1. Format issues first, then structure, length, JSON and cross-reference
//! 2. Within a stage, issues keep their discovery order
//! 3. A report is valid iff no stage produced an issue
//!
//! Nothing short-circuits: every stage's issues reach the report.

use std::collections::BTreeMap;

use crate::issue::Issue;
use crate::types::{ErrorKind, Metadata, Report, Stats};

/// Issues produced by each pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct IssueStreams {
    pub format: Vec<Issue>,
    pub structure: Vec<Issue>,
    pub length: Vec<Issue>,
    pub json: Vec<Issue>,
    pub cross_reference: Vec<Issue>,
}

impl IssueStreams {
    /// All issues in report order.
    fn into_ordered(self) -> Vec<Issue> {
        let mut errors = self.format;
        errors.extend(self.structure);
        errors.extend(self.length);
        errors.extend(self.json);
        errors.extend(self.cross_reference);
        errors
    }
}

/// The Aggregator builds the final report from the stage streams.
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    /// Merge issue streams into a report.
    ///
    /// `total_cells` is the number of cells that entered the tag sequence.
    pub fn aggregate(&self, streams: IssueStreams, metadata: Metadata, total_cells: usize) -> Report {
        let errors = streams.into_ordered();

        Report {
            valid: errors.is_empty(),
            stats: self.stats(&errors, total_cells),
            errors,
            metadata,
        }
    }

    fn stats(&self, errors: &[Issue], total_cells: usize) -> Stats {
        let mut counts: BTreeMap<ErrorKind, usize> =
            ErrorKind::ALL.iter().map(|kind| (*kind, 0)).collect();
        for error in errors {
            *counts.entry(error.kind).or_insert(0) += 1;
        }

        Stats { total_cells, counts }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
