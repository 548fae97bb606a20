//! Checks over an extracted transcript.
//!
//! Each check answers one question about the tag sequence or its payloads and
//! reports every violation it finds. Checks read the same input and never see
//! each other's output, so they can run in any order.
//!
//! | Check | Question |
//! |-------|----------|
//! | [`StructureCheck`] | Does the tag sequence follow the conversation grammar? |
//! | [`LengthCheck`] | Do turn and word counts fall within the declared ranges? |
//! | [`CrossReferenceCheck`] | Do the reports agree with the turn metadata and each other? |
//!
//! JSON payloads are extracted once by [`JsonBlockValidator`] before the
//! checks run.

use std::collections::BTreeMap;

use crate::issue::Issue;
use crate::rules::RuleConfig;
use crate::tags::TagLabel;
use crate::types::{Cell, Metadata, Stage};

mod cross_reference;
mod json_blocks;
mod length;
mod structure;

pub use cross_reference::{CrossReferenceCheck, JudgeResult, JudgeStatus, ReportSummary};
pub use json_blocks::{extract_fenced_json, FenceError, JsonBlockValidator, JsonScan};
pub use length::{word_count, LengthCheck};
pub use structure::StructureCheck;

/// Parsed JSON payloads keyed by position in the tag sequence.
pub type Payloads = BTreeMap<usize, serde_json::Value>;

/// Everything a check may read.
pub struct CheckInput<'a> {
    /// Tagged cells in authoring order
    pub cells: &'a [Cell],
    pub metadata: &'a Metadata,
    pub rules: &'a RuleConfig,
    pub payloads: &'a Payloads,
}

/// A single validation check.
pub trait Check {
    /// The pipeline stage this check reports under.
    fn stage(&self) -> Stage;

    /// The question this check answers.
    fn question(&self) -> &'static str {
        self.stage().description()
    }

    /// Run the check and return every violation found, in discovery order.
    fn run(&self, input: &CheckInput<'_>) -> Vec<Issue>;
}

/// Position of the last plain `[assistant]` tag.
pub(crate) fn last_assistant(cells: &[Cell]) -> Option<usize> {
    cells.iter().rposition(|c| c.tag == TagLabel::Assistant)
}
