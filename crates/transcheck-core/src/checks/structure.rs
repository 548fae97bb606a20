//! Structural grammar over the tag sequence.
//!
//! The sequence splits at the final plain `[assistant]` into three regions:
//!
//! ```text
//! conversation area        final turn                                model-block region
//! [system] [user] ... | [turn_metadata] [thinking] [assistant] | ([conversation_end]) 4-cell blocks ...
//! ```
//!
//! The conversation area is walked with a small state machine
//! ([`turn_transition`]); the model-block region is consumed in groups of four
//! ([`block_transition`]). Both walks resynchronize after an error instead of
//! stopping, so every violation is reported.

use std::collections::BTreeSet;

use tracing::debug;

use super::{last_assistant, Check, CheckInput};
use crate::issue::Issue;
use crate::tags::{Family, TagLabel};
use crate::types::{Cell, ErrorKind, Stage};

/// States of the conversation-area walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    /// Between turns
    Open,
    /// Saw `[user]`, a `[thinking]` must follow
    AwaitThinking,
    /// Saw `[user] [thinking]`, an `[assistant]` must follow
    AwaitAssistant,
}

/// Result of feeding one tag to the turn grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnStep {
    Advance(TurnState),
    /// The tag breaks the pending turn; it is re-read from `Open`
    Reject { expected: TagLabel, after: TagLabel },
}

/// Transition table for the conversation area.
///
/// `final_token` marks the last tag before the final turn. A `[user]` there
/// opens the final turn, which is answered by the final response rather than
/// inside the conversation area.
fn turn_transition(state: TurnState, tag: TagLabel, final_token: bool) -> TurnStep {
    match (state, tag) {
        (TurnState::Open, TagLabel::User) if final_token => TurnStep::Advance(TurnState::Open),
        (TurnState::Open, TagLabel::User) => TurnStep::Advance(TurnState::AwaitThinking),
        (TurnState::Open, _) => TurnStep::Advance(TurnState::Open),

        (TurnState::AwaitThinking, TagLabel::Thinking) => {
            TurnStep::Advance(TurnState::AwaitAssistant)
        }
        (TurnState::AwaitThinking, _) => TurnStep::Reject {
            expected: TagLabel::Thinking,
            after: TagLabel::User,
        },

        (TurnState::AwaitAssistant, TagLabel::Assistant) => TurnStep::Advance(TurnState::Open),
        (TurnState::AwaitAssistant, _) => TurnStep::Reject {
            expected: TagLabel::Assistant,
            after: TagLabel::Thinking,
        },
    }
}

/// Result of reading one 4-tag group in the model-block region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockStep {
    /// Well-formed block sharing this index
    Accept(u32),
    /// The group does not start with `[thinking]`; advance by one
    Resync,
    /// Response/report tags do not follow the family's block pattern
    Malformed,
    /// Response/report tags disagree on the block index
    IdMismatch,
}

fn block_transition(group: &[TagLabel; 4], family: Family) -> BlockStep {
    if group[0] != TagLabel::Thinking {
        return BlockStep::Resync;
    }

    match (group[1], group[2], group[3]) {
        (
            TagLabel::ModelResponse { family: f1, index: i1 },
            TagLabel::ValidationReport { family: f2, index: i2 },
            TagLabel::HumanReport { family: f3, index: i3 },
        ) if f1 == family && f2 == family && f3 == family => {
            if i1 == i2 && i2 == i3 {
                BlockStep::Accept(i1)
            } else {
                BlockStep::IdMismatch
            }
        }
        _ => BlockStep::Malformed,
    }
}

/// Enforces turn order, final-turn placement and model-block shape.
pub struct StructureCheck;

impl StructureCheck {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StructureCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for StructureCheck {
    fn stage(&self) -> Stage {
        Stage::Structure
    }

    fn run(&self, input: &CheckInput<'_>) -> Vec<Issue> {
        let walk = GrammarWalk {
            cells: input.cells,
            require_conversation_end: input.rules.require_conversation_end,
            issues: Vec::new(),
        };
        let issues = walk.run();

        debug!(stage = %self.stage(), issues = issues.len(), "check complete");
        issues
    }
}

struct GrammarWalk<'a> {
    cells: &'a [Cell],
    require_conversation_end: bool,
    issues: Vec<Issue>,
}

impl<'a> GrammarWalk<'a> {
    fn run(mut self) -> Vec<Issue> {
        if self.cells.is_empty() {
            self.error(None, "No tagged cells found in this transcript.");
            return self.issues;
        }

        let Some(last) = last_assistant(self.cells) else {
            self.error(
                None,
                "Could not find any [assistant] tag. The conversation must contain at least one assistant response.",
            );
            return self.issues;
        };

        self.check_final_turn(last);

        let split = last.saturating_sub(2);
        self.check_conversation_tags(split);
        self.walk_turns(split);

        if let Some((start, family)) = self.model_region(last) {
            self.walk_model_blocks(start, family);
        }

        self.issues
    }

    fn tag(&self, pos: usize) -> TagLabel {
        self.cells[pos].tag
    }

    fn report(&mut self, kind: ErrorKind, pos: Option<usize>, message: impl Into<String>) {
        let cells = self.cells;
        let cell = pos.and_then(|p| cells.get(p));
        self.issues.push(Issue::near(kind, cell, message));
    }

    fn error(&mut self, pos: Option<usize>, message: impl Into<String>) {
        self.report(ErrorKind::StructureError, pos, message);
    }

    /// `[turn_metadata] [thinking]` must directly precede the final response.
    fn check_final_turn(&mut self, last: usize) {
        if last == 0 {
            self.error(Some(0), "The final [assistant] tag cannot be the very first cell.");
        }

        if last < 2 || self.tag(last - 2) != TagLabel::TurnMetadata {
            self.error(
                last.checked_sub(2),
                "The tag [turn_metadata] is missing or misplaced. It must appear two positions before the final [assistant] (before [thinking]).",
            );
        }

        if last < 1 || self.tag(last - 1) != TagLabel::Thinking {
            self.error(
                last.checked_sub(1),
                "The tag [thinking] is missing or misplaced. It must appear immediately before the final [assistant] cell.",
            );
        }
    }

    fn check_conversation_tags(&mut self, split: usize) {
        for pos in 0..split {
            let tag = self.tag(pos);
            if !tag.is_conversation_tag() {
                self.error(
                    Some(pos),
                    format!(
                        "Invalid tag {tag} found in the main conversation area. Only [system], [user], [thinking], or [assistant] are allowed here."
                    ),
                );
            }
        }
    }

    fn walk_turns(&mut self, split: usize) {
        let mut state = TurnState::Open;

        for pos in 0..split {
            let tag = self.tag(pos);
            let final_token = pos + 1 == split;

            state = match turn_transition(state, tag, final_token) {
                TurnStep::Advance(next) => next,
                TurnStep::Reject { expected, after } => {
                    self.error(
                        Some(pos),
                        format!("Expected {expected} after {after}, but found {tag}."),
                    );
                    match turn_transition(TurnState::Open, tag, final_token) {
                        TurnStep::Advance(next) => next,
                        TurnStep::Reject { .. } => TurnState::Open,
                    }
                }
            };
        }
        // A turn still pending here is the final one: its `[thinking]` sits
        // before `[turn_metadata]` and the final response answers it.
    }

    /// Start of the model-block region and its single family.
    fn model_region(&mut self, last: usize) -> Option<(usize, Family)> {
        let mut start = last + 1;
        if self.cells.get(start).map(|c| c.tag) == Some(TagLabel::ConversationEnd) {
            start += 1;
        } else if self.require_conversation_end {
            self.error(
                Some(last),
                "Expected [conversation_end] immediately after the final [assistant].",
            );
        }

        if start >= self.cells.len() {
            self.error(
                Some(last),
                "No model comparison blocks found after the final assistant response.",
            );
            return None;
        }

        let families: BTreeSet<Family> = self.cells[start..]
            .iter()
            .filter_map(|c| c.tag.family())
            .collect();

        match families.len() {
            0 => {
                self.error(None, "No valid 'nemo' or 'qwen' tags found in the model block section.");
                None
            }
            1 => families.into_iter().next().map(|family| (start, family)),
            _ => {
                let list = families
                    .iter()
                    .map(|f| f.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                self.error(
                    Some(start),
                    format!(
                        "Mixed model families detected ({list}). Use only 'nemo' blocks or only 'qwen' blocks in a single transcript."
                    ),
                );
                None
            }
        }
    }

    fn walk_model_blocks(&mut self, start: usize, family: Family) {
        let mut expected_index: u32 = 1;
        let mut pos = start;

        while pos < self.cells.len() {
            if pos + 4 > self.cells.len() {
                self.error(
                    Some(pos),
                    format!(
                        "Incomplete model block definition. A block must contain 4 cells: [thinking] -> [assistant_{family}_#] -> [assistant_{family}_#_validation_report] -> [assistant_{family}_#_human_report]."
                    ),
                );
                break;
            }

            let group = [self.tag(pos), self.tag(pos + 1), self.tag(pos + 2), self.tag(pos + 3)];

            match block_transition(&group, family) {
                BlockStep::Resync => {
                    self.error(
                        Some(pos),
                        format!(
                            "Expected [thinking] at the start of model block #{expected_index}, but found {}.",
                            group[0]
                        ),
                    );
                    pos += 1;
                    continue;
                }
                BlockStep::Malformed => self.error(
                    Some(pos + 1),
                    format!(
                        "Invalid tag sequence. Expected [thinking] -> [assistant_{family}_#] -> [assistant_{family}_#_validation_report] -> [assistant_{family}_#_human_report]. Found: {}, {}, {}, {}.",
                        group[0], group[1], group[2], group[3]
                    ),
                ),
                BlockStep::IdMismatch => self.error(
                    Some(pos + 1),
                    format!(
                        "ID mismatch. Tags have different numbers: {}, {}, {}. They must share the same index.",
                        group[1], group[2], group[3]
                    ),
                ),
                BlockStep::Accept(index) => {
                    if index != expected_index {
                        self.report(
                            ErrorKind::SequenceError,
                            Some(pos + 1),
                            format!(
                                "Unexpected index for {family}. Expected block #{expected_index}, but found block #{index}."
                            ),
                        );
                    }
                    expected_index += 1;
                }
            }

            pos += 4;
        }
    }
}
