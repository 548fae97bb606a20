//! Turn and word counts against the ranges declared in the metadata header.

use tracing::debug;

use super::{last_assistant, Check, CheckInput};
use crate::issue::Issue;
use crate::range::{parse_range, Range};
use crate::rules::UserPromptPolicy;
use crate::tags::TagLabel;
use crate::types::{Cell, ErrorKind, Metadata, Stage};

const CONVERSATION_LENGTH: &str = "conversation length";
const SYSTEM_PROMPT_LENGTH: &str = "system prompt length";
const USER_PROMPT_LENGTH: &str = "user prompt length";

/// Number of whitespace-separated tokens.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// A parsed range together with the text it was written as.
struct Constraint<'a> {
    range: Range,
    text: &'a str,
}

impl Constraint<'_> {
    fn admits(&self, value: u64) -> bool {
        self.range.contains(value)
    }
}

/// Checks conversation turns, system prompt words and user prompt words.
pub struct LengthCheck;

impl LengthCheck {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LengthCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for LengthCheck {
    fn stage(&self) -> Stage {
        Stage::Length
    }

    fn run(&self, input: &CheckInput<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();
        if input.metadata.is_empty() {
            return issues;
        }

        let conversation = constraint(input.metadata, CONVERSATION_LENGTH, &mut issues);
        let system = constraint(input.metadata, SYSTEM_PROMPT_LENGTH, &mut issues);
        let user = constraint(input.metadata, USER_PROMPT_LENGTH, &mut issues);

        let Some(split) = length_split(input.cells) else {
            return issues;
        };
        let conversation_cells = &input.cells[..split];

        if let Some(c) = conversation {
            let turns = conversation_cells
                .iter()
                .filter(|cell| cell.tag == TagLabel::User)
                .count();
            if !c.admits(turns as u64) {
                issues.push(Issue::new(
                    ErrorKind::LengthError,
                    format!("Conversation turns ({turns}) outside range ({}).", c.text),
                ));
            }
        }

        if let Some(c) = system {
            let words: usize = conversation_cells
                .iter()
                .filter(|cell| cell.tag == TagLabel::System)
                .map(|cell| word_count(&cell.body))
                .sum();
            // An absent system prompt is not a length violation.
            if words > 0 && !c.admits(words as u64) {
                issues.push(Issue::new(
                    ErrorKind::LengthError,
                    format!("System prompt words ({words}) outside range ({}).", c.text),
                ));
            }
        }

        if let Some(c) = user {
            let users: Vec<&Cell> = conversation_cells
                .iter()
                .filter(|cell| cell.tag == TagLabel::User)
                .collect();
            check_user_prompts(&users, &c, input.rules.user_prompt_policy, &mut issues);
        }

        debug!(stage = %self.stage(), issues = issues.len(), "check complete");
        issues
    }
}

fn constraint<'a>(
    metadata: &'a Metadata,
    key: &str,
    issues: &mut Vec<Issue>,
) -> Option<Constraint<'a>> {
    let text = metadata.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())?;

    match parse_range(text) {
        Some(range) => Some(Constraint { range, text }),
        None => {
            issues.push(Issue::new(
                ErrorKind::MetadataError,
                format!("Could not parse range for '{key}'. Value found: '{text}'"),
            ));
            None
        }
    }
}

/// End of the region counted for lengths.
///
/// The final turn's `[turn_metadata] [thinking]` pair is excluded when it
/// sits in place; `None` when there is no plain `[assistant]`.
fn length_split(cells: &[Cell]) -> Option<usize> {
    let last = last_assistant(cells)?;
    if last > 1
        && cells[last - 1].tag == TagLabel::Thinking
        && cells[last - 2].tag == TagLabel::TurnMetadata
    {
        Some(last - 2)
    } else {
        Some(last)
    }
}

fn check_user_prompts(
    users: &[&Cell],
    constraint: &Constraint<'_>,
    policy: UserPromptPolicy,
    issues: &mut Vec<Issue>,
) {
    if users.is_empty() {
        return;
    }

    match policy {
        UserPromptPolicy::Average => {
            let total: usize = users.iter().map(|cell| word_count(&cell.body)).sum();
            let avg = (total as f64 / users.len() as f64).round_ties_even() as u64;
            if !constraint.admits(avg) {
                issues.push(Issue::new(
                    ErrorKind::LengthError,
                    format!(
                        "Avg user prompt words ({avg}) outside range ({}).",
                        constraint.text
                    ),
                ));
            }
        }
        UserPromptPolicy::PerTurn => {
            for cell in users {
                let words = word_count(&cell.body);
                if !constraint.admits(words as u64) {
                    issues.push(Issue::at_cell(
                        ErrorKind::LengthError,
                        cell,
                        format!(
                            "User prompt words ({words}) outside range ({}).",
                            constraint.text
                        ),
                    ));
                }
            }
        }
    }
}
