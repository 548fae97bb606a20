//! Consistency between the turn metadata and the model-block reports.
//!
//! The last `[turn_metadata]` payload declares the checks a response is
//! judged against: `instructions` (automated) and `llm_judge` (rubric). Each
//! validation report must cover every declared check, each human report must
//! cover the `llm_judge` entries, and a human report may only disagree with the
//! validation report of its own block while the bar stays at least as strict.
//!
//! Only payloads that parsed are inspected; a malformed payload suppresses the
//! checks that depend on it and nothing else.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{Check, CheckInput};
use crate::issue::Issue;
use crate::rules::{ReconciliationPolicy, RuleConfig};
use crate::tags::TagLabel;
use crate::types::{Cell, ErrorKind, Stage};

/// Marker in result ids that belong to the rubric judge.
const LLM_JUDGE_PREFIX: &str = "llm_judge_";

/// Outcome of a single judged check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeStatus {
    Passed,
    Failed,
}

impl JudgeStatus {
    /// Case-insensitive parse of `passed` / `failed`.
    pub fn parse(status: &str) -> Option<Self> {
        match status.trim().to_lowercase().as_str() {
            "passed" => Some(JudgeStatus::Passed),
            "failed" => Some(JudgeStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JudgeStatus::Passed => "passed",
            JudgeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JudgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a report's result list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeResult {
    pub id: String,
    pub status: JudgeStatus,
}

impl JudgeResult {
    pub fn is_llm_judge(&self) -> bool {
        self.id.contains(LLM_JUDGE_PREFIX)
    }

    /// Identity used to compare judgments across reports.
    pub fn key(&self) -> String {
        format!("{}{}", self.id, self.status)
    }
}

/// Aggregate view of a report's result list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_length: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_percentage: f64,
    pub fail_percentage: f64,
    pub llm_passed: usize,
    pub llm_failed: usize,

    /// `id + status` of every `llm_judge_` result
    pub judge_set: BTreeSet<String>,
}

impl ReportSummary {
    pub fn from_results(results: &[JudgeResult]) -> Self {
        let mut summary = ReportSummary {
            total_length: results.len(),
            ..Default::default()
        };

        for result in results {
            let llm = result.is_llm_judge();
            match result.status {
                JudgeStatus::Passed => {
                    summary.passed += 1;
                    summary.llm_passed += usize::from(llm);
                }
                JudgeStatus::Failed => {
                    summary.failed += 1;
                    summary.llm_failed += usize::from(llm);
                }
            }
            if llm {
                summary.judge_set.insert(result.key());
            }
        }

        summary.pass_percentage = percentage(summary.passed as f64, summary.total_length);
        summary.fail_percentage = percentage(summary.failed as f64, summary.total_length);
        summary
    }
}

fn percentage(part: f64, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part / total as f64 * 100.0
    }
}

/// Checks declared in the governing turn metadata.
struct Declaration<'a> {
    instructions: &'a [Value],
    llm_judge: usize,
}

impl<'a> Declaration<'a> {
    fn from_payload(payload: &'a Value) -> Result<Self, String> {
        let object = payload
            .as_object()
            .ok_or_else(|| "[turn_metadata] payload must be a JSON object.".to_string())?;

        let list = |key: &str| -> Result<&'a [Value], String> {
            match object.get(key) {
                None => Ok(Default::default()),
                Some(Value::Array(items)) => Ok(items.as_slice()),
                Some(_) => Err(format!("[turn_metadata] field '{key}' must be a list.")),
            }
        };

        Ok(Self {
            instructions: list("instructions")?,
            llm_judge: list("llm_judge")?.len(),
        })
    }

    fn total(&self) -> usize {
        self.instructions.len() + self.llm_judge
    }
}

/// Parse a report payload: a top-level array or an object with `results`.
fn judge_results(payload: &Value) -> Result<Vec<JudgeResult>, String> {
    let list = payload
        .as_array()
        .or_else(|| payload.get("results").and_then(Value::as_array))
        .ok_or_else(|| {
            "Report must be a JSON list of results or an object with a 'results' list.".to_string()
        })?;

    list.iter()
        .enumerate()
        .map(|(i, entry)| {
            let n = i + 1;
            let id = entry.get("id").and_then(Value::as_str);
            let status = entry.get("status").and_then(Value::as_str);
            let (Some(id), Some(status)) = (id, status) else {
                return Err(format!("Result #{n} is missing a string 'id' or 'status' field."));
            };
            let status = JudgeStatus::parse(status).ok_or_else(|| {
                format!("Result #{n} has status '{status}'; expected 'passed' or 'failed'.")
            })?;
            Ok(JudgeResult {
                id: id.to_string(),
                status,
            })
        })
        .collect()
}

/// A report that passed its own checks and is ready for reconciliation.
struct CoveredReport<'a> {
    cell: &'a Cell,
    summary: ReportSummary,
}

/// Cross-checks turn metadata, validation reports and human reports.
pub struct CrossReferenceCheck;

impl CrossReferenceCheck {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CrossReferenceCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for CrossReferenceCheck {
    fn stage(&self) -> Stage {
        Stage::CrossReference
    }

    fn run(&self, input: &CheckInput<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();
        let cells = input.cells;

        let Some(meta_pos) = cells.iter().rposition(|c| c.tag == TagLabel::TurnMetadata) else {
            return issues;
        };
        let Some(payload) = input.payloads.get(&meta_pos) else {
            return issues;
        };
        let meta_cell = &cells[meta_pos];

        let declaration = match Declaration::from_payload(payload) {
            Ok(declaration) => declaration,
            Err(message) => {
                issues.push(error(meta_cell, message));
                return issues;
            }
        };

        check_declaration(&declaration, meta_cell, input.rules, &mut issues);

        let mut validations: BTreeMap<usize, CoveredReport<'_>> = BTreeMap::new();
        let mut humans: Vec<(usize, CoveredReport<'_>)> = Vec::new();

        for (pos, cell) in cells.iter().enumerate() {
            let (expected, is_human) = match cell.tag {
                TagLabel::ValidationReport { .. } => (declaration.total(), false),
                TagLabel::HumanReport { .. } => (declaration.llm_judge, true),
                _ => continue,
            };
            let Some(payload) = input.payloads.get(&pos) else {
                continue;
            };

            let results = match judge_results(payload) {
                Ok(results) => results,
                Err(message) => {
                    issues.push(error(cell, message));
                    continue;
                }
            };

            if results.len() != expected {
                let message = if is_human {
                    format!(
                        "Human report lists {} results but [turn_metadata] declares {expected} llm_judge entries.",
                        results.len()
                    )
                } else {
                    format!(
                        "Validation report lists {} results but [turn_metadata] declares {expected} (instructions + llm_judge).",
                        results.len()
                    )
                };
                issues.push(error(cell, message));
                continue;
            }

            let report = CoveredReport {
                cell,
                summary: ReportSummary::from_results(&results),
            };
            if is_human {
                humans.push((pos, report));
            } else {
                validations.insert(pos, report);
            }
        }

        for (pos, human) in &humans {
            let paired = paired_validation(cells, *pos).and_then(|v| validations.get(&v));
            if let Some(validation) = paired {
                reconcile(&validation.summary, human, input.rules, &mut issues);
            }
        }

        debug!(
            stage = %self.stage(),
            declared = declaration.total(),
            validation_reports = validations.len(),
            human_reports = humans.len(),
            issues = issues.len(),
            "check complete"
        );

        issues
    }
}

/// Position of the validation report sharing a block with the human report
/// at `pos`: the cell right before it, carrying the same family and index.
fn paired_validation(cells: &[Cell], pos: usize) -> Option<usize> {
    let TagLabel::HumanReport { family, index } = cells.get(pos)?.tag else {
        return None;
    };
    let prev = pos.checked_sub(1)?;
    (cells[prev].tag == TagLabel::ValidationReport { family, index }).then_some(prev)
}

fn error(cell: &Cell, message: impl Into<String>) -> Issue {
    Issue::at_cell(ErrorKind::CrossReferenceError, cell, message)
}

fn check_declaration(
    declaration: &Declaration<'_>,
    cell: &Cell,
    rules: &RuleConfig,
    issues: &mut Vec<Issue>,
) {
    let total = declaration.total();
    if total < rules.min_turn_metadata {
        issues.push(error(
            cell,
            format!(
                "[turn_metadata] declares {total} checks (instructions {} + llm_judge {}); at least {} are required.",
                declaration.instructions.len(),
                declaration.llm_judge,
                rules.min_turn_metadata
            ),
        ));
    }

    for (i, instruction) in declaration.instructions.iter().enumerate() {
        let Some(id) = instruction.get("instruction_id").and_then(Value::as_str) else {
            continue;
        };
        if rules.is_restricted(id) {
            issues.push(error(
                cell,
                format!("Restricted instruction '{id}' is not allowed (instructions[{i}])."),
            ));
        }
    }
}

fn reconcile(
    validation: &ReportSummary,
    human: &CoveredReport<'_>,
    rules: &RuleConfig,
    issues: &mut Vec<Issue>,
) {
    let human_summary = &human.summary;

    match rules.reconciliation {
        ReconciliationPolicy::Tolerant => {
            let agreed = validation
                .judge_set
                .intersection(&human_summary.judge_set)
                .count();
            if agreed == validation.judge_set.len() {
                return;
            }

            let extra_failed = validation.failed as i64
                + (human_summary.llm_failed as i64 - validation.llm_failed as i64);
            let failed_pct = percentage(extra_failed as f64, validation.total_length);

            if failed_pct < rules.min_fail_percentage {
                issues.push(error(
                    human.cell,
                    format!(
                        "Human review disagrees with the validation report on {} llm_judge results; adjusted failure rate {failed_pct:.1}% is below the required {}%.",
                        validation.judge_set.len() - agreed,
                        rules.min_fail_percentage
                    ),
                ));
            }
        }
        ReconciliationPolicy::Exact => {
            let mismatched = validation
                .judge_set
                .symmetric_difference(&human_summary.judge_set)
                .count();
            if mismatched > 0 {
                issues.push(error(
                    human.cell,
                    format!(
                        "Human report does not match the validation report's llm_judge results ({mismatched} mismatched entries)."
                    ),
                ));
            }
        }
    }
}
