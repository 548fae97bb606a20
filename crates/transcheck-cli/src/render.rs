use std::fmt::Write;

use anyhow::Result;
use transcheck_core::{Issue, Metadata};

use crate::batch::{BatchSummary, Outcome};

pub fn render_json(summary: &BatchSummary) -> Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

pub fn render_text(summary: &BatchSummary) -> String {
    let mut out = String::new();

    for file in &summary.files {
        let path = file.path.display();
        match &file.outcome {
            Outcome::Valid { report } => {
                let _ = writeln!(out, "{path}: VALID ({} tagged cells)", report.stats.total_cells);
                render_metadata(&mut out, &report.metadata);
            }
            Outcome::Invalid { report } => {
                let _ = writeln!(out, "{path}: INVALID ({} errors)", report.errors.len());
                render_metadata(&mut out, &report.metadata);
                for issue in &report.errors {
                    render_issue(&mut out, issue);
                }
            }
            Outcome::Crash { error } => {
                let _ = writeln!(out, "{path}: CRASH: {error}");
            }
        }
    }

    let _ = writeln!(
        out,
        "\n{} files: {} valid, {} invalid, {} crashed (rules: {}, {})",
        summary.total,
        summary.valid,
        summary.invalid,
        summary.crashed,
        summary.rules,
        summary.validated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    out
}

fn render_metadata(out: &mut String, metadata: &Metadata) {
    for (key, value) in metadata {
        let _ = writeln!(out, "  {key}: {value}");
    }
}

fn render_issue(out: &mut String, issue: &Issue) {
    let location = match (issue.cell, issue.tag) {
        (Some(cell), Some(tag)) => format!("cell {cell} {tag}"),
        (Some(cell), None) => format!("cell {cell}"),
        _ => "document".to_string(),
    };

    let _ = writeln!(out, "  [{}] {location}: {}", issue.kind, issue.message);
    if !issue.snippet.is_empty() {
        let _ = writeln!(out, "      > {}", issue.snippet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::FileOutcome;
    use chrono::Utc;
    use std::path::PathBuf;
    use transcheck_core::{validate, Document, ErrorKind, RawCell};

    fn summary() -> BatchSummary {
        let report = validate(&Document::from_cells(vec![
            RawCell::text(""),
            RawCell::text("**[user]**\n\nPlan a trip"),
        ]));

        BatchSummary {
            validated_at: Utc::now(),
            rules: "standard".to_string(),
            total: 2,
            valid: 0,
            invalid: 1,
            crashed: 1,
            files: vec![
                FileOutcome {
                    path: PathBuf::from("a.json"),
                    outcome: Outcome::Invalid { report },
                },
                FileOutcome {
                    path: PathBuf::from("b.json"),
                    outcome: Outcome::Crash {
                        error: "Failed to parse JSON: expected value".to_string(),
                    },
                },
            ],
        }
    }

    #[test]
    fn test_text_lists_every_file() {
        let text = render_text(&summary());

        assert!(text.contains("a.json: INVALID (1 errors)"));
        assert!(text.contains(&format!("[{}] document:", ErrorKind::StructureError)));
        assert!(text.contains("b.json: CRASH: Failed to parse JSON"));
        assert!(text.contains("2 files: 0 valid, 1 invalid, 1 crashed (rules: standard"));
    }

    #[test]
    fn test_text_shows_metadata() {
        let report = validate(&Document::from_cells(vec![
            RawCell::text("- Conversation length: 1-3\n- Category: Travel"),
            RawCell::text("**[user]**\n\nPlan a trip"),
        ]));
        let mut summary = summary();
        summary.files[0].outcome = Outcome::Invalid { report };

        let text = render_text(&summary);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("a.json: INVALID ("));
        assert_eq!(lines[1], "  category: Travel");
        assert_eq!(lines[2], "  conversation length: 1-3");
        assert!(lines[3].starts_with(&format!("  [{}]", ErrorKind::StructureError)));
    }

    #[test]
    fn test_json_is_parsable() {
        let json = render_json(&summary()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["invalid"], 1);
        assert_eq!(value["files"][0]["outcome"], "invalid");
        assert_eq!(value["files"][0]["report"]["valid"], false);
    }
}
