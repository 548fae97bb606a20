//! Concurrent validation of a batch of transcript files.
//!
//! Each file is decoded and validated on the blocking pool; a semaphore caps
//! how many run at once. Outcomes are returned in input order regardless of
//! completion order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use transcheck_core::{Report, RuleConfig, Validator};

/// What happened to one file.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Valid { report: Report },
    Invalid { report: Report },
    /// The file could not be read or decoded
    Crash { error: String },
}

#[derive(Debug, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,

    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub validated_at: DateTime<Utc>,
    pub rules: String,
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub crashed: usize,
    pub files: Vec<FileOutcome>,
}

impl BatchSummary {
    /// True when every file decoded and validated cleanly.
    pub fn is_clean(&self) -> bool {
        self.invalid == 0 && self.crashed == 0
    }
}

pub async fn validate_batch(
    paths: Vec<PathBuf>,
    rules: RuleConfig,
    jobs: usize,
) -> Result<BatchSummary> {
    let rules_name = rules.name.clone();
    let validator = Arc::new(Validator::new(rules));
    let slots = Arc::new(Semaphore::new(jobs.max(1)));
    let mut tasks = JoinSet::new();

    for (position, path) in paths.into_iter().enumerate() {
        let permit = Arc::clone(&slots)
            .acquire_owned()
            .await
            .context("validation slots closed")?;
        let validator = Arc::clone(&validator);

        tasks.spawn_blocking(move || {
            let _permit = permit;
            let outcome = validate_one(&validator, &path);
            (position, FileOutcome { path, outcome })
        });
    }

    let mut finished = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        finished.push(joined.context("validation task failed")?);
    }
    finished.sort_by_key(|(position, _)| *position);

    let files: Vec<FileOutcome> = finished.into_iter().map(|(_, file)| file).collect();
    let count = |pred: fn(&Outcome) -> bool| files.iter().filter(|f| pred(&f.outcome)).count();

    Ok(BatchSummary {
        validated_at: Utc::now(),
        rules: rules_name,
        total: files.len(),
        valid: count(|o| matches!(o, Outcome::Valid { .. })),
        invalid: count(|o| matches!(o, Outcome::Invalid { .. })),
        crashed: count(|o| matches!(o, Outcome::Crash { .. })),
        files,
    })
}

fn validate_one(validator: &Validator, path: &Path) -> Outcome {
    match validator.validate_file(path) {
        Ok(report) if report.valid => {
            debug!(path = %path.display(), "transcript valid");
            Outcome::Valid { report }
        }
        Ok(report) => {
            debug!(path = %path.display(), errors = report.errors.len(), "transcript invalid");
            Outcome::Invalid { report }
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not decode transcript");
            Outcome::Crash {
                error: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("transcheck-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_batch_keeps_input_order() {
        let dir = scratch_dir("batch-order");
        let no_assistant = dir.join("no_assistant.json");
        let garbage = dir.join("garbage.json");
        let missing = dir.join("missing.json");

        fs::write(
            &no_assistant,
            r#"{ "cells": [ { "source": "" }, { "source": "**[user]**\n\nHello" } ] }"#,
        )
        .unwrap();
        fs::write(&garbage, "this is not json").unwrap();

        let summary = validate_batch(
            vec![garbage.clone(), no_assistant.clone(), missing.clone()],
            RuleConfig::standard(),
            1,
        )
        .await
        .unwrap();

        fs::remove_dir_all(&dir).unwrap();

        let paths: Vec<&PathBuf> = summary.files.iter().map(|f| &f.path).collect();
        assert_eq!(paths, vec![&garbage, &no_assistant, &missing]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.valid, 0);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.crashed, 2);
        assert!(!summary.is_clean());
        assert!(matches!(summary.files[1].outcome, Outcome::Invalid { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_batch_is_clean() {
        let summary = validate_batch(Vec::new(), RuleConfig::strict(), 4)
            .await
            .unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.rules, "strict");
        assert!(summary.is_clean());
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let file = FileOutcome {
            path: PathBuf::from("t.json"),
            outcome: Outcome::Crash {
                error: "bad".to_string(),
            },
        };
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["outcome"], "crash");
        assert_eq!(value["error"], "bad");
        assert_eq!(value["path"], "t.json");
    }
}
