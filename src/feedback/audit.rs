// JSONL-based feedback audit log
//
// Append-only, line-delimited JSON records of every clinician consultation.

use crate::rl::dosing::{DoseAction, PatientState, TargetDoses};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One consultation as recorded for audit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    /// Normalized patient the proposal was made for
    pub state: PatientState,
    pub proposed: DoseAction,
    pub approved: bool,
    /// Clinician-supplied values; the proposal itself on approval
    pub correct_doses: TargetDoses,
    /// Reward target in force after the verdict
    #[serde(default)]
    pub target: TargetDoses,
}

impl FeedbackRecord {
    pub fn new(
        state: PatientState,
        proposed: DoseAction,
        approved: bool,
        correct_doses: TargetDoses,
        target: TargetDoses,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            state,
            proposed,
            approved,
            correct_doses,
            target,
        }
    }
}

/// Feedback log backed by a JSONL file
#[derive(Debug, Clone)]
pub struct FeedbackLog {
    path: PathBuf,
}

impl FeedbackLog {
    /// Open (and create the parent directory of) a log at `path`
    pub fn open<P: Into<PathBuf>>(path: P) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    pub fn append(&self, record: &FeedbackRecord) -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let line = serde_json::to_string(record)?;
        writeln!(file, "{}", line)?;
        file.flush()?;

        Ok(())
    }

    /// Load all records; unparseable lines are skipped with a warning
    pub fn load(&self) -> anyhow::Result<Vec<FeedbackRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<FeedbackRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        line = line_num + 1,
                        error = %e,
                        "failed to parse feedback record"
                    );
                }
            }
        }

        Ok(records)
    }

    /// Only the rejections, i.e. the corrections
    pub fn corrections(&self) -> anyhow::Result<Vec<FeedbackRecord>> {
        Ok(self.load()?.into_iter().filter(|r| !r.approved).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::dosing::PatientInput;
    use tempfile::TempDir;

    fn record(approved: bool) -> FeedbackRecord {
        let state = PatientInput {
            weight_kg: 70.0,
            duration_hr: 2.0,
            age_years: 40,
        }
        .normalize();
        FeedbackRecord::new(
            state,
            DoseAction::new(2.0, 7.0),
            approved,
            TargetDoses::new(2.5, 6.0),
            TargetDoses::new(2.5, 6.0),
        )
    }

    #[test]
    fn test_empty_log() {
        let dir = TempDir::new().unwrap();
        let log = FeedbackLog::open(dir.path().join("feedback.jsonl")).unwrap();
        assert!(log.load().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_load() {
        let dir = TempDir::new().unwrap();
        let log = FeedbackLog::open(dir.path().join("audit/feedback.jsonl")).unwrap();

        let first = record(false);
        log.append(&first).unwrap();
        log.append(&record(true)).unwrap();

        let records = log.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, first.id);
        assert!(!records[0].approved);
        assert!(records[1].approved);
        assert_eq!(log.corrections().unwrap().len(), 1);
    }

    #[test]
    fn test_skips_corrupt_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let log = FeedbackLog::open(&path).unwrap();

        log.append(&record(false)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(file).unwrap();
        log.append(&record(true)).unwrap();

        assert_eq!(log.load().unwrap().len(), 2);
    }
}
