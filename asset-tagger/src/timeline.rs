use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    BuildPrompt,
    FetchRendition,
    StagePayload,
    Encode,
    Infer,
    Normalize,
    Commit,
    CommitFallback,
    Cleanup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub detail: String,
    pub elapsed_ms: u64,
    pub at: DateTime<Utc>,
}

/// Append-only record of what one run did. Owned by the run, handed back with its result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline {
    records: Vec<StageRecord>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: Stage, status: StageStatus, detail: impl Into<String>, elapsed: Duration) {
        self.records.push(StageRecord {
            stage,
            status,
            detail: detail.into(),
            elapsed_ms: elapsed.as_millis() as u64,
            at: Utc::now(),
        });
    }

    pub fn succeeded(&mut self, stage: Stage, detail: impl Into<String>, elapsed: Duration) {
        self.record(stage, StageStatus::Succeeded, detail, elapsed);
    }

    pub fn failed(&mut self, stage: Stage, detail: impl Into<String>, elapsed: Duration) {
        self.record(stage, StageStatus::Failed, detail, elapsed);
    }

    pub fn skipped(&mut self, stage: Stage, detail: impl Into<String>) {
        self.record(stage, StageStatus::Skipped, detail, Duration::ZERO);
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.records.iter().map(|r| r.stage).collect()
    }

    pub fn find(&self, stage: Stage) -> Option<&StageRecord> {
        self.records.iter().find(|r| r.stage == stage)
    }

    pub fn count(&self, stage: Stage) -> usize {
        self.records.iter().filter(|r| r.stage == stage).count()
    }
}
