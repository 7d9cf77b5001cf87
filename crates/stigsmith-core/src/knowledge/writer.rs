//! Turns a validated baseline into one knowledge-store commit

use crate::error::ToolError;
use crate::tools::{BaselineCommit, MemoryStore};
use crate::types::Ack;
use chrono::{DateTime, Utc};
use stigsmith_artifact::inspec;
use stigsmith_artifact::{BaselineHandle, ControlEntry, ControlRecord};

#[derive(Debug, Clone, Copy, Default)]
pub struct KnowledgeWriter;

impl KnowledgeWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// One record per implemented control, stamped with `validated_at`
    ///
    /// Controls with no implementation text carry nothing worth reusing and
    /// are left out.
    #[must_use]
    pub fn records(&self, baseline: &BaselineHandle, validated_at: DateTime<Utc>) -> Vec<ControlRecord> {
        baseline
            .controls
            .iter()
            .filter(|control| control.is_implemented())
            .filter_map(|control| {
                let implementation = control.implementation.clone()?;
                Some(ControlRecord::new(
                    control.id.clone(),
                    describe(control),
                    implementation,
                    baseline.id.clone(),
                    validated_at,
                ))
            })
            .collect()
    }

    #[must_use]
    pub fn prepare(&self, baseline: &BaselineHandle, validated_at: DateTime<Utc>) -> BaselineCommit {
        BaselineCommit {
            baseline: baseline.clone(),
            records: self.records(baseline, validated_at),
        }
    }

    /// Single store write; retries are the caller's policy
    ///
    /// # Errors
    /// Whatever the store reports.
    pub async fn commit(&self, store: &dyn MemoryStore, commit: &BaselineCommit) -> Result<Ack, ToolError> {
        tracing::info!(
            baseline = %commit.baseline.id,
            digest = %commit.baseline.digest.short(),
            records = commit.records.len(),
            "committing baseline to knowledge store"
        );
        store.commit_memory(commit).await
    }
}

fn describe(control: &ControlEntry) -> String {
    let description = control.description.trim();
    if !description.is_empty() {
        return description.to_string();
    }
    control
        .implementation
        .as_deref()
        .and_then(inspec::extract_title)
        .unwrap_or_default()
}
