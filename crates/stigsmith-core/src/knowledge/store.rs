//! In-process knowledge store
//!
//! Records live in a `DashMap` keyed by control id, so a query only takes
//! shard read locks while it snapshots the newest record per control and
//! never waits on a whole-store write lock. A commit landing during a query
//! may or may not be visible to it.

use super::similarity::{cosine, TfIdfIndex};
use crate::config::MemoryConfig;
use crate::error::ToolError;
use crate::tools::{BaselineCommit, MemoryQuery, MemoryStore};
use crate::types::Ack;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use stigsmith_artifact::{ControlId, ControlRecord};

#[derive(Debug, Default)]
pub struct InMemoryKnowledgeStore {
    records: DashMap<ControlId, Vec<ControlRecord>>,
    config: MemoryConfig,
    commits: AtomicUsize,
}

impl InMemoryKnowledgeStore {
    #[must_use]
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            records: DashMap::new(),
            config,
            commits: AtomicUsize::new(0),
        }
    }

    /// Add one record; exact duplicates are ignored
    ///
    /// Returns `true` if the record was new.
    pub fn insert(&self, record: ControlRecord) -> bool {
        let mut history = self.records.entry(record.control_id.clone()).or_default();
        let duplicate = history.iter().any(|existing| {
            existing.source_baseline == record.source_baseline
                && existing.implementation == record.implementation
        });
        if duplicate {
            return false;
        }
        history.push(record);
        true
    }

    /// Every record held for `control`, oldest first
    #[must_use]
    pub fn history(&self, control: &ControlId) -> Vec<ControlRecord> {
        let mut records = self
            .records
            .get(control)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        records.sort_by_key(|r| r.validated_at);
        records
    }

    /// Newest record for `control`
    #[must_use]
    pub fn latest(&self, control: &ControlId) -> Option<ControlRecord> {
        self.records
            .get(control)
            .and_then(|entry| newest(entry.value()).cloned())
    }

    /// Total records across all controls
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct control ids with at least one record
    #[must_use]
    pub fn control_count(&self) -> usize {
        self.records.len()
    }

    /// Number of `commit_memory` calls that reached the store
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Rank the newest record per control against `query`
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<(f32, ControlRecord)> {
        let candidates: Vec<ControlRecord> = self
            .records
            .iter()
            .filter_map(|entry| newest(entry.value()).cloned())
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }

        let corpus: Vec<&str> = candidates.iter().map(|r| r.description.as_str()).collect();
        let index = TfIdfIndex::from_corpus(&corpus);
        let needle = index.embed(query);
        if needle.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(f32, ControlRecord)> = candidates
            .into_iter()
            .map(|record| (cosine(&needle, &index.embed(&record.description)), record))
            .filter(|(score, _)| *score > 0.0 && *score >= self.config.min_score)
            .collect();
        scored.sort_by(|(a, ra), (b, rb)| {
            b.total_cmp(a)
                .then_with(|| rb.validated_at.cmp(&ra.validated_at))
                .then_with(|| ra.control_id.cmp(&rb.control_id))
        });
        scored.truncate(self.config.max_results);
        scored
    }
}

fn newest(records: &[ControlRecord]) -> Option<&ControlRecord> {
    records.iter().reduce(|best, r| if r.supersedes(best) { r } else { best })
}

#[async_trait]
impl MemoryQuery for InMemoryKnowledgeStore {
    async fn query_memory(
        &self,
        control_description: &str,
    ) -> Result<Vec<ControlRecord>, ToolError> {
        Ok(self
            .search(control_description)
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }
}

#[async_trait]
impl MemoryStore for InMemoryKnowledgeStore {
    async fn commit_memory(&self, commit: &BaselineCommit) -> Result<Ack, ToolError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let records_written = commit
            .records
            .iter()
            .filter(|record| self.insert((*record).clone()))
            .count();
        tracing::debug!(
            baseline = %commit.baseline.id,
            records_written,
            submitted = commit.records.len(),
            "knowledge commit"
        );
        Ok(Ack { records_written })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use stigsmith_artifact::{BaselineHandle, BaselineKind};

    fn record(id: &str, description: &str, code: &str, minutes: i64) -> ControlRecord {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ControlRecord::new(
            ControlId::new(id),
            description,
            code,
            "rhel-9",
            base + Duration::minutes(minutes),
        )
    }

    fn seeded() -> InMemoryKnowledgeStore {
        let store = InMemoryKnowledgeStore::default();
        store.insert(record("V-1", "SSH daemon must not permit root login", "old", 0));
        store.insert(record("V-1", "SSH daemon must not permit root login", "new", 5));
        store.insert(record("V-2", "Audit log files must be group-owned by root", "audit", 1));
        store.insert(record("V-3", "FIPS cryptographic module enabled", "fips", 2));
        store
    }

    #[tokio::test]
    async fn query_prefers_newest_duplicate() {
        let store = seeded();
        let hits = store.query_memory("ssh root login").await.unwrap();
        assert_eq!(hits[0].control_id, ControlId::new("V-1"));
        assert_eq!(hits[0].implementation, "new");
        assert_eq!(hits.iter().filter(|r| r.control_id.as_str() == "V-1").count(), 1);
    }

    #[tokio::test]
    async fn unrelated_query_is_empty_not_error() {
        let store = seeded();
        assert!(store.query_memory("kubernetes pod security").await.unwrap().is_empty());
        assert!(InMemoryKnowledgeStore::default()
            .query_memory("ssh")
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn max_results_caps_output() {
        let store = InMemoryKnowledgeStore::new(MemoryConfig {
            max_results: 1,
            min_score: 0.0,
        });
        store.insert(record("V-1", "root login over ssh", "a", 0));
        store.insert(record("V-2", "root owns audit logs", "b", 0));
        assert_eq!(store.search("root").len(), 1);
    }

    #[test]
    fn history_keeps_every_version() {
        let store = seeded();
        let history = store.history(&ControlId::new("V-1"));
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].implementation, "old");
        assert_eq!(store.latest(&ControlId::new("V-1")).unwrap().implementation, "new");
        assert_eq!(store.len(), 4);
        assert_eq!(store.control_count(), 3);
    }

    #[tokio::test]
    async fn commit_is_idempotent() {
        let store = InMemoryKnowledgeStore::default();
        let commit = BaselineCommit {
            baseline: BaselineHandle::new("rhel-9", "loc", BaselineKind::Implemented, vec![]),
            records: vec![record("V-9", "banner text", "code", 0)],
        };
        assert_eq!(store.commit_memory(&commit).await.unwrap().records_written, 1);
        assert_eq!(store.commit_memory(&commit).await.unwrap().records_written, 0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.commit_count(), 2);
    }
}
