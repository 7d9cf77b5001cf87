//! Core types for the workflow core
//!
//! - Run identifiers and task requests
//! - Validation results as reported by the test runner
//! - Small value types shared by adapters and the engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stigsmith_artifact::ControlId;
use ulid::Ulid;

/// Unique run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A baseline generation request
///
/// Immutable once built: the engine only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    product: String,
    version: String,
    correlation_id: Option<String>,
}

impl TaskRequest {
    #[must_use]
    pub fn new(product: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            product: product.into().trim().to_string(),
            version: version.into().trim().to_string(),
            correlation_id: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn product(&self) -> &str {
        &self.product
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[inline]
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Lowercase, punctuation stripped, whitespace runs joined by `-`
    ///
    /// `"Red Hat Enterprise Linux 9"` -> `"red-hat-enterprise-linux-9"`
    #[must_use]
    pub fn product_slug(&self) -> String {
        slugify(&self.product)
    }

    /// Name of the final artifact bundle
    #[must_use]
    pub fn bundle_name(&self) -> String {
        let version = slugify(&self.version);
        if version.is_empty() {
            format!("{}_baseline", self.product_slug())
        } else {
            format!("{}_{}_baseline", self.product_slug(), version)
        }
    }

    /// Reject requests no adapter could act on
    ///
    /// # Errors
    /// Returns a description of the first missing field.
    pub fn validate(&self) -> Result<(), String> {
        if self.product.is_empty() {
            return Err("product must not be empty".to_string());
        }
        if self.version.is_empty() {
            return Err("version must not be empty".to_string());
        }
        Ok(())
    }
}

fn slugify(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Acknowledgement of a knowledge-store commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Records written by the store
    pub records_written: usize,
}

/// Verdict for one control in a test run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ControlVerdict {
    Pass,
    Fail { detail: String },
    Skipped { reason: String },
}

impl ControlVerdict {
    #[inline]
    pub fn fail(detail: impl Into<String>) -> Self {
        Self::Fail {
            detail: detail.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }
}

/// Structured outcome of one test run, per control
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub verdicts: BTreeMap<ControlId, ControlVerdict>,
}

impl ValidationResult {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_verdict(mut self, control: impl Into<ControlId>, verdict: ControlVerdict) -> Self {
        self.verdicts.insert(control.into(), verdict);
        self
    }

    /// Every listed control passes
    #[must_use]
    pub fn all_pass<I, C>(controls: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ControlId>,
    {
        Self {
            verdicts: controls
                .into_iter()
                .map(|c| (c.into(), ControlVerdict::Pass))
                .collect(),
        }
    }

    /// At least one control evaluated and none failed
    ///
    /// Skipped controls were never evaluated, so an empty or all-skipped run
    /// is not a pass.
    #[must_use]
    pub fn is_passing(&self) -> bool {
        let summary = self.summary();
        summary.passed > 0 && summary.failed == 0
    }

    #[must_use]
    pub fn failing_controls(&self) -> Vec<ControlId> {
        self.verdicts
            .iter()
            .filter(|(_, v)| v.is_failure())
            .map(|(id, _)| id.clone())
            .collect()
    }

    #[must_use]
    pub fn summary(&self) -> ValidationSummary {
        let mut summary = ValidationSummary::default();
        for verdict in self.verdicts.values() {
            match verdict {
                ControlVerdict::Pass => summary.passed += 1,
                ControlVerdict::Fail { .. } => summary.failed += 1,
                ControlVerdict::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Where the baseline under validation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineOrigin {
    Discovered,
    Generated,
}
