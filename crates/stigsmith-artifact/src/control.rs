//! Compliance control model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// STIG control identifier (e.g. `V-230222`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(String);

impl ControlId {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ControlId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One control inside a baseline manifest
///
/// A stub carries `implementation: None`; the implementation pass fills it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEntry {
    pub id: ControlId,
    pub description: String,
    pub implementation: Option<String>,
}

impl ControlEntry {
    /// Enumerated control with no check logic yet
    #[inline]
    #[must_use]
    pub fn stub(id: impl Into<ControlId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            implementation: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn implemented(
        id: impl Into<ControlId>,
        description: impl Into<String>,
        implementation: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            implementation: Some(implementation.into()),
        }
    }

    /// Replace the implementation text, keeping id and description
    #[inline]
    #[must_use]
    pub fn with_implementation(mut self, implementation: impl Into<String>) -> Self {
        self.implementation = Some(implementation.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn is_implemented(&self) -> bool {
        self.implementation
            .as_deref()
            .is_some_and(|code| !code.trim().is_empty())
    }
}

impl From<String> for ControlId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Validated control implementation kept in the knowledge store
///
/// Immutable once written. The store may hold several records for the same
/// control id; retrieval prefers the newest `validated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub control_id: ControlId,
    pub description: String,
    pub implementation: String,
    pub source_baseline: String,
    pub validated_at: DateTime<Utc>,
}

impl ControlRecord {
    #[must_use]
    pub fn new(
        control_id: ControlId,
        description: impl Into<String>,
        implementation: impl Into<String>,
        source_baseline: impl Into<String>,
        validated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            control_id,
            description: description.into(),
            implementation: implementation.into(),
            source_baseline: source_baseline.into(),
            validated_at,
        }
    }

    /// True if `self` should win over `other` on retrieval
    #[inline]
    #[must_use]
    pub fn supersedes(&self, other: &ControlRecord) -> bool {
        self.validated_at > other.validated_at
    }
}
