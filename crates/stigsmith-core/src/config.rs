//! Orchestrator configuration
//!
//! Passed to [`WorkflowEngine::new`](crate::WorkflowEngine::new) as a value.
//! Nothing in the core reads configuration from the environment, so
//! concurrent runs with different settings never interfere.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
    pub remediation: RemediationConfig,
    pub memory: MemoryConfig,
    /// Tool service endpoints, keyed by service name (consumed by adapters)
    pub endpoints: BTreeMap<String, String>,
}

impl OrchestratorConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_max_remediation_attempts(mut self, max: u32) -> Self {
        self.remediation.max_attempts = max;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_endpoint(mut self, service: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(service.into(), url.into());
        self
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// `ConfigError::Parse` for malformed TOML, `ConfigError::Invalid` for
    /// values that fail [`validate`](Self::validate).
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// I/O, parse or validation failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// Serialization failure.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// # Errors
    /// `ConfigError::Invalid` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry.max_backoff_ms must not be below retry.initial_backoff_ms".to_string(),
            ));
        }
        for (name, secs) in self.timeouts.entries() {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("timeouts.{name} must be non-zero")));
            }
        }
        if self.memory.max_results == 0 {
            return Err(ConfigError::Invalid(
                "memory.max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            remediation: RemediationConfig::default(),
            memory: MemoryConfig::default(),
            endpoints: BTreeMap::new(),
        }
    }
}

/// Bounded exponential backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per operation, first call included
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            multiplier: 2.0,
        }
    }
}

/// Per-operation deadlines, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub acquire_stig_secs: u64,
    pub find_baseline_secs: u64,
    pub generate_stub_secs: u64,
    pub implement_secs: u64,
    pub provision_secs: u64,
    pub validation_secs: u64,
    pub commit_secs: u64,
    pub release_secs: u64,
}

impl TimeoutConfig {
    fn entries(&self) -> [(&'static str, u64); 8] {
        [
            ("acquire_stig_secs", self.acquire_stig_secs),
            ("find_baseline_secs", self.find_baseline_secs),
            ("generate_stub_secs", self.generate_stub_secs),
            ("implement_secs", self.implement_secs),
            ("provision_secs", self.provision_secs),
            ("validation_secs", self.validation_secs),
            ("commit_secs", self.commit_secs),
            ("release_secs", self.release_secs),
        ]
    }

    /// Same deadline for every operation
    #[must_use]
    pub fn uniform(secs: u64) -> Self {
        Self {
            acquire_stig_secs: secs,
            find_baseline_secs: secs,
            generate_stub_secs: secs,
            implement_secs: secs,
            provision_secs: secs,
            validation_secs: secs,
            commit_secs: secs,
            release_secs: secs,
        }
    }

    #[inline]
    #[must_use]
    pub fn acquire_stig(&self) -> Duration {
        Duration::from_secs(self.acquire_stig_secs)
    }

    #[inline]
    #[must_use]
    pub fn find_baseline(&self) -> Duration {
        Duration::from_secs(self.find_baseline_secs)
    }

    #[inline]
    #[must_use]
    pub fn generate_stub(&self) -> Duration {
        Duration::from_secs(self.generate_stub_secs)
    }

    #[inline]
    #[must_use]
    pub fn implement(&self) -> Duration {
        Duration::from_secs(self.implement_secs)
    }

    #[inline]
    #[must_use]
    pub fn provision(&self) -> Duration {
        Duration::from_secs(self.provision_secs)
    }

    #[inline]
    #[must_use]
    pub fn validation(&self) -> Duration {
        Duration::from_secs(self.validation_secs)
    }

    #[inline]
    #[must_use]
    pub fn commit(&self) -> Duration {
        Duration::from_secs(self.commit_secs)
    }

    #[inline]
    #[must_use]
    pub fn release(&self) -> Duration {
        Duration::from_secs(self.release_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            acquire_stig_secs: 300,
            find_baseline_secs: 120,
            generate_stub_secs: 120,
            implement_secs: 900,
            provision_secs: 300,
            validation_secs: 900,
            commit_secs: 60,
            release_secs: 60,
        }
    }
}

/// Test-and-repair loop bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    pub max_attempts: u32,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Knowledge-store retrieval tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_results: usize,
    /// Minimum cosine similarity for a record to be returned
    pub min_score: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            min_score: 0.1,
        }
    }
}
