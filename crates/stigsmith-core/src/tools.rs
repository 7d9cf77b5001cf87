//! Tool client interfaces
//!
//! One trait per external tool service. Each call either returns its typed
//! result or a [`ToolError`] that distinguishes a definitive "not found"
//! from a transient failure, because the engine branches and retries on
//! that difference.
//!
//! Adapters own idempotence: calling any method twice with the same input
//! must not duplicate side effects (re-downloads, re-clones, double commits).

use crate::error::ToolError;
use crate::types::{Ack, ValidationResult};
use async_trait::async_trait;
use std::sync::Arc;
use stigsmith_artifact::{BaselineHandle, ContainerHandle, ControlId, ControlRecord, StigHandle};

/// DISA STIG download service
#[async_trait]
pub trait StigSource: Send + Sync {
    async fn acquire_stig(&self, product: &str, version: &str) -> Result<StigHandle, ToolError>;
}

/// Published baseline search (e.g. MITRE SAF repositories)
#[async_trait]
pub trait BaselineCatalog: Send + Sync {
    async fn find_baseline(&self, product: &str, version: &str)
        -> Result<BaselineHandle, ToolError>;
}

/// Baseline skeleton generator driven by the STIG control list
#[async_trait]
pub trait StubGenerator: Send + Sync {
    async fn generate_stub(&self, stig: &StigHandle) -> Result<BaselineHandle, ToolError>;
}

/// Read side of the knowledge store, handed to implementers for examples
#[async_trait]
pub trait MemoryQuery: Send + Sync {
    /// Records similar to `control_description`, best first. Empty is fine.
    async fn query_memory(&self, control_description: &str)
        -> Result<Vec<ControlRecord>, ToolError>;
}

/// One knowledge-store write covering a whole baseline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineCommit {
    pub baseline: BaselineHandle,
    pub records: Vec<ControlRecord>,
}

/// Knowledge store: similarity queries plus per-baseline commits
#[async_trait]
pub trait MemoryStore: MemoryQuery {
    /// Persist every record of one baseline. The store fans out internally.
    async fn commit_memory(&self, commit: &BaselineCommit) -> Result<Ack, ToolError>;
}

/// Read-only view of a [`MemoryStore`], handed to implementers
///
/// Implementers get query access only; commits happen once per run, after
/// validation succeeds.
#[derive(Clone, Copy)]
pub struct StoreReader<'a>(pub &'a dyn MemoryStore);

#[async_trait]
impl MemoryQuery for StoreReader<'_> {
    async fn query_memory(
        &self,
        control_description: &str,
    ) -> Result<Vec<ControlRecord>, ToolError> {
        self.0.query_memory(control_description).await
    }
}

/// What a remediation pass should repair
#[derive(Debug, Clone, Copy)]
pub struct RemediationScope<'a> {
    /// 1-based attempt number
    pub attempt: u32,
    /// Controls that failed in `prior`; empty means "no specific control"
    pub failing: &'a [ControlId],
    /// The validation run being repaired
    pub prior: &'a ValidationResult,
}

/// Code-writing / repair capability
///
/// Usually backed by a language model. The engine treats it as opaque and
/// only sees the returned handle or error.
#[async_trait]
pub trait ControlImplementer: Send + Sync {
    /// Write check logic for every control of `baseline`
    async fn implement_controls(
        &self,
        baseline: &BaselineHandle,
        stig: &StigHandle,
        memory: &dyn MemoryQuery,
    ) -> Result<BaselineHandle, ToolError>;

    /// Rewrite the controls named in `scope.failing` using the prior run as context
    async fn remediate(
        &self,
        baseline: &BaselineHandle,
        stig: &StigHandle,
        scope: RemediationScope<'_>,
        memory: &dyn MemoryQuery,
    ) -> Result<BaselineHandle, ToolError>;
}

/// Container runtime providing test targets
#[async_trait]
pub trait TargetProvisioner: Send + Sync {
    async fn provision_target(&self, product: &str, version: &str)
        -> Result<ContainerHandle, ToolError>;

    /// Stop and remove a target. Releasing an already-released target is Ok.
    async fn release_target(&self, container: &ContainerHandle) -> Result<(), ToolError>;
}

/// InSpec runner
#[async_trait]
pub trait ValidationRunner: Send + Sync {
    async fn run_validation(
        &self,
        baseline: &BaselineHandle,
        container: &ContainerHandle,
    ) -> Result<ValidationResult, ToolError>;
}

/// The full set of adapters one engine drives
#[derive(Clone)]
pub struct ToolSuite {
    pub stig: Arc<dyn StigSource>,
    pub catalog: Arc<dyn BaselineCatalog>,
    pub generator: Arc<dyn StubGenerator>,
    pub implementer: Arc<dyn ControlImplementer>,
    pub provisioner: Arc<dyn TargetProvisioner>,
    pub runner: Arc<dyn ValidationRunner>,
    pub memory: Arc<dyn MemoryStore>,
}

impl ToolSuite {
    #[must_use]
    pub fn builder() -> ToolSuiteBuilder {
        ToolSuiteBuilder::default()
    }
}

impl std::fmt::Debug for ToolSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSuite").finish_non_exhaustive()
    }
}

/// Builder for [`ToolSuite`]; every adapter is required
#[derive(Default)]
pub struct ToolSuiteBuilder {
    stig: Option<Arc<dyn StigSource>>,
    catalog: Option<Arc<dyn BaselineCatalog>>,
    generator: Option<Arc<dyn StubGenerator>>,
    implementer: Option<Arc<dyn ControlImplementer>>,
    provisioner: Option<Arc<dyn TargetProvisioner>>,
    runner: Option<Arc<dyn ValidationRunner>>,
    memory: Option<Arc<dyn MemoryStore>>,
}

impl ToolSuiteBuilder {
    #[must_use]
    pub fn stig(mut self, adapter: Arc<dyn StigSource>) -> Self {
        self.stig = Some(adapter);
        self
    }

    #[must_use]
    pub fn catalog(mut self, adapter: Arc<dyn BaselineCatalog>) -> Self {
        self.catalog = Some(adapter);
        self
    }

    #[must_use]
    pub fn generator(mut self, adapter: Arc<dyn StubGenerator>) -> Self {
        self.generator = Some(adapter);
        self
    }

    #[must_use]
    pub fn implementer(mut self, adapter: Arc<dyn ControlImplementer>) -> Self {
        self.implementer = Some(adapter);
        self
    }

    #[must_use]
    pub fn provisioner(mut self, adapter: Arc<dyn TargetProvisioner>) -> Self {
        self.provisioner = Some(adapter);
        self
    }

    #[must_use]
    pub fn runner(mut self, adapter: Arc<dyn ValidationRunner>) -> Self {
        self.runner = Some(adapter);
        self
    }

    #[must_use]
    pub fn memory(mut self, adapter: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(adapter);
        self
    }

    /// # Errors
    /// Names the first adapter that was not supplied.
    pub fn build(self) -> Result<ToolSuite, &'static str> {
        Ok(ToolSuite {
            stig: self.stig.ok_or("stig")?,
            catalog: self.catalog.ok_or("catalog")?,
            generator: self.generator.ok_or("generator")?,
            implementer: self.implementer.ok_or("implementer")?,
            provisioner: self.provisioner.ok_or("provisioner")?,
            runner: self.runner.ok_or("runner")?,
            memory: self.memory.ok_or("memory")?,
        })
    }
}
