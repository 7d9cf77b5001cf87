//! Deterministic in-process tool services
//!
//! [`ScriptedTools`] implements every tool trait from a [`Script`] that says
//! what the n-th call of each operation does. It counts calls, keeps an
//! idempotent download cache for `acquire_stig`, tracks live containers and
//! writes commits into an [`InMemoryKnowledgeStore`], so both the CLI and the
//! tests can drive the real engine end to end.

use crate::config::OrchestratorConfig;
use crate::error::ToolError;
use crate::knowledge::InMemoryKnowledgeStore;
use crate::reporter::RunReport;
use crate::tools::{
    BaselineCatalog, BaselineCommit, ControlImplementer, MemoryQuery, MemoryStore,
    RemediationScope, StigSource, StubGenerator, TargetProvisioner, ToolSuite, ValidationRunner,
};
use crate::types::{Ack, ControlVerdict, TaskRequest, ValidationResult};
use crate::workflow::WorkflowEngine;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stigsmith_artifact::{
    BaselineHandle, BaselineKind, ContainerHandle, ControlEntry, ControlId, ControlRecord,
    StigHandle,
};

/// Tool operations the simulator counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AcquireStig,
    FindBaseline,
    GenerateStub,
    ImplementControls,
    Remediate,
    ProvisionTarget,
    ReleaseTarget,
    RunValidation,
    QueryMemory,
    CommitMemory,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::AcquireStig,
        Operation::FindBaseline,
        Operation::GenerateStub,
        Operation::ImplementControls,
        Operation::Remediate,
        Operation::ProvisionTarget,
        Operation::ReleaseTarget,
        Operation::RunValidation,
        Operation::QueryMemory,
        Operation::CommitMemory,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::AcquireStig => "acquire_stig",
            Operation::FindBaseline => "find_baseline",
            Operation::GenerateStub => "generate_stub",
            Operation::ImplementControls => "implement_controls",
            Operation::Remediate => "remediate",
            Operation::ProvisionTarget => "provision_target",
            Operation::ReleaseTarget => "release_target",
            Operation::RunValidation => "run_validation",
            Operation::QueryMemory => "query_memory",
            Operation::CommitMemory => "commit_memory",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one call does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Succeed,
    Fail(ToolError),
    /// Never completes; only a timeout or cancellation ends the call
    Hang,
}

impl Step {
    #[must_use]
    pub fn not_found() -> Self {
        Self::Fail(ToolError::not_found("scripted"))
    }

    #[must_use]
    pub fn transport() -> Self {
        Self::Fail(ToolError::transport("scripted transport failure"))
    }
}

/// What one `run_validation` call reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationStep {
    PassAll,
    /// Listed controls fail, every other control passes
    Failing(Vec<ControlId>),
    /// No verdicts at all
    Empty,
    /// Every control reported as skipped
    AllSkipped,
    Fail(ToolError),
    Hang,
}

impl ValidationStep {
    #[must_use]
    pub fn failing<I, C>(controls: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ControlId>,
    {
        Self::Failing(controls.into_iter().map(Into::into).collect())
    }
}

/// Per-operation behaviour, indexed by call number
///
/// Call `n` uses entry `n`; once a list runs out its last entry repeats. An
/// empty list always succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub controls: Vec<ControlEntry>,
    pub acquire: Vec<Step>,
    pub find: Vec<Step>,
    pub generate: Vec<Step>,
    pub implement: Vec<Step>,
    pub remediate: Vec<Step>,
    pub provision: Vec<Step>,
    pub release: Vec<Step>,
    pub validation: Vec<ValidationStep>,
    pub commit: Vec<Step>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            controls: default_controls(),
            acquire: Vec::new(),
            find: Vec::new(),
            generate: Vec::new(),
            implement: Vec::new(),
            remediate: Vec::new(),
            provision: Vec::new(),
            release: Vec::new(),
            validation: Vec::new(),
            commit: Vec::new(),
        }
    }
}

impl Script {
    /// A published baseline exists and passes first time
    #[must_use]
    pub fn discovered() -> Self {
        Self::default()
    }

    /// No published baseline; the generated one passes first time
    #[must_use]
    pub fn generated() -> Self {
        Self::default().with_find(vec![Step::not_found()])
    }

    #[inline]
    #[must_use]
    pub fn with_controls(mut self, controls: Vec<ControlEntry>) -> Self {
        self.controls = controls;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_acquire(mut self, steps: Vec<Step>) -> Self {
        self.acquire = steps;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_find(mut self, steps: Vec<Step>) -> Self {
        self.find = steps;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_generate(mut self, steps: Vec<Step>) -> Self {
        self.generate = steps;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_implement(mut self, steps: Vec<Step>) -> Self {
        self.implement = steps;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_remediate(mut self, steps: Vec<Step>) -> Self {
        self.remediate = steps;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_provision(mut self, steps: Vec<Step>) -> Self {
        self.provision = steps;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_release(mut self, steps: Vec<Step>) -> Self {
        self.release = steps;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_validation(mut self, steps: Vec<ValidationStep>) -> Self {
        self.validation = steps;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_commit(mut self, steps: Vec<Step>) -> Self {
        self.commit = steps;
        self
    }
}

fn pick<T: Clone>(steps: &[T], call: usize) -> Option<T> {
    steps.get(call).or_else(|| steps.last()).cloned()
}

fn default_controls() -> Vec<ControlEntry> {
    vec![
        ControlEntry::stub("V-230221", "The operating system must be a vendor-supported release."),
        ControlEntry::stub("V-230222", "Vendor packaged system security patches and updates must be installed and up to date."),
        ControlEntry::stub("V-230223", "The operating system must implement NIST FIPS-validated cryptography."),
    ]
}

/// Check code the simulator writes for a control
fn inspec_block(control: &ControlEntry, note: &str) -> String {
    format!(
        "control '{id}' do\n  title '{title}'\n  impact 0.5\n  # {note}\n  describe command('true') do\n    its('exit_status') {{ should eq 0 }}\n  end\nend\n",
        id = control.id,
        title = control.description.replace('\'', ""),
    )
}

/// Preset runs, one per supported outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Published baseline found, passes unmodified
    Discovered,
    /// Stub generated and implemented, passes first time
    Generated,
    /// Generated, one control fails once, repaired by remediation
    Repaired,
    /// Generated, a control keeps failing until remediation is spent
    Exhausted,
    /// No STIG published for the product
    NoStig,
    /// Passes, but the knowledge commit keeps failing
    CommitFailure,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Discovered,
        Scenario::Generated,
        Scenario::Repaired,
        Scenario::Exhausted,
        Scenario::NoStig,
        Scenario::CommitFailure,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::Discovered => "discovered",
            Scenario::Generated => "generated",
            Scenario::Repaired => "repaired",
            Scenario::Exhausted => "exhausted",
            Scenario::NoStig => "no-stig",
            Scenario::CommitFailure => "commit-failure",
        }
    }

    #[must_use]
    pub fn script(self) -> Script {
        let failing = ValidationStep::failing(["V-230222"]);
        match self {
            Scenario::Discovered => Script::discovered(),
            Scenario::Generated => Script::generated(),
            Scenario::Repaired => {
                Script::generated().with_validation(vec![failing, ValidationStep::PassAll])
            }
            Scenario::Exhausted => Script::generated().with_validation(vec![failing]),
            Scenario::NoStig => Script::default().with_acquire(vec![Step::not_found()]),
            Scenario::CommitFailure => Script::discovered().with_commit(vec![Step::transport()]),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == s)
            .ok_or_else(|| format!("unknown scenario '{s}'"))
    }
}

/// Scripted implementation of every tool service
#[derive(Debug)]
pub struct ScriptedTools {
    script: Script,
    calls: [AtomicUsize; 10],
    downloads: DashMap<(String, String), StigHandle>,
    live_containers: Mutex<BTreeSet<String>>,
    next_container: AtomicUsize,
    store: Arc<InMemoryKnowledgeStore>,
}

impl ScriptedTools {
    #[must_use]
    pub fn new(script: Script) -> Arc<Self> {
        Self::with_store(script, Arc::new(InMemoryKnowledgeStore::default()))
    }

    /// Share `store` with other simulators (concurrent runs)
    #[must_use]
    pub fn with_store(script: Script, store: Arc<InMemoryKnowledgeStore>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: Default::default(),
            downloads: DashMap::new(),
            live_containers: Mutex::new(BTreeSet::new()),
            next_container: AtomicUsize::new(0),
            store,
        })
    }

    /// Every adapter slot backed by this simulator
    #[must_use]
    pub fn suite(self: &Arc<Self>) -> ToolSuite {
        ToolSuite {
            stig: self.clone(),
            catalog: self.clone(),
            generator: self.clone(),
            implementer: self.clone(),
            provisioner: self.clone(),
            runner: self.clone(),
            memory: self.clone(),
        }
    }

    #[must_use]
    pub fn calls(&self, operation: Operation) -> usize {
        self.calls[operation as usize].load(Ordering::SeqCst)
    }

    /// Calls of every operation that runs after STIG acquisition
    #[must_use]
    pub fn downstream_calls(&self) -> usize {
        Operation::ALL
            .into_iter()
            .filter(|op| *op != Operation::AcquireStig)
            .map(|op| self.calls(op))
            .sum()
    }

    /// Distinct STIG packages actually "downloaded"
    #[must_use]
    pub fn downloads(&self) -> usize {
        self.downloads.len()
    }

    /// Provisioned containers not yet released
    #[must_use]
    pub fn live_containers(&self) -> usize {
        self.live_containers.lock().len()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<InMemoryKnowledgeStore> {
        &self.store
    }

    fn next_call(&self, operation: Operation) -> usize {
        self.calls[operation as usize].fetch_add(1, Ordering::SeqCst)
    }

    async fn play(&self, operation: Operation, steps: &[Step]) -> Result<(), ToolError> {
        let call = self.next_call(operation);
        match pick(steps, call).unwrap_or(Step::Succeed) {
            Step::Succeed => Ok(()),
            Step::Fail(err) => Err(err),
            Step::Hang => futures::future::pending().await,
        }
    }

    fn slug(product: &str, version: &str) -> String {
        TaskRequest::new(product, version).product_slug()
    }
}

#[async_trait]
impl StigSource for ScriptedTools {
    async fn acquire_stig(&self, product: &str, version: &str) -> Result<StigHandle, ToolError> {
        self.play(Operation::AcquireStig, &self.script.acquire).await?;
        let key = (product.to_string(), version.to_string());
        let stig = self
            .downloads
            .entry(key)
            .or_insert_with(|| {
                let slug = Self::slug(product, version);
                StigHandle::new(
                    product,
                    version,
                    format!("downloads/{slug}/{version}"),
                    self.script.controls.clone(),
                )
            })
            .value()
            .clone();
        Ok(stig)
    }
}

#[async_trait]
impl BaselineCatalog for ScriptedTools {
    async fn find_baseline(&self, product: &str, version: &str) -> Result<BaselineHandle, ToolError> {
        self.play(Operation::FindBaseline, &self.script.find).await?;
        let slug = Self::slug(product, version);
        let controls = self
            .script
            .controls
            .iter()
            .map(|c| c.clone().with_implementation(inspec_block(c, "published")))
            .collect();
        Ok(BaselineHandle::new(
            format!("{slug}-stig-baseline"),
            format!("baselines/mitre/{slug}"),
            BaselineKind::Discovered,
            controls,
        ))
    }
}

#[async_trait]
impl StubGenerator for ScriptedTools {
    async fn generate_stub(&self, stig: &StigHandle) -> Result<BaselineHandle, ToolError> {
        self.play(Operation::GenerateStub, &self.script.generate).await?;
        let slug = Self::slug(&stig.product, &stig.version);
        let controls = stig
            .controls
            .iter()
            .map(|c| ControlEntry::stub(c.id.clone(), c.description.clone()))
            .collect();
        Ok(BaselineHandle::new(
            format!("{slug}-baseline"),
            format!("artifacts/generated/{slug}"),
            BaselineKind::Stub,
            controls,
        ))
    }
}

#[async_trait]
impl ControlImplementer for ScriptedTools {
    async fn implement_controls(
        &self,
        baseline: &BaselineHandle,
        _stig: &StigHandle,
        memory: &dyn MemoryQuery,
    ) -> Result<BaselineHandle, ToolError> {
        self.play(Operation::ImplementControls, &self.script.implement).await?;
        let mut updated = Vec::with_capacity(baseline.controls.len());
        for control in &baseline.controls {
            let examples = memory.query_memory(&control.description).await?;
            let code = match examples.iter().find(|r| r.control_id == control.id) {
                Some(known) => known.implementation.clone(),
                None => inspec_block(control, "generated"),
            };
            updated.push(control.clone().with_implementation(code));
        }
        Ok(baseline.revise(BaselineKind::Implemented, updated))
    }

    async fn remediate(
        &self,
        baseline: &BaselineHandle,
        _stig: &StigHandle,
        scope: RemediationScope<'_>,
        _memory: &dyn MemoryQuery,
    ) -> Result<BaselineHandle, ToolError> {
        self.play(Operation::Remediate, &self.script.remediate).await?;
        let note = format!("remediation attempt {}", scope.attempt);
        let updated = baseline
            .controls
            .iter()
            .filter(|c| scope.failing.is_empty() || scope.failing.contains(&c.id))
            .map(|c| c.clone().with_implementation(inspec_block(c, &note)))
            .collect();
        Ok(baseline.revise(BaselineKind::Remediated { attempt: scope.attempt }, updated))
    }
}

#[async_trait]
impl TargetProvisioner for ScriptedTools {
    async fn provision_target(&self, product: &str, version: &str) -> Result<ContainerHandle, ToolError> {
        self.play(Operation::ProvisionTarget, &self.script.provision).await?;
        let n = self.next_container.fetch_add(1, Ordering::SeqCst);
        let slug = Self::slug(product, version);
        let container = ContainerHandle::new(format!("sim-{n}"), format!("{slug}:{version}"));
        self.live_containers.lock().insert(container.id.clone());
        Ok(container)
    }

    async fn release_target(&self, container: &ContainerHandle) -> Result<(), ToolError> {
        self.play(Operation::ReleaseTarget, &self.script.release).await?;
        self.live_containers.lock().remove(&container.id);
        Ok(())
    }
}

#[async_trait]
impl ValidationRunner for ScriptedTools {
    async fn run_validation(
        &self,
        baseline: &BaselineHandle,
        _container: &ContainerHandle,
    ) -> Result<ValidationResult, ToolError> {
        let call = self.next_call(Operation::RunValidation);
        match pick(&self.script.validation, call).unwrap_or(ValidationStep::PassAll) {
            ValidationStep::PassAll => Ok(ValidationResult::all_pass(baseline.control_ids().cloned())),
            ValidationStep::Failing(failing) => {
                let mut result = ValidationResult::all_pass(baseline.control_ids().cloned());
                for id in failing {
                    result = result.with_verdict(id, ControlVerdict::fail("expected 0, got 1"));
                }
                Ok(result)
            }
            ValidationStep::Empty => Ok(ValidationResult::new()),
            ValidationStep::AllSkipped => Ok(baseline.control_ids().fold(
                ValidationResult::new(),
                |result, id| {
                    let reason = "target not applicable".to_string();
                    result.with_verdict(id.clone(), ControlVerdict::Skipped { reason })
                },
            )),
            ValidationStep::Fail(err) => Err(err),
            ValidationStep::Hang => futures::future::pending().await,
        }
    }
}

#[async_trait]
impl MemoryQuery for ScriptedTools {
    async fn query_memory(&self, control_description: &str) -> Result<Vec<ControlRecord>, ToolError> {
        self.next_call(Operation::QueryMemory);
        self.store.query_memory(control_description).await
    }
}

#[async_trait]
impl MemoryStore for ScriptedTools {
    async fn commit_memory(&self, commit: &BaselineCommit) -> Result<Ack, ToolError> {
        self.play(Operation::CommitMemory, &self.script.commit).await?;
        self.store.commit_memory(commit).await
    }
}

/// Run one request through a fresh engine backed by `scenario`'s script
pub async fn run_scenario(
    scenario: Scenario,
    request: TaskRequest,
    config: OrchestratorConfig,
) -> (RunReport, Arc<ScriptedTools>) {
    let tools = ScriptedTools::new(scenario.script());
    let engine = WorkflowEngine::new(config, tools.suite());
    let report = engine.submit(request).await;
    (report, tools)
}
