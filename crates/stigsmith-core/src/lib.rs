//! Stigsmith Core - STIG baseline workflow orchestrator
//!
//! The stateful control loop behind baseline generation:
//! - Acquires the STIG for a product/version
//! - Reuses a published baseline or generates and implements a new one
//! - Validates against a provisioned target and repairs failing controls
//! - Commits validated controls to the knowledge store for future runs
//!
//! Every external service sits behind a trait in [`tools`]; the engine only
//! sees typed results and typed errors, and the caller only ever sees a
//! [`RunReport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use stigsmith_core::simulator::{ScriptedTools, Scenario};
//! use stigsmith_core::{OrchestratorConfig, TaskRequest, WorkflowEngine};
//!
//! # async fn example() {
//! let tools = ScriptedTools::new(Scenario::Repaired.script());
//! let engine = WorkflowEngine::new(OrchestratorConfig::new(), tools.suite());
//!
//! let report = engine.submit(TaskRequest::new("Ubuntu 22", "V1R1")).await;
//! println!("{}", report.generate_text());
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod container;
pub mod error;
pub mod knowledge;
pub mod reporter;
pub mod retry;
pub mod run_state;
pub mod simulator;
pub mod state_machine;
pub mod tools;
pub mod types;
pub mod workflow;

pub use config::{MemoryConfig, OrchestratorConfig, RemediationConfig, RetryConfig, TimeoutConfig};
pub use container::ContainerLease;
pub use error::{
    ConfigError, ErrorClass, FailureReason, PhaseError, RunStateError, StateMachineError,
    ToolError,
};
pub use knowledge::{InMemoryKnowledgeStore, KnowledgeWriter};
pub use reporter::{ArtifactSummary, FailureSummary, RunReport, RunStatus};
pub use retry::{call_with_retry, RetryPolicy};
pub use run_state::{Outcome, PhaseTiming, RunState, WriteOnce};
pub use state_machine::{allowed_transitions, validate_transition, Phase};
pub use tools::{
    BaselineCatalog, BaselineCommit, ControlImplementer, MemoryQuery, MemoryStore,
    RemediationScope, StigSource, StoreReader, StubGenerator, TargetProvisioner, ToolSuite,
    ToolSuiteBuilder, ValidationRunner,
};
pub use types::{
    Ack, BaselineOrigin, ControlVerdict, RunId, TaskRequest, ValidationResult, ValidationSummary,
};
pub use workflow::WorkflowEngine;

pub use tokio_util::sync::CancellationToken;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the workflow engine
    pub use crate::{
        CancellationToken, FailureReason, OrchestratorConfig, RunReport, RunStatus, TaskRequest,
        ToolError, ToolSuite, WorkflowEngine,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
