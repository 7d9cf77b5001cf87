//! Stigsmith Artifacts
//!
//! Durable, content-addressed handles for everything the orchestrator passes
//! between tool services, plus the compliance control model.
//!
//! # Core Concepts
//!
//! - [`ContentHash`]: 32-byte Blake3 digest used to address artifacts
//! - [`StigHandle`]: downloaded STIG package (manual + XCCDF control list)
//! - [`BaselineHandle`]: an InSpec baseline, discovered, stubbed or implemented
//! - [`ContainerHandle`]: a provisioned test target
//! - [`ControlRecord`]: a validated control implementation kept for reuse
//!
//! # Example
//!
//! ```rust,ignore
//! use stigsmith_artifact::{BaselineHandle, BaselineKind, ControlEntry};
//!
//! let stub = BaselineHandle::new(
//!     "rhel-9-stub",
//!     "artifacts/generated/rhel-9",
//!     BaselineKind::Stub,
//!     vec![ControlEntry::stub("V-230222", "RHEL 9 must be a supported release")],
//! );
//! println!("digest: {}", stub.digest.short());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod control;
mod handle;
mod hash;
pub mod inspec;

pub use control::{ControlEntry, ControlId, ControlRecord};
pub use handle::{BaselineHandle, BaselineKind, ContainerHandle, StigHandle};
pub use hash::{ContentHash, HashError};
