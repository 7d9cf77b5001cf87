//! Artifact handles exchanged with tool services
//!
//! Handles are references, not payloads: they name where an artifact lives
//! and carry the manifest the orchestrator needs to branch (control list)
//! plus a digest over that manifest.

use crate::control::{ControlEntry, ControlId};
use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};

fn manifest_digest<'a>(
    header: impl IntoIterator<Item = &'a str>,
    controls: &[ControlEntry],
) -> ContentHash {
    let mut hasher = blake3::Hasher::new();
    for part in header {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    for control in controls {
        hasher.update(control.id.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(control.description.as_bytes());
        hasher.update(&[0]);
        if let Some(code) = &control.implementation {
            hasher.update(code.as_bytes());
        }
        hasher.update(&[1]);
    }
    ContentHash::new(*hasher.finalize().as_bytes())
}

/// Downloaded and extracted STIG package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StigHandle {
    pub product: String,
    pub version: String,
    /// Where the extracted package lives (manual + XCCDF)
    pub location: String,
    /// Machine-readable control list
    pub controls: Vec<ControlEntry>,
    pub digest: ContentHash,
}

impl StigHandle {
    #[must_use]
    pub fn new(
        product: impl Into<String>,
        version: impl Into<String>,
        location: impl Into<String>,
        controls: Vec<ControlEntry>,
    ) -> Self {
        let product = product.into();
        let version = version.into();
        let location = location.into();
        let digest = manifest_digest(
            [product.as_str(), version.as_str(), location.as_str()],
            &controls,
        );
        Self {
            product,
            version,
            location,
            controls,
            digest,
        }
    }

    #[inline]
    #[must_use]
    pub fn control(&self, id: &ControlId) -> Option<&ControlEntry> {
        self.controls.iter().find(|c| &c.id == id)
    }
}

/// How a baseline handle came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaselineKind {
    /// Found by baseline search
    Discovered,
    /// Skeleton produced from the STIG
    Stub,
    /// Output of the code-implementation pass
    Implemented,
    /// Output of remediation attempt `attempt`
    Remediated { attempt: u32 },
}

impl BaselineKind {
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Discovered => "discovered".to_string(),
            Self::Stub => "stub".to_string(),
            Self::Implemented => "implemented".to_string(),
            Self::Remediated { attempt } => format!("remediated-{attempt}"),
        }
    }
}

/// Reference to an InSpec baseline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineHandle {
    pub id: String,
    pub location: String,
    pub kind: BaselineKind,
    pub controls: Vec<ControlEntry>,
    pub digest: ContentHash,
}

impl BaselineHandle {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        location: impl Into<String>,
        kind: BaselineKind,
        controls: Vec<ControlEntry>,
    ) -> Self {
        let id = id.into();
        let location = location.into();
        let label = kind.label();
        let digest = manifest_digest([id.as_str(), location.as_str(), label.as_str()], &controls);
        Self {
            id,
            location,
            kind,
            controls,
            digest,
        }
    }

    /// New handle sharing this one's identity but with replaced controls
    ///
    /// `self` is left untouched so earlier phases keep their provenance.
    #[must_use]
    pub fn revise(&self, kind: BaselineKind, updated: Vec<ControlEntry>) -> Self {
        let mut controls = self.controls.clone();
        for entry in updated {
            match controls.iter_mut().find(|c| c.id == entry.id) {
                Some(slot) => *slot = entry,
                None => controls.push(entry),
            }
        }
        Self::new(self.id.clone(), self.location.clone(), kind, controls)
    }

    #[inline]
    #[must_use]
    pub fn control(&self, id: &ControlId) -> Option<&ControlEntry> {
        self.controls.iter().find(|c| &c.id == id)
    }

    pub fn control_ids(&self) -> impl Iterator<Item = &ControlId> {
        self.controls.iter().map(|c| &c.id)
    }

    #[inline]
    #[must_use]
    pub fn implemented_count(&self) -> usize {
        self.controls.iter().filter(|c| c.is_implemented()).count()
    }
}

/// Provisioned test target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
    pub image: String,
}

impl ContainerHandle {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
        }
    }
}
