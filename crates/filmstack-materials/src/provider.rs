//! Persistent record provider trait.
//!
//! All storage backends implement [`OpticalRecords`], which covers the three
//! read shapes the rest of the toolkit needs: optical samples for a named
//! material or substrate, a stored structure, and the list of structure
//! names.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sample::{EntityKind, OpticalSample};

/// Errors from record providers and the lookup layer.
#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl MaterialError {
    pub fn entity_not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.label(),
            name: name.into(),
        }
    }

    pub fn structure_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Structure",
            name: name.into(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for MaterialError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// One stored layer of a structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    /// Persisted stacking index, counted from the incidence side.
    pub layer_number: i64,
    pub material: String,
    /// Physical thickness (nm).
    pub thickness_nm: f64,
}

/// A stored coating structure as the backend holds it.
///
/// Layers are not guaranteed to be in stacking order; consumers sort by
/// [`LayerRecord::layer_number`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureRecord {
    pub name: String,
    pub substrate: String,
    pub layers: Vec<LayerRecord>,
}

/// Read access to a persistent store of optical data and structures.
///
/// Implementations must be safe to call from several worker threads at
/// once. Backends with a single connection serialize statement execution
/// internally.
pub trait OpticalRecords: Send + Sync {
    /// Wavelength-ordered samples for a named material or substrate.
    ///
    /// Returns [`MaterialError::NotFound`] when no rows match the name.
    fn optical_samples(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<Vec<OpticalSample>, MaterialError>;

    /// Substrate name and layers of a named structure.
    fn structure(&self, name: &str) -> Result<StructureRecord, MaterialError>;

    /// Names of all stored structures, sorted.
    fn structure_names(&self) -> Result<Vec<String>, MaterialError>;

    /// Names of all stored materials or substrates, sorted.
    fn entity_names(&self, kind: EntityKind) -> Result<Vec<String>, MaterialError>;
}
