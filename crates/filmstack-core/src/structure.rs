//! Loading stored structures.

use std::sync::Arc;

use filmstack_materials::{OpticalRecords, StructureRecord};

use crate::error::CoatingError;
use crate::types::{Layer, StructureDescription};

/// Resolves structure names into [`StructureDescription`]s.
///
/// Not cached: a description is cheap to load and is usually loaded once per
/// run, then cloned.
#[derive(Clone)]
pub struct StructureRepository {
    records: Arc<dyn OpticalRecords>,
}

impl StructureRepository {
    pub fn new(records: Arc<dyn OpticalRecords>) -> Self {
        Self { records }
    }

    /// Load a structure with its layers in stacking order (ascending persisted
    /// layer number), at normal incidence with the substrate backside
    /// included.
    ///
    /// # Errors
    /// [`CoatingError::NotFound`] for an unknown name,
    /// [`CoatingError::InvalidArgument`] if a stored thickness is not positive.
    pub fn load(&self, name: &str) -> Result<StructureDescription, CoatingError> {
        let record = self.records.structure(name)?;
        let description = into_description(record);
        description.validate()?;
        log::debug!(
            "loaded structure '{}': {} layers on {}",
            description.name,
            description.layers.len(),
            description.substrate
        );
        Ok(description)
    }

    /// All stored structure names, sorted.
    pub fn list(&self) -> Result<Vec<String>, CoatingError> {
        Ok(self.records.structure_names()?)
    }
}

fn into_description(mut record: StructureRecord) -> StructureDescription {
    record.layers.sort_by_key(|l| l.layer_number);
    let mut description = StructureDescription::new(record.name, record.substrate);
    description.layers = record
        .layers
        .into_iter()
        .map(|l| Layer {
            material: l.material,
            thickness_nm: l.thickness_nm,
        })
        .collect();
    description
}
