//! In-memory record backend.
//!
//! Holds material, substrate and structure tables in plain maps. Used by the
//! built-in catalogue, as the import source when bootstrapping a database,
//! and as a test double for the storage layer.

use std::collections::{BTreeMap, HashMap};

use crate::provider::{LayerRecord, MaterialError, OpticalRecords, StructureRecord};
use crate::sample::{EntityKind, OpticalSample};

#[derive(Debug, Clone, Default)]
pub struct MemoryRecords {
    /// Indexed by [`EntityKind::slot`].
    tables: [HashMap<String, Vec<OpticalSample>>; 2],
    structures: BTreeMap<String, StructureRecord>,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a sample table, sorted by wavelength.
    pub fn insert_samples(
        &mut self,
        kind: EntityKind,
        name: impl Into<String>,
        mut samples: Vec<OpticalSample>,
    ) {
        samples.sort_by(|a, b| a.wavelength_nm.total_cmp(&b.wavelength_nm));
        self.tables[kind.slot()].insert(name.into(), samples);
    }

    pub fn with_material(mut self, name: impl Into<String>, samples: Vec<OpticalSample>) -> Self {
        self.insert_samples(EntityKind::Material, name, samples);
        self
    }

    pub fn with_substrate(mut self, name: impl Into<String>, samples: Vec<OpticalSample>) -> Self {
        self.insert_samples(EntityKind::Substrate, name, samples);
        self
    }

    pub fn insert_structure(&mut self, record: StructureRecord) {
        self.structures.insert(record.name.clone(), record);
    }

    /// Store a structure whose layers are numbered in the given order.
    pub fn with_structure(
        mut self,
        name: impl Into<String>,
        substrate: impl Into<String>,
        layers: &[(&str, f64)],
    ) -> Self {
        let layers = layers
            .iter()
            .enumerate()
            .map(|(i, &(material, thickness_nm))| LayerRecord {
                layer_number: i as i64 + 1,
                material: material.to_string(),
                thickness_nm,
            })
            .collect();
        self.insert_structure(StructureRecord {
            name: name.into(),
            substrate: substrate.into(),
            layers,
        });
        self
    }

    /// All sample tables of one kind, in name order.
    pub fn tables(&self, kind: EntityKind) -> Vec<(&str, &[OpticalSample])> {
        let mut tables: Vec<_> = self.tables[kind.slot()]
            .iter()
            .map(|(name, samples)| (name.as_str(), samples.as_slice()))
            .collect();
        tables.sort_by(|a, b| a.0.cmp(b.0));
        tables
    }

    pub fn structures(&self) -> impl Iterator<Item = &StructureRecord> {
        self.structures.values()
    }
}

impl OpticalRecords for MemoryRecords {
    fn optical_samples(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<Vec<OpticalSample>, MaterialError> {
        self.tables[kind.slot()]
            .get(name)
            .cloned()
            .ok_or_else(|| MaterialError::entity_not_found(kind, name))
    }

    fn structure(&self, name: &str) -> Result<StructureRecord, MaterialError> {
        self.structures
            .get(name)
            .cloned()
            .ok_or_else(|| MaterialError::structure_not_found(name))
    }

    fn structure_names(&self) -> Result<Vec<String>, MaterialError> {
        Ok(self.structures.keys().cloned().collect())
    }

    fn entity_names(&self, kind: EntityKind) -> Result<Vec<String>, MaterialError> {
        let mut names: Vec<String> = self.tables[kind.slot()].keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_are_sorted_on_insert() {
        let records = MemoryRecords::new().with_material(
            "SiO2",
            vec![
                OpticalSample::new(600.0, 1.458, 0.0),
                OpticalSample::new(400.0, 1.470, 0.0),
            ],
        );
        let samples = records.optical_samples(EntityKind::Material, "SiO2").unwrap();
        assert_eq!(samples[0].wavelength_nm, 400.0);
        assert_eq!(samples[1].wavelength_nm, 600.0);
    }

    #[test]
    fn test_unknown_names_are_not_found() {
        let records = MemoryRecords::new();
        assert!(matches!(
            records.optical_samples(EntityKind::Substrate, "BK7"),
            Err(MaterialError::NotFound { kind: "Substrate", .. })
        ));
        assert!(matches!(
            records.structure("AR"),
            Err(MaterialError::NotFound { kind: "Structure", .. })
        ));
    }

    #[test]
    fn test_structure_names_sorted() {
        let records = MemoryRecords::new()
            .with_structure("b", "BK7", &[])
            .with_structure("a", "BK7", &[("SiO2", 90.0)]);
        assert_eq!(records.structure_names().unwrap(), vec!["a", "b"]);
        assert_eq!(records.structure("a").unwrap().layers[0].layer_number, 1);
    }
}
