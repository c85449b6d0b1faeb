//! Caller-facing entry point.
//!
//! [`CoatingAnalyzer`] wires a record backend to the structure repository,
//! the cached optical data store, the spectrum engine and the optimizer, so
//! that callers deal in structure names and wavelength lists only.

use std::collections::BTreeSet;
use std::sync::Arc;

use filmstack_materials::{CacheConfig, EntityKind, OpticalDataStore, OpticalRecords};
use serde::Deserialize;

use crate::error::CoatingError;
use crate::optimizer::{OptimizationReport, OptimizerConfig, ThicknessOptimizer};
use crate::oracle::tmm::TransferMatrixOracle;
use crate::oracle::ResponseOracle;
use crate::spectrum::{EngineConfig, SpectrumEngine, SpectrumTask};
use crate::structure::StructureRepository;
use crate::types::{SpectrumPoint, StructureDescription};

/// Everything needed to assemble an analyzer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    /// Refractive index of the incidence medium.
    #[serde(default = "default_ambient_index")]
    pub ambient_index: f64,
}

fn default_ambient_index() -> f64 {
    1.0
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            engine: EngineConfig::default(),
            optimizer: OptimizerConfig::default(),
            ambient_index: default_ambient_index(),
        }
    }
}

pub struct CoatingAnalyzer {
    store: Arc<OpticalDataStore>,
    structures: StructureRepository,
    engine: SpectrumEngine,
    optimizer_config: OptimizerConfig,
    /// Resolve every table a stack references before evaluating it, so a
    /// missing material is reported as `NotFound` rather than as a failed
    /// wavelength.
    resolve_tables: bool,
}

impl CoatingAnalyzer {
    /// Analyzer with the transfer-matrix oracle and default settings.
    pub fn new(records: Arc<dyn OpticalRecords>) -> Result<Self, CoatingError> {
        Self::from_config(records, &AnalyzerConfig::default())
    }

    pub fn from_config(
        records: Arc<dyn OpticalRecords>,
        config: &AnalyzerConfig,
    ) -> Result<Self, CoatingError> {
        if !(config.ambient_index.is_finite() && config.ambient_index > 0.0) {
            return Err(CoatingError::InvalidArgument(format!(
                "ambient index must be positive, got {}",
                config.ambient_index
            )));
        }
        config.optimizer.validate()?;

        let store = Arc::new(OpticalDataStore::with_cache_config(
            Arc::clone(&records),
            config.cache.clone(),
        ));
        let oracle =
            TransferMatrixOracle::new(Arc::clone(&store)).with_ambient_index(config.ambient_index);
        let engine = SpectrumEngine::with_config(Arc::new(oracle), &config.engine)?;

        Ok(Self {
            store,
            structures: StructureRepository::new(records),
            engine,
            optimizer_config: config.optimizer.clone(),
            resolve_tables: true,
        })
    }

    /// Analyzer driven by a caller-supplied oracle.
    ///
    /// Structures are still loaded through `store`'s records; optical tables
    /// are left for the oracle to resolve (or not).
    pub fn with_oracle(
        store: Arc<OpticalDataStore>,
        oracle: Arc<dyn ResponseOracle>,
        config: &AnalyzerConfig,
    ) -> Result<Self, CoatingError> {
        config.optimizer.validate()?;
        let engine = SpectrumEngine::with_config(oracle, &config.engine)?;
        Ok(Self {
            structures: StructureRepository::new(Arc::clone(store.records())),
            store,
            engine,
            optimizer_config: config.optimizer.clone(),
            resolve_tables: false,
        })
    }

    /// Analyzer reading an SQLite database at `path`.
    #[cfg(feature = "sqlite")]
    pub fn open_sqlite(
        path: impl AsRef<std::path::Path>,
        config: &AnalyzerConfig,
    ) -> Result<Self, CoatingError> {
        let records = filmstack_materials::SqliteRecords::open(path)?;
        Self::from_config(Arc::new(records), config)
    }

    pub fn store(&self) -> &Arc<OpticalDataStore> {
        &self.store
    }

    pub fn engine(&self) -> &SpectrumEngine {
        &self.engine
    }

    pub fn optimizer_config(&self) -> &OptimizerConfig {
        &self.optimizer_config
    }

    pub fn optimizer(&self) -> ThicknessOptimizer {
        ThicknessOptimizer::new(self.engine.clone(), self.optimizer_config.clone())
    }

    /// Stored structure names, sorted.
    pub fn list_structures(&self) -> Result<Vec<String>, CoatingError> {
        self.structures.list()
    }

    /// Stored material or substrate names, sorted.
    pub fn list_entities(&self, kind: EntityKind) -> Result<Vec<String>, CoatingError> {
        Ok(self.store.records().entity_names(kind)?)
    }

    pub fn load_structure(&self, name: &str) -> Result<StructureDescription, CoatingError> {
        self.structures.load(name)
    }

    /// Spectrum of the stored structure `name`, one point per wavelength in
    /// input order.
    pub fn calculate_spectrum(
        &self,
        name: &str,
        wavelengths: &[f64],
    ) -> Result<Vec<SpectrumPoint>, CoatingError> {
        let stack = self.load_structure(name)?;
        self.evaluate_structure(&stack, wavelengths)
    }

    /// Spectrum of an in-memory stack.
    pub fn evaluate_structure(
        &self,
        stack: &StructureDescription,
        wavelengths: &[f64],
    ) -> Result<Vec<SpectrumPoint>, CoatingError> {
        self.prepare(stack)?;
        self.engine.evaluate(stack, wavelengths)
    }

    /// Background spectrum of the stored structure `name`.
    ///
    /// Loading happens on the calling thread, so an unknown name fails here
    /// rather than through the task.
    pub fn calculate_spectrum_async(
        &self,
        name: &str,
        wavelengths: Vec<f64>,
    ) -> Result<SpectrumTask, CoatingError> {
        let stack = self.load_structure(name)?;
        self.prepare(&stack)?;
        Ok(self.engine.evaluate_async(stack, wavelengths))
    }

    /// Tune the layer thicknesses of the stored structure `name` towards
    /// `target_reflection` at `target_wavelengths`.
    pub fn optimize_structure(
        &self,
        name: &str,
        target_wavelengths: &[f64],
        target_reflection: &[f64],
        max_iterations: usize,
    ) -> Result<OptimizationReport, CoatingError> {
        let stack = self.load_structure(name)?;
        self.prepare(&stack)?;
        self.optimizer()
            .run(&stack, target_wavelengths, target_reflection, max_iterations)
    }

    fn prepare(&self, stack: &StructureDescription) -> Result<(), CoatingError> {
        stack.validate()?;
        if !self.resolve_tables {
            return Ok(());
        }
        self.store.cached_samples(EntityKind::Substrate, &stack.substrate)?;
        let materials: BTreeSet<&str> = stack.layers.iter().map(|l| l.material.as_str()).collect();
        for material in materials {
            self.store.cached_samples(EntityKind::Material, material)?;
        }
        Ok(())
    }
}
