//! Cached optical data lookup.
//!
//! [`OpticalDataStore`] is the single entry point the rest of the toolkit uses
//! to obtain optical constants. It owns a record backend, validates what the
//! backend returns, and keeps loaded tables in a [`SampleCache`].

use std::sync::Arc;

use num_complex::Complex64;

use crate::cache::{CacheConfig, SampleCache};
use crate::interpolation;
use crate::provider::{MaterialError, OpticalRecords};
use crate::sample::{validate_samples, EntityKind, OpticalSample};

pub struct OpticalDataStore {
    records: Arc<dyn OpticalRecords>,
    cache: SampleCache,
}

impl OpticalDataStore {
    /// Store with an unbounded cache.
    pub fn new(records: Arc<dyn OpticalRecords>) -> Self {
        Self::with_cache_config(records, CacheConfig::default())
    }

    pub fn with_cache_config(records: Arc<dyn OpticalRecords>, config: CacheConfig) -> Self {
        Self {
            records,
            cache: SampleCache::new(config),
        }
    }

    pub fn records(&self) -> &Arc<dyn OpticalRecords> {
        &self.records
    }

    pub fn cache(&self) -> &SampleCache {
        &self.cache
    }

    /// Read a sample table straight from the backend, bypassing the cache.
    ///
    /// # Errors
    /// [`MaterialError::NotFound`] if no rows match, [`MaterialError::Storage`]
    /// on backend failure or a malformed table.
    pub fn samples(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<Vec<OpticalSample>, MaterialError> {
        let samples = self.records.optical_samples(kind, name)?;
        validate_samples(kind, name, &samples)?;
        Ok(samples)
    }

    /// Cached sample table, loaded from the backend on first request.
    ///
    /// Concurrent first requests for the same key share one backend read.
    pub fn cached_samples(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<Arc<[OpticalSample]>, MaterialError> {
        self.cache
            .get_or_load(kind, name, || self.samples(kind, name))
    }

    /// Clamped linear interpolation of a sample table; see
    /// [`interpolation::interpolate`].
    pub fn interpolate(
        samples: &[OpticalSample],
        wavelength_nm: f64,
    ) -> Result<Complex64, MaterialError> {
        interpolation::interpolate(samples, wavelength_nm)
    }

    /// $\tilde{n} = n + ik$ of a named entity at `wavelength_nm`.
    pub fn refractive_index(
        &self,
        kind: EntityKind,
        name: &str,
        wavelength_nm: f64,
    ) -> Result<Complex64, MaterialError> {
        let samples = self.cached_samples(kind, name)?;
        Self::interpolate(&samples, wavelength_nm)
    }

    pub fn invalidate(&self, kind: EntityKind, name: &str) -> bool {
        self.cache.invalidate(kind, name)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Number of cached sample tables.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecords;
    use crate::provider::StructureRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts backend reads.
    struct CountingRecords {
        inner: MemoryRecords,
        reads: AtomicUsize,
    }

    impl OpticalRecords for CountingRecords {
        fn optical_samples(
            &self,
            kind: EntityKind,
            name: &str,
        ) -> Result<Vec<OpticalSample>, MaterialError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.optical_samples(kind, name)
        }

        fn structure(&self, name: &str) -> Result<StructureRecord, MaterialError> {
            self.inner.structure(name)
        }

        fn structure_names(&self) -> Result<Vec<String>, MaterialError> {
            self.inner.structure_names()
        }

        fn entity_names(&self, kind: EntityKind) -> Result<Vec<String>, MaterialError> {
            self.inner.entity_names(kind)
        }
    }

    fn counting_store() -> (Arc<CountingRecords>, OpticalDataStore) {
        let records = Arc::new(CountingRecords {
            inner: MemoryRecords::new().with_material(
                "TiO2",
                vec![
                    OpticalSample::new(400.0, 2.62, 0.003),
                    OpticalSample::new(600.0, 2.547, 0.0),
                ],
            ),
            reads: AtomicUsize::new(0),
        });
        let store = OpticalDataStore::new(records.clone());
        (records, store)
    }

    #[test]
    fn test_cached_lookup_reads_backend_once() {
        let (records, store) = counting_store();
        let a = store.cached_samples(EntityKind::Material, "TiO2").unwrap();
        let b = store.cached_samples(EntityKind::Material, "TiO2").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(records.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_raw_lookup_bypasses_cache() {
        let (records, store) = counting_store();
        store.samples(EntityKind::Material, "TiO2").unwrap();
        store.samples(EntityKind::Material, "TiO2").unwrap();
        assert_eq!(records.reads.load(Ordering::SeqCst), 2);
        assert!(store.cache().is_empty());
    }

    #[test]
    fn test_unknown_material_is_not_found() {
        let (_, store) = counting_store();
        let err = store.cached_samples(EntityKind::Material, "Unobtainium").unwrap_err();
        assert!(matches!(err, MaterialError::NotFound { .. }));
        // Same name in the substrate table is a different key.
        let err = store.samples(EntityKind::Substrate, "TiO2").unwrap_err();
        assert!(matches!(err, MaterialError::NotFound { kind: "Substrate", .. }));
    }

    #[test]
    fn test_refractive_index_interpolates() {
        let (_, store) = counting_store();
        let idx = store.refractive_index(EntityKind::Material, "TiO2", 500.0).unwrap();
        assert!((idx.re - 2.5835).abs() < 1e-12);
        assert!((idx.im - 0.0015).abs() < 1e-12);
    }
}
