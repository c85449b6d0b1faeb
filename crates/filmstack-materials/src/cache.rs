//! Process-wide cache of loaded sample tables.
//!
//! Lookups of populated keys take a shared read lock only. Populating a
//! missing key goes through a per-key gate so that concurrent callers asking
//! for the same uncached `(kind, name)` wait for a single load and all receive
//! the same [`Arc`]. Distinct keys load independently.
//!
//! The cache is unbounded by default. With [`CacheConfig::capacity`] set, the
//! least recently used table is evicted once the bound is exceeded; an evicted
//! key is simply loaded again on its next request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;

use crate::provider::MaterialError;
use crate::sample::{EntityKind, OpticalSample};

/// Cache sizing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of tables kept across both materials and substrates.
    /// `None` keeps every table for the lifetime of the cache.
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl CacheConfig {
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
        }
    }
}

struct Entry {
    samples: Arc<[OpticalSample]>,
    last_used: AtomicU64,
}

type Gate = Arc<Mutex<()>>;

/// Per-key single-flight cache of sample tables.
pub struct SampleCache {
    capacity: Option<usize>,
    /// Indexed by [`EntityKind::slot`].
    entries: RwLock<[HashMap<String, Entry>; 2]>,
    gates: Mutex<HashMap<(EntityKind, String), Gate>>,
    clock: AtomicU64,
    loads: AtomicU64,
}

impl SampleCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            capacity: config.capacity.map(|c| c.max(1)),
            entries: RwLock::new([HashMap::new(), HashMap::new()]),
            gates: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Return a cached table without loading.
    pub fn get(&self, kind: EntityKind, name: &str) -> Option<Arc<[OpticalSample]>> {
        let entries = self.entries.read();
        let entry = entries[kind.slot()].get(name)?;
        entry.last_used.store(self.tick(), Ordering::Relaxed);
        Some(Arc::clone(&entry.samples))
    }

    /// Return the cached table for `(kind, name)`, running `load` if it is
    /// missing.
    ///
    /// At most one `load` runs per key at any time. A failed load is not
    /// cached; the error goes to the caller that ran it, and waiting callers
    /// retry the load themselves.
    pub fn get_or_load<F>(
        &self,
        kind: EntityKind,
        name: &str,
        load: F,
    ) -> Result<Arc<[OpticalSample]>, MaterialError>
    where
        F: FnOnce() -> Result<Vec<OpticalSample>, MaterialError>,
    {
        if let Some(hit) = self.get(kind, name) {
            return Ok(hit);
        }

        let key = (kind, name.to_string());
        let gate = Arc::clone(self.gates.lock().entry(key.clone()).or_default());
        let flight = gate.lock();

        // Another caller may have finished the load while we waited.
        let outcome = match self.get(kind, name) {
            Some(hit) => Ok(hit),
            None => load().map(|samples| {
                self.loads.fetch_add(1, Ordering::Relaxed);
                let samples: Arc<[OpticalSample]> = samples.into();
                self.insert(kind, name, Arc::clone(&samples));
                log::debug!("cached {} '{}' ({} samples)", kind, name, samples.len());
                samples
            }),
        };

        drop(flight);
        self.release_gate(&key, gate);
        outcome
    }

    /// Drop our handle on a key's gate and forget the gate once nobody else
    /// holds it.
    fn release_gate(&self, key: &(EntityKind, String), gate: Gate) {
        let mut gates = self.gates.lock();
        drop(gate);
        if gates.get(key).is_some_and(|g| Arc::strong_count(g) == 1) {
            gates.remove(key);
        }
    }

    fn insert(&self, kind: EntityKind, name: &str, samples: Arc<[OpticalSample]>) {
        let mut entries = self.entries.write();
        entries[kind.slot()].insert(
            name.to_string(),
            Entry {
                samples,
                last_used: AtomicU64::new(self.tick()),
            },
        );

        let Some(capacity) = self.capacity else {
            return;
        };
        while entries.iter().map(HashMap::len).sum::<usize>() > capacity {
            let oldest = entries
                .iter()
                .enumerate()
                .flat_map(|(slot, map)| {
                    map.iter()
                        .map(move |(key, e)| (slot, key, e.last_used.load(Ordering::Relaxed)))
                })
                .min_by_key(|&(_, _, used)| used)
                .map(|(slot, key, _)| (slot, key.clone()));
            match oldest {
                Some((slot, key)) => {
                    log::warn!("evicting '{}' from sample cache (capacity {})", key, capacity);
                    entries[slot].remove(&key);
                }
                None => break,
            }
        }
    }

    /// Drop one table. Returns whether it was cached.
    pub fn invalidate(&self, kind: EntityKind, name: &str) -> bool {
        self.entries.write()[kind.slot()].remove(name).is_some()
    }

    pub fn clear(&self) {
        for map in self.entries.write().iter_mut() {
            map.clear();
        }
    }

    /// Number of cached tables.
    pub fn len(&self) -> usize {
        self.entries.read().iter().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful loads performed since construction.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }
}

impl Default for SampleCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{mpsc, Barrier};
    use std::thread;
    use std::time::Duration;

    fn table(n: f64) -> Vec<OpticalSample> {
        vec![
            OpticalSample::new(400.0, n, 0.0),
            OpticalSample::new(800.0, n, 0.0),
        ]
    }

    #[test]
    fn test_second_lookup_hits_cache() {
        let cache = SampleCache::default();
        let calls = AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(table(1.46))
        };
        let a = cache.get_or_load(EntityKind::Material, "SiO2", load).unwrap();
        let b = cache
            .get_or_load(EntityKind::Material, "SiO2", || panic!("should not reload"))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.loads(), 1);
    }

    #[test]
    fn test_kinds_are_separate_namespaces() {
        let cache = SampleCache::default();
        cache
            .get_or_load(EntityKind::Material, "SiO2", || Ok(table(1.46)))
            .unwrap();
        assert!(cache.get(EntityKind::Substrate, "SiO2").is_none());
        assert!(cache.get(EntityKind::Material, "SiO2").is_some());
    }

    #[test]
    fn test_concurrent_misses_load_once() {
        let cache = Arc::new(SampleCache::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_load(EntityKind::Material, "TiO2", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok(table(2.5))
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for r in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], r));
        }
    }

    #[test]
    fn test_distinct_keys_load_independently() {
        let cache = Arc::new(SampleCache::default());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let slow = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.get_or_load(EntityKind::Material, "Slow", || {
                    started_tx.send(()).unwrap();
                    release_rx
                        .recv_timeout(Duration::from_secs(10))
                        .map_err(|_| MaterialError::Storage("never released".into()))?;
                    Ok(table(2.0))
                })
            })
        };

        started_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        // "Slow" is mid-load and holds its gate; "Fast" must not wait for it.
        let fast = cache
            .get_or_load(EntityKind::Material, "Fast", || Ok(table(1.0)))
            .unwrap();
        assert_eq!(fast[0].n, 1.0);
        assert!(cache.get(EntityKind::Material, "Slow").is_none());
        assert!(!slow.is_finished());

        release_tx.send(()).unwrap();
        let slow = slow.join().unwrap().unwrap();
        assert_eq!(slow[0].n, 2.0);
        assert_eq!(cache.loads(), 2);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache = SampleCache::default();
        let err = cache
            .get_or_load(EntityKind::Material, "Nope", || {
                Err(MaterialError::Storage("disk on fire".into()))
            })
            .unwrap_err();
        assert!(matches!(err, MaterialError::Storage(_)));
        assert!(cache.is_empty());
        let ok = cache
            .get_or_load(EntityKind::Material, "Nope", || Ok(table(1.0)))
            .unwrap();
        assert_eq!(ok.len(), 2);
    }

    #[test]
    fn test_bounded_cache_evicts_least_recently_used() {
        let cache = SampleCache::new(CacheConfig::bounded(2));
        cache.get_or_load(EntityKind::Material, "A", || Ok(table(1.0))).unwrap();
        cache.get_or_load(EntityKind::Material, "B", || Ok(table(2.0))).unwrap();
        // Touch A so B becomes the oldest.
        assert!(cache.get(EntityKind::Material, "A").is_some());
        cache.get_or_load(EntityKind::Substrate, "C", || Ok(table(3.0))).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get(EntityKind::Material, "A").is_some());
        assert!(cache.get(EntityKind::Material, "B").is_none());
        assert!(cache.get(EntityKind::Substrate, "C").is_some());

        cache.get_or_load(EntityKind::Material, "B", || Ok(table(2.0))).unwrap();
        assert_eq!(cache.loads(), 4);
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let cache = SampleCache::default();
        cache.get_or_load(EntityKind::Substrate, "BK7", || Ok(table(1.52))).unwrap();
        assert!(cache.invalidate(EntityKind::Substrate, "BK7"));
        assert!(!cache.invalidate(EntityKind::Substrate, "BK7"));
        let reloaded = cache
            .get_or_load(EntityKind::Substrate, "BK7", || Ok(table(1.51)))
            .unwrap();
        assert_eq!(reloaded[0].n, 1.51);
        cache.clear();
        assert!(cache.is_empty());
    }
}
