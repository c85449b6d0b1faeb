//! # Filmstack Materials
//!
//! Optical constant records for the Filmstack thin-film toolkit. Every data
//! source implements the [`OpticalRecords`](provider::OpticalRecords) trait,
//! which hands out wavelength-ordered $(\lambda, n, k)$ samples for named
//! materials and substrates, plus the stored coating structures.
//!
//! ## Record backends
//!
//! | Backend | Module | Feature |
//! |---------|--------|---------|
//! | SQLite database | [`sqlite`] | `sqlite` (default) |
//! | In-memory tables | [`memory`] | always |
//! | Built-in catalogue (TiO₂, SiO₂, MgF₂, Ta₂O₅, BK7, fused silica) | [`catalogue`] | always |
//!
//! ## Lookup and interpolation
//!
//! [`store::OpticalDataStore`] fronts a record backend with a per-key
//! single-flight [`cache::SampleCache`] and resolves $\tilde{n} = n + ik$ at
//! arbitrary wavelengths by clamped linear interpolation
//! ([`interpolation::interpolate`]).

pub mod cache;
pub mod catalogue;
pub mod interpolation;
pub mod memory;
pub mod provider;
pub mod sample;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

pub use cache::{CacheConfig, SampleCache};
pub use memory::MemoryRecords;
pub use provider::{LayerRecord, MaterialError, OpticalRecords, StructureRecord};
pub use sample::{EntityKind, OpticalSample};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRecords;
pub use store::OpticalDataStore;
