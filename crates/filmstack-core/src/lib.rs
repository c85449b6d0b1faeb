//! # Filmstack Core
//!
//! The data-to-result pipeline of the Filmstack toolkit: load a stored
//! coating structure, evaluate its transmission/reflection spectrum in
//! parallel across wavelengths, and tune layer thicknesses towards a target
//! reflection spectrum.
//!
//! ## Architecture
//!
//! The per-wavelength optical response is an injected capability: anything
//! implementing [`oracle::ResponseOracle`] can drive the
//! [`spectrum::SpectrumEngine`]. The default implementation is the
//! characteristic-matrix method ([`oracle::tmm::TransferMatrixOracle`]),
//! which resolves optical constants through a shared
//! [`filmstack_materials::OpticalDataStore`].
//!
//! ## Modules
//!
//! - [`types`]: Structures, layers and spectrum points.
//! - [`error`]: The [`CoatingError`] taxonomy.
//! - [`structure`]: Loading stored structures in stacking order.
//! - [`oracle`]: Response oracle trait and transfer-matrix solver.
//! - [`spectrum`]: Parallel, optionally asynchronous spectrum evaluation.
//! - [`optimizer`]: Finite-difference gradient descent on thicknesses.
//! - [`cancel`]: Cooperative cancellation.
//! - [`analyzer`]: Caller-facing facade tying everything together.

pub mod analyzer;
pub mod cancel;
pub mod error;
pub mod optimizer;
pub mod oracle;
pub mod spectrum;
pub mod structure;
pub mod types;

pub use analyzer::{AnalyzerConfig, CoatingAnalyzer};
pub use cancel::CancellationToken;
pub use error::CoatingError;
pub use optimizer::{OptimizationReport, OptimizerConfig, ThicknessOptimizer};
pub use oracle::{OracleError, Response, ResponseOracle};
pub use spectrum::{EngineConfig, SpectrumEngine, SpectrumTask};
pub use structure::StructureRepository;
pub use types::{Layer, SpectrumPoint, StructureDescription};
