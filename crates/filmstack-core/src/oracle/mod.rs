//! Single-wavelength optical response.
//!
//! The [`ResponseOracle`] trait is the seam between the engineering pipeline
//! (parallel evaluation, caching, optimisation) and the physics. The
//! characteristic-matrix method ([`tmm::TransferMatrixOracle`]) is the
//! bundled implementation; tests substitute closures.

pub mod tmm;

use std::sync::Arc;

use filmstack_materials::MaterialError;
use thiserror::Error;

use crate::types::StructureDescription;

/// Errors raised while computing a single-wavelength response.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error(transparent)]
    Material(#[from] MaterialError),

    #[error("Invalid stack: {0}")]
    InvalidStack(String),

    #[error("Numerical failure: {0}")]
    Numerical(String),
}

/// Power fractions for one wavelength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Response {
    pub transmission: f64,
    pub reflection: f64,
}

/// Computes the transmission and reflection of a full stack at one
/// wavelength.
///
/// Implementations must be pure and deterministic for a given
/// `(stack, wavelength)` and safe to call from many threads at once.
pub trait ResponseOracle: Send + Sync {
    fn respond(
        &self,
        stack: &StructureDescription,
        wavelength_nm: f64,
    ) -> Result<Response, OracleError>;

    /// Human-readable name of the method.
    fn method_name(&self) -> &str {
        "custom"
    }
}

impl<F> ResponseOracle for F
where
    F: Fn(&StructureDescription, f64) -> Result<Response, OracleError> + Send + Sync,
{
    fn respond(
        &self,
        stack: &StructureDescription,
        wavelength_nm: f64,
    ) -> Result<Response, OracleError> {
        self(stack, wavelength_nm)
    }
}

/// Share a closure as an oracle.
pub fn from_fn<F>(f: F) -> Arc<dyn ResponseOracle>
where
    F: Fn(&StructureDescription, f64) -> Result<Response, OracleError> + Send + Sync + 'static,
{
    Arc::new(f)
}
