//! Tabulated optical constants.

use std::fmt;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::provider::MaterialError;

/// One tabulated point of a complex refractive index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpticalSample {
    /// Vacuum wavelength (nm).
    pub wavelength_nm: f64,
    /// Real part of the refractive index.
    pub n: f64,
    /// Extinction coefficient.
    pub k: f64,
}

impl OpticalSample {
    pub const fn new(wavelength_nm: f64, n: f64, k: f64) -> Self {
        Self { wavelength_nm, n, k }
    }

    /// $\tilde{n} = n + ik$ at this sample.
    pub fn refractive_index(&self) -> Complex64 {
        Complex64::new(self.n, self.k)
    }
}

impl From<(f64, f64, f64)> for OpticalSample {
    fn from((wavelength_nm, n, k): (f64, f64, f64)) -> Self {
        Self { wavelength_nm, n, k }
    }
}

/// Which table a named optical entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Material,
    Substrate,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Material => "Material",
            EntityKind::Substrate => "Substrate",
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            EntityKind::Material => 0,
            EntityKind::Substrate => 1,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Check that a freshly loaded sample table can be interpolated.
///
/// An empty table means the name matched nothing. Wavelengths must be finite,
/// positive and strictly increasing.
pub fn validate_samples(
    kind: EntityKind,
    name: &str,
    samples: &[OpticalSample],
) -> Result<(), MaterialError> {
    if samples.is_empty() {
        return Err(MaterialError::entity_not_found(kind, name));
    }
    for (i, s) in samples.iter().enumerate() {
        if !s.wavelength_nm.is_finite() || s.wavelength_nm <= 0.0 {
            return Err(MaterialError::Storage(format!(
                "{} '{}': invalid wavelength {} at row {}",
                kind, name, s.wavelength_nm, i
            )));
        }
        if i > 0 && s.wavelength_nm <= samples[i - 1].wavelength_nm {
            return Err(MaterialError::Storage(format!(
                "{} '{}': wavelengths not strictly increasing at row {} ({} nm after {} nm)",
                kind,
                name,
                i,
                s.wavelength_nm,
                samples[i - 1].wavelength_nm
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_is_not_found() {
        let err = validate_samples(EntityKind::Material, "Unobtainium", &[]).unwrap_err();
        assert!(matches!(err, MaterialError::NotFound { kind: "Material", .. }));
    }

    #[test]
    fn test_duplicate_wavelength_rejected() {
        let samples = [
            OpticalSample::new(400.0, 1.5, 0.0),
            OpticalSample::new(400.0, 1.6, 0.0),
        ];
        let err = validate_samples(EntityKind::Substrate, "BK7", &samples).unwrap_err();
        assert!(matches!(err, MaterialError::Storage(_)));
    }

    #[test]
    fn test_sorted_table_accepted() {
        let samples = [
            OpticalSample::new(400.0, 1.5, 0.0),
            OpticalSample::new(500.0, 1.6, 0.0),
        ];
        assert!(validate_samples(EntityKind::Material, "SiO2", &samples).is_ok());
    }
}
