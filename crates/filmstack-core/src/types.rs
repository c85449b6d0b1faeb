//! Core types shared across the Filmstack pipeline.
//!
//! A [`StructureDescription`] is the full physical stack handed to the
//! response oracle; a [`SpectrumPoint`] is what comes back for one
//! wavelength.

use serde::{Deserialize, Serialize};

use crate::error::CoatingError;

/// A single homogeneous film.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Material identifier, resolved against the materials table.
    pub material: String,
    /// Physical thickness (nm).
    pub thickness_nm: f64,
}

/// A multilayer coating on a substrate.
///
/// Layers are ordered from the incidence side towards the substrate. A
/// description is owned by one computation at a time; the optimizer clones it
/// before perturbing thicknesses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureDescription {
    pub name: String,
    /// Substrate identifier, resolved against the substrates table.
    pub substrate: String,
    pub layers: Vec<Layer>,
    /// Include the incoherent reflection from the uncoated back face of the
    /// substrate.
    #[serde(default = "default_true")]
    pub consider_backside: bool,
    /// Angle of incidence in the ambient medium (degrees).
    #[serde(default)]
    pub angle_degrees: f64,
}

fn default_true() -> bool {
    true
}

impl StructureDescription {
    /// Bare substrate at normal incidence, backside included.
    pub fn new(name: impl Into<String>, substrate: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            substrate: substrate.into(),
            layers: Vec::new(),
            consider_backside: true,
            angle_degrees: 0.0,
        }
    }

    pub fn add_layer(&mut self, material: impl Into<String>, thickness_nm: f64) {
        self.layers.push(Layer {
            material: material.into(),
            thickness_nm,
        });
    }

    pub fn with_layer(mut self, material: impl Into<String>, thickness_nm: f64) -> Self {
        self.add_layer(material, thickness_nm);
        self
    }

    pub fn thicknesses(&self) -> Vec<f64> {
        self.layers.iter().map(|l| l.thickness_nm).collect()
    }

    pub fn total_thickness(&self) -> f64 {
        self.layers.iter().map(|l| l.thickness_nm).sum()
    }

    /// Check the physical constraints: positive finite thicknesses and an
    /// angle of incidence in `[0, 90)` degrees.
    pub fn validate(&self) -> Result<(), CoatingError> {
        for (i, layer) in self.layers.iter().enumerate() {
            if !layer.thickness_nm.is_finite() || layer.thickness_nm <= 0.0 {
                return Err(CoatingError::InvalidArgument(format!(
                    "structure '{}': layer {} ({}) has non-positive thickness {} nm",
                    self.name, i, layer.material, layer.thickness_nm
                )));
            }
        }
        if !(0.0..90.0).contains(&self.angle_degrees) {
            return Err(CoatingError::InvalidArgument(format!(
                "structure '{}': angle of incidence {}° outside [0, 90)",
                self.name, self.angle_degrees
            )));
        }
        Ok(())
    }
}

/// Transmission and reflection at one wavelength.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumPoint {
    /// Wavelength (nm).
    pub wavelength_nm: f64,
    /// Transmitted power fraction, 0–1.
    pub transmission: f64,
    /// Reflected power fraction, 0–1.
    pub reflection: f64,
}

impl SpectrumPoint {
    /// Absorbed fraction `1 - T - R`.
    pub fn absorption(&self) -> f64 {
        1.0 - self.transmission - self.reflection
    }
}
