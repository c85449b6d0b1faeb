//! Built-in optical constants for common coating materials and glasses.
//!
//! Values are tabulated $(\lambda, n, k)$ at 50 nm spacing across 300–1000 nm,
//! condensed from:
//! - E. D. Palik, *Handbook of Optical Constants of Solids* (Academic Press,
//!   1985): rutile TiO₂ (ordinary ray), fused SiO₂.
//! - M. J. Dodge, Appl. Opt. **23**, 1980 (1984): MgF₂ (ordinary ray).
//! - T. J. Bright et al., Thin Solid Films **520**, 6793 (2012): Ta₂O₅ films.
//! - SCHOTT N-BK7 datasheet (Sellmeier fit).
//!
//! ## Contents
//!
//! | Kind | Name | Notes |
//! |------|------|-------|
//! | Material | `TiO2` | high index, absorption edge near 380 nm |
//! | Material | `Ta2O5` | high index, edge near 310 nm |
//! | Material | `SiO2` | low index, lossless |
//! | Material | `MgF2` | low index, lossless |
//! | Substrate | `BK7` | borosilicate crown glass |
//! | Substrate | `FusedSilica` | |
//!
//! [`builtin`] bundles these with a few demonstration structures designed
//! for 550 nm.

use crate::memory::MemoryRecords;
use crate::sample::OpticalSample;

/// Design wavelength of the demonstration structures (nm).
pub const DESIGN_WAVELENGTH_NM: f64 = 550.0;

fn table(data: &[(f64, f64, f64)]) -> Vec<OpticalSample> {
    data.iter().copied().map(OpticalSample::from).collect()
}

/// Rutile TiO₂, ordinary ray.
pub fn tio2() -> Vec<OpticalSample> {
    table(&[
        (300.0, 3.340, 0.880),
        (350.0, 2.720, 0.140),
        (400.0, 2.620, 0.003),
        (450.0, 2.591, 0.000),
        (500.0, 2.572, 0.000),
        (550.0, 2.557, 0.000),
        (600.0, 2.547, 0.000),
        (650.0, 2.538, 0.000),
        (700.0, 2.531, 0.000),
        (750.0, 2.526, 0.000),
        (800.0, 2.521, 0.000),
        (850.0, 2.517, 0.000),
        (900.0, 2.513, 0.000),
        (950.0, 2.510, 0.000),
        (1000.0, 2.507, 0.000),
    ])
}

/// Amorphous Ta₂O₅ film.
pub fn ta2o5() -> Vec<OpticalSample> {
    table(&[
        (300.0, 2.362, 0.0120),
        (350.0, 2.241, 0.0008),
        (400.0, 2.183, 0.000),
        (450.0, 2.152, 0.000),
        (500.0, 2.133, 0.000),
        (550.0, 2.120, 0.000),
        (600.0, 2.111, 0.000),
        (650.0, 2.104, 0.000),
        (700.0, 2.099, 0.000),
        (750.0, 2.095, 0.000),
        (800.0, 2.091, 0.000),
        (850.0, 2.088, 0.000),
        (900.0, 2.086, 0.000),
        (950.0, 2.084, 0.000),
        (1000.0, 2.082, 0.000),
    ])
}

/// Fused silica, used both as a coating material and as a substrate.
pub fn sio2() -> Vec<OpticalSample> {
    table(&[
        (300.0, 1.487, 0.000),
        (350.0, 1.476, 0.000),
        (400.0, 1.470, 0.000),
        (450.0, 1.4665, 0.000),
        (500.0, 1.462, 0.000),
        (550.0, 1.4595, 0.000),
        (600.0, 1.458, 0.000),
        (650.0, 1.4565, 0.000),
        (700.0, 1.455, 0.000),
        (750.0, 1.4535, 0.000),
        (800.0, 1.452, 0.000),
        (850.0, 1.4505, 0.000),
        (900.0, 1.450, 0.000),
        (950.0, 1.449, 0.000),
        (1000.0, 1.448, 0.000),
    ])
}

/// MgF₂, ordinary ray.
pub fn mgf2() -> Vec<OpticalSample> {
    table(&[
        (300.0, 1.3940, 0.000),
        (350.0, 1.3883, 0.000),
        (400.0, 1.3845, 0.000),
        (450.0, 1.3819, 0.000),
        (500.0, 1.3801, 0.000),
        (550.0, 1.3786, 0.000),
        (600.0, 1.3774, 0.000),
        (650.0, 1.3765, 0.000),
        (700.0, 1.3757, 0.000),
        (750.0, 1.3751, 0.000),
        (800.0, 1.3746, 0.000),
        (850.0, 1.3741, 0.000),
        (900.0, 1.3737, 0.000),
        (950.0, 1.3733, 0.000),
        (1000.0, 1.3730, 0.000),
    ])
}

/// N-BK7 borosilicate crown glass.
pub fn bk7() -> Vec<OpticalSample> {
    table(&[
        (300.0, 1.5528, 0.000),
        (350.0, 1.5392, 0.000),
        (400.0, 1.5308, 0.000),
        (450.0, 1.5253, 0.000),
        (500.0, 1.5214, 0.000),
        (550.0, 1.5185, 0.000),
        (600.0, 1.5163, 0.000),
        (650.0, 1.5145, 0.000),
        (700.0, 1.5131, 0.000),
        (750.0, 1.5119, 0.000),
        (800.0, 1.5108, 0.000),
        (850.0, 1.5099, 0.000),
        (900.0, 1.5092, 0.000),
        (950.0, 1.5083, 0.000),
        (1000.0, 1.5075, 0.000),
    ])
}

/// Quarter-wave physical thickness (nm) for index `n` at `wavelength_nm`.
pub fn quarter_wave(n: f64, wavelength_nm: f64) -> f64 {
    wavelength_nm / (4.0 * n)
}

/// All built-in tables plus demonstration structures.
///
/// | Structure | Substrate | Layers |
/// |-----------|-----------|--------|
/// | `BK7-uncoated` | BK7 | none |
/// | `MgF2-AR` | BK7 | single quarter-wave MgF₂ |
/// | `V-coat` | BK7 | MgF₂ over a thin Ta₂O₅ layer, reflection minimum at 550 nm |
/// | `HR-7` | FusedSilica | (HL)³H quarter-wave mirror, TiO₂/SiO₂ |
pub fn builtin() -> MemoryRecords {
    let qw_mgf2 = quarter_wave(1.3786, DESIGN_WAVELENGTH_NM);
    let qw_tio2 = quarter_wave(2.557, DESIGN_WAVELENGTH_NM);
    let qw_sio2 = quarter_wave(1.4595, DESIGN_WAVELENGTH_NM);

    let mirror: Vec<(&str, f64)> = (0..7)
        .map(|i| if i % 2 == 0 { ("TiO2", qw_tio2) } else { ("SiO2", qw_sio2) })
        .collect();

    MemoryRecords::new()
        .with_material("TiO2", tio2())
        .with_material("Ta2O5", ta2o5())
        .with_material("SiO2", sio2())
        .with_material("MgF2", mgf2())
        .with_substrate("BK7", bk7())
        .with_substrate("FusedSilica", sio2())
        .with_structure("BK7-uncoated", "BK7", &[])
        .with_structure("MgF2-AR", "BK7", &[("MgF2", qw_mgf2)])
        .with_structure("V-coat", "BK7", &[("MgF2", 127.0), ("Ta2O5", 16.8)])
        .with_structure("HR-7", "FusedSilica", &mirror)
}
