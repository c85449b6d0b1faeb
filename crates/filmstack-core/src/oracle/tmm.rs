//! Characteristic-matrix (transfer-matrix) solver for planar multilayers.
//!
//! Each film $j$ with complex index $N_j = n_j - ik_j$ and thickness $d_j$
//! contributes the matrix
//!
//! $$
//! M_j = \begin{pmatrix} \cos\delta_j & i\sin\delta_j/\eta_j \\
//!                       i\eta_j\sin\delta_j & \cos\delta_j \end{pmatrix},
//! \qquad \delta_j = \frac{2\pi}{\lambda} N_j d_j \cos\theta_j
//! $$
//!
//! with tilted admittance $\eta_j = N_j\cos\theta_j$ (s) or
//! $N_j/\cos\theta_j$ (p). The stack is reduced to
//! $[B, C]^T = \prod_j M_j\,[1, \eta_{\text{sub}}]^T$ and
//!
//! $$
//! R = \left|\frac{\eta_0 B - C}{\eta_0 B + C}\right|^2, \qquad
//! T = \frac{4\,\mathrm{Re}(\eta_0)\,\mathrm{Re}(\eta_{\text{sub}})}{|\eta_0 B + C|^2}.
//! $$
//!
//! The substrate is treated as thick and transparent: light reflected from
//! its uncoated back face adds incoherently when
//! [`StructureDescription::consider_backside`] is set. Results are the
//! average of s and p polarisation.
//!
//! Reference: H. A. Macleod, *Thin-Film Optical Filters*, 4th ed., ch. 2.

use std::sync::Arc;

use filmstack_materials::{EntityKind, MaterialError, OpticalDataStore};
use num_complex::Complex64;

use super::{OracleError, Response, ResponseOracle};
use crate::types::StructureDescription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarisation {
    S,
    P,
}

/// Transfer-matrix oracle resolving optical constants through a shared store.
pub struct TransferMatrixOracle {
    store: Arc<OpticalDataStore>,
    /// Refractive index of the incidence medium (and of the medium behind
    /// the substrate).
    ambient_index: f64,
}

impl TransferMatrixOracle {
    /// Oracle with air (n = 1) as the ambient medium.
    pub fn new(store: Arc<OpticalDataStore>) -> Self {
        Self {
            store,
            ambient_index: 1.0,
        }
    }

    pub fn with_ambient_index(mut self, ambient_index: f64) -> Self {
        self.ambient_index = ambient_index;
        self
    }

    pub fn store(&self) -> &Arc<OpticalDataStore> {
        &self.store
    }

    /// Index in the $n - ik$ sign convention used by the matrices.
    fn index(
        &self,
        kind: EntityKind,
        name: &str,
        wavelength_nm: f64,
    ) -> Result<Complex64, MaterialError> {
        Ok(self.store.refractive_index(kind, name, wavelength_nm)?.conj())
    }
}

impl ResponseOracle for TransferMatrixOracle {
    fn respond(
        &self,
        stack: &StructureDescription,
        wavelength_nm: f64,
    ) -> Result<Response, OracleError> {
        if !(0.0..90.0).contains(&stack.angle_degrees) {
            return Err(OracleError::InvalidStack(format!(
                "angle of incidence {}° outside [0, 90)",
                stack.angle_degrees
            )));
        }
        if !(self.ambient_index.is_finite() && self.ambient_index > 0.0) {
            return Err(OracleError::InvalidStack(format!(
                "ambient index {} is not positive",
                self.ambient_index
            )));
        }

        let ambient = Complex64::new(self.ambient_index, 0.0);
        // Thick substrate: absorption inside it is ignored.
        let substrate = Complex64::new(
            self.index(EntityKind::Substrate, &stack.substrate, wavelength_nm)?.re,
            0.0,
        );
        let films = stack
            .layers
            .iter()
            .map(|l| {
                Ok((
                    self.index(EntityKind::Material, &l.material, wavelength_nm)?,
                    l.thickness_nm,
                ))
            })
            .collect::<Result<Vec<_>, MaterialError>>()?;

        // Snell invariant n0 sin θ0.
        let beta = self.ambient_index * stack.angle_degrees.to_radians().sin();

        let mut transmission = 0.0;
        let mut reflection = 0.0;
        for pol in [Polarisation::S, Polarisation::P] {
            let (r, t) = if stack.consider_backside {
                with_backside(ambient, &films, substrate, beta, wavelength_nm, pol)
            } else {
                coherent(ambient, &films, substrate, beta, wavelength_nm, pol)
            };
            reflection += 0.5 * r;
            transmission += 0.5 * t;
        }

        if !(reflection.is_finite() && transmission.is_finite()) {
            return Err(OracleError::Numerical(format!(
                "non-finite response (R={}, T={})",
                reflection, transmission
            )));
        }

        Ok(Response {
            transmission: transmission.clamp(0.0, 1.0),
            reflection: reflection.clamp(0.0, 1.0),
        })
    }

    fn method_name(&self) -> &str {
        "Transfer matrix"
    }
}

/// $N\cos\theta$ inside a medium, on the decaying branch.
fn n_cos_theta(n: Complex64, beta: f64) -> Complex64 {
    let root = (n * n - beta * beta).sqrt();
    if root.im > 0.0 {
        -root
    } else {
        root
    }
}

fn admittance(n: Complex64, beta: f64, pol: Polarisation) -> Complex64 {
    let n_cos = n_cos_theta(n, beta);
    match pol {
        Polarisation::S => n_cos,
        Polarisation::P => n * n / n_cos,
    }
}

/// Coherent `(R, T)` of `films` between a transparent incidence medium and a
/// semi-infinite exit medium.
fn coherent(
    incident: Complex64,
    films: &[(Complex64, f64)],
    exit: Complex64,
    beta: f64,
    wavelength_nm: f64,
    pol: Polarisation,
) -> (f64, f64) {
    let i = Complex64::i();
    let eta_0 = admittance(incident, beta, pol);
    let eta_exit = admittance(exit, beta, pol);

    let mut b = Complex64::new(1.0, 0.0);
    let mut c = eta_exit;
    for &(n, d) in films.iter().rev() {
        let delta = 2.0 * std::f64::consts::PI * n_cos_theta(n, beta) * d / wavelength_nm;
        let eta = admittance(n, beta, pol);
        let (sin, cos) = (delta.sin(), delta.cos());
        let next_b = cos * b + i * sin / eta * c;
        let next_c = i * eta * sin * b + cos * c;
        b = next_b;
        c = next_c;
    }

    let denom = eta_0 * b + c;
    let r = (eta_0 * b - c) / denom;
    let t = 4.0 * eta_0.re * eta_exit.re / denom.norm_sqr();
    (r.norm_sqr(), t)
}

/// Coated front face plus incoherent reflection from the bare back face.
fn with_backside(
    ambient: Complex64,
    films: &[(Complex64, f64)],
    substrate: Complex64,
    beta: f64,
    wavelength_nm: f64,
    pol: Polarisation,
) -> (f64, f64) {
    let (r_front, t_front) = coherent(ambient, films, substrate, beta, wavelength_nm, pol);

    // Front coating seen from inside the substrate.
    let reversed: Vec<_> = films.iter().rev().copied().collect();
    let (r_inner, t_inner) = coherent(substrate, &reversed, ambient, beta, wavelength_nm, pol);

    let (r_back, t_back) = coherent(substrate, &[], ambient, beta, wavelength_nm, pol);

    let bounce = 1.0 - r_inner * r_back;
    let transmission = t_front * t_back / bounce;
    let reflection = r_front + t_front * t_inner * r_back / bounce;
    (reflection, transmission)
}
