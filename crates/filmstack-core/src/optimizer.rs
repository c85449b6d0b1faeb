//! Layer thickness optimisation against a target reflection spectrum.
//!
//! Plain gradient descent on the squared reflection error
//! $E = \sum_i (R_i - R_i^{\text{target}})^2$, with the gradient estimated by
//! forward finite differences: each layer thickness is bumped by a fixed step
//! and the structure re-evaluated at one target wavelength at a time, giving
//!
//! $$
//! g_j = \sum_i 2\,(R_i - R_i^{\text{target}})\,\bigl(R_i(d_j + \Delta) - R_i\bigr).
//! $$
//!
//! Each iteration therefore costs one full evaluation plus
//! `layers × targets` single-wavelength probes. Iterations run strictly in
//! sequence; the probes inside one iteration are independent and each works
//! on its own copy of the stack.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::error::CoatingError;
use crate::spectrum::SpectrumEngine;
use crate::types::StructureDescription;

/// Step sizes and stopping criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Gradient step multiplier.
    pub learning_rate: f64,
    /// Stop once $\sqrt{E}$ falls below this.
    pub tolerance: f64,
    /// Forward-difference thickness step (nm).
    pub fd_step_nm: f64,
    /// Thinnest allowed layer (nm).
    pub min_thickness_nm: f64,
    /// Run the finite-difference probes of one iteration in parallel.
    pub parallel_probes: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            tolerance: 1e-4,
            fd_step_nm: 1.0,
            min_thickness_nm: 1.0,
            parallel_probes: true,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), CoatingError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(CoatingError::InvalidArgument(format!(
                    "optimizer {} must be positive, got {}",
                    name, v
                )))
            }
        };
        positive("learning_rate", self.learning_rate)?;
        positive("fd_step_nm", self.fd_step_nm)?;
        positive("min_thickness_nm", self.min_thickness_nm)?;
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(CoatingError::InvalidArgument(format!(
                "optimizer tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Outcome of an optimisation run.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    /// Best-effort structure after the last completed iteration.
    pub structure: StructureDescription,
    /// Iterations completed.
    pub iterations: usize,
    /// $E$ evaluated at the start of the last iteration; `None` if no
    /// iteration ran.
    pub final_error: Option<f64>,
    /// Whether $\sqrt{E}$ dropped below the tolerance.
    pub converged: bool,
}

impl OptimizationReport {
    /// $\sqrt{E}$ of the last iteration.
    pub fn residual(&self) -> Option<f64> {
        self.final_error.map(f64::sqrt)
    }
}

/// Mutable state of a run.
struct OptimizationState {
    current: StructureDescription,
    iteration: usize,
    last_total_error: Option<f64>,
}

pub struct ThicknessOptimizer {
    engine: SpectrumEngine,
    config: OptimizerConfig,
}

impl ThicknessOptimizer {
    pub fn new(engine: SpectrumEngine, config: OptimizerConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimise `initial` and return the resulting structure.
    ///
    /// Running out of iterations is not an error; use [`run`](Self::run) to
    /// find out whether the tolerance was reached.
    pub fn optimize(
        &self,
        initial: &StructureDescription,
        target_wavelengths: &[f64],
        target_reflection: &[f64],
        max_iterations: usize,
    ) -> Result<StructureDescription, CoatingError> {
        self.run(initial, target_wavelengths, target_reflection, max_iterations)
            .map(|report| report.structure)
    }

    pub fn run(
        &self,
        initial: &StructureDescription,
        target_wavelengths: &[f64],
        target_reflection: &[f64],
        max_iterations: usize,
    ) -> Result<OptimizationReport, CoatingError> {
        self.run_cancellable(
            initial,
            target_wavelengths,
            target_reflection,
            max_iterations,
            &CancellationToken::new(),
        )
    }

    /// As [`run`](Self::run), checking `token` before every iteration.
    ///
    /// # Errors
    /// [`CoatingError::InvalidArgument`] if the target slices differ in
    /// length or the configuration is unusable, [`CoatingError::Evaluation`]
    /// if any evaluation fails, [`CoatingError::Cancelled`] once `token` is
    /// cancelled. Nothing of an aborted run is kept.
    pub fn run_cancellable(
        &self,
        initial: &StructureDescription,
        target_wavelengths: &[f64],
        target_reflection: &[f64],
        max_iterations: usize,
        token: &CancellationToken,
    ) -> Result<OptimizationReport, CoatingError> {
        if target_wavelengths.len() != target_reflection.len() {
            return Err(CoatingError::InvalidArgument(format!(
                "{} target wavelengths but {} target reflection values",
                target_wavelengths.len(),
                target_reflection.len()
            )));
        }
        self.config.validate()?;

        let mut state = OptimizationState {
            current: initial.clone(),
            iteration: 0,
            last_total_error: None,
        };
        let mut converged = false;

        while state.iteration < max_iterations {
            token.check()?;

            let spectrum = self.engine.evaluate(&state.current, target_wavelengths)?;
            let current: Vec<f64> = spectrum.iter().map(|p| p.reflection).collect();
            let errors: Vec<f64> = current
                .iter()
                .zip(target_reflection)
                .map(|(r, target)| r - target)
                .collect();
            let total_error: f64 = errors.iter().map(|e| e * e).sum();

            let gradient = self.gradient(&state.current, target_wavelengths, &current, &errors)?;
            for (layer, g) in state.current.layers.iter_mut().zip(&gradient) {
                let stepped = layer.thickness_nm - self.config.learning_rate * g;
                layer.thickness_nm = stepped.max(self.config.min_thickness_nm);
            }

            state.iteration += 1;
            state.last_total_error = Some(total_error);
            log::debug!(
                "'{}' iteration {}: residual {:.3e}",
                state.current.name,
                state.iteration,
                total_error.sqrt()
            );

            if total_error.sqrt() < self.config.tolerance {
                converged = true;
                break;
            }
        }

        log::info!(
            "'{}': {} after {} iteration(s), residual {}",
            state.current.name,
            if converged { "converged" } else { "stopped" },
            state.iteration,
            state
                .last_total_error
                .map(|e| format!("{:.3e}", e.sqrt()))
                .unwrap_or_else(|| "n/a".into())
        );

        Ok(OptimizationReport {
            structure: state.current,
            iterations: state.iteration,
            final_error: state.last_total_error,
            converged,
        })
    }

    /// Forward-difference gradient of the total error with respect to each
    /// layer thickness.
    ///
    /// Contributions are summed per layer in target order on both paths, so
    /// parallel and sequential probing give identical results.
    fn gradient(
        &self,
        stack: &StructureDescription,
        target_wavelengths: &[f64],
        current: &[f64],
        errors: &[f64],
    ) -> Result<Vec<f64>, CoatingError> {
        let n_layers = stack.layers.len();
        let n_targets = target_wavelengths.len();
        let step = self.config.fd_step_nm;
        let contribution = |i: usize, perturbed: f64| 2.0 * errors[i] * (perturbed - current[i]);

        if self.config.parallel_probes {
            // Runs on the engine's pool, like the full evaluations.
            let terms = self.engine.install(|| {
                (0..n_layers * n_targets)
                    .into_par_iter()
                    .map(|idx| {
                        let (j, i) = (idx / n_targets, idx % n_targets);
                        let mut probe = stack.clone();
                        probe.layers[j].thickness_nm += step;
                        let point = self.engine.evaluate_point(&probe, target_wavelengths[i])?;
                        Ok(contribution(i, point.reflection))
                    })
                    .collect::<Vec<Result<f64, CoatingError>>>()
            });
            let terms = terms.into_iter().collect::<Result<Vec<f64>, CoatingError>>()?;

            let mut gradient = vec![0.0; n_layers];
            for (idx, term) in terms.into_iter().enumerate() {
                gradient[idx / n_targets] += term;
            }
            Ok(gradient)
        } else {
            let mut work = stack.clone();
            let mut gradient = vec![0.0; n_layers];
            for j in 0..n_layers {
                for i in 0..n_targets {
                    let original = work.layers[j].thickness_nm;
                    work.layers[j].thickness_nm = original + step;
                    let point = self.engine.evaluate_point(&work, target_wavelengths[i]);
                    work.layers[j].thickness_nm = original;
                    gradient[j] += contribution(i, point?.reflection);
                }
            }
            Ok(gradient)
        }
    }
}
