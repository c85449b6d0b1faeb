//! Parallel spectrum evaluation.
//!
//! Every wavelength is evaluated independently by the [`ResponseOracle`], so
//! a spectrum is a data-parallel map over the wavelength list. Rayon's indexed
//! collect keeps the output aligned with the input regardless of which worker
//! finishes first.
//!
//! Results can be taken synchronously ([`SpectrumEngine::evaluate`]), through
//! a handle ([`SpectrumEngine::evaluate_async`]), or delivered to a callback
//! ([`SpectrumEngine::evaluate_then`]). All three share one failure policy:
//! if any wavelength fails, the whole call fails with the error of the first
//! failing wavelength in input order and no partial spectrum is returned.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Deserialize;

use crate::cancel::CancellationToken;
use crate::error::CoatingError;
use crate::oracle::{OracleError, ResponseOracle};
use crate::types::{SpectrumPoint, StructureDescription};

/// Slack allowed on oracle output before it is rejected as unphysical.
const RANGE_SLACK: f64 = 1e-9;

/// Thread pool sizing for spectrum evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Dedicated worker count. `None` shares Rayon's global pool.
    #[serde(default)]
    pub threads: Option<usize>,
}

type SpectrumResult = Result<Vec<SpectrumPoint>, CoatingError>;

/// Evaluates structures across wavelength lists.
///
/// Cloning is cheap and clones share the oracle and thread pool.
#[derive(Clone)]
pub struct SpectrumEngine {
    oracle: Arc<dyn ResponseOracle>,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl SpectrumEngine {
    /// Engine running on Rayon's global pool.
    pub fn new(oracle: Arc<dyn ResponseOracle>) -> Self {
        Self { oracle, pool: None }
    }

    pub fn with_config(
        oracle: Arc<dyn ResponseOracle>,
        config: &EngineConfig,
    ) -> Result<Self, CoatingError> {
        let pool = match config.threads {
            None => None,
            Some(0) => {
                return Err(CoatingError::InvalidArgument(
                    "engine thread count must be at least 1".into(),
                ))
            }
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("filmstack-spectrum-{}", i))
                    .build()
                    .map_err(|e| CoatingError::InvalidArgument(format!("thread pool: {}", e)))?;
                Some(Arc::new(pool))
            }
        };
        Ok(Self { oracle, pool })
    }

    pub fn oracle(&self) -> &Arc<dyn ResponseOracle> {
        &self.oracle
    }

    /// Number of worker threads evaluations run on.
    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Run `op` on the engine's worker pool.
    ///
    /// Rayon iterators started inside `op` use the dedicated pool when one is
    /// configured, and the global pool otherwise.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Evaluate `stack` at every wavelength, blocking until all are done.
    ///
    /// `result[i]` corresponds to `wavelengths[i]`.
    ///
    /// # Errors
    /// [`CoatingError::InvalidArgument`] for a non-positive or non-finite
    /// wavelength; [`CoatingError::Evaluation`] naming the first wavelength
    /// whose evaluation failed.
    pub fn evaluate(&self, stack: &StructureDescription, wavelengths: &[f64]) -> SpectrumResult {
        self.run(stack, wavelengths, None)
    }

    /// As [`evaluate`](Self::evaluate), checking `token` before each
    /// wavelength is dispatched.
    pub fn evaluate_cancellable(
        &self,
        stack: &StructureDescription,
        wavelengths: &[f64],
        token: &CancellationToken,
    ) -> SpectrumResult {
        self.run(stack, wavelengths, Some(token))
    }

    /// Evaluate a single wavelength on the calling thread.
    pub fn evaluate_point(
        &self,
        stack: &StructureDescription,
        wavelength_nm: f64,
    ) -> Result<SpectrumPoint, CoatingError> {
        let response = self
            .oracle
            .respond(stack, wavelength_nm)
            .map_err(|source| CoatingError::Evaluation {
                wavelength_nm,
                source,
            })?;

        let in_range = |v: f64| v.is_finite() && (-RANGE_SLACK..=1.0 + RANGE_SLACK).contains(&v);
        if !in_range(response.transmission) || !in_range(response.reflection) {
            return Err(CoatingError::Evaluation {
                wavelength_nm,
                source: OracleError::Numerical(format!(
                    "{} returned T={}, R={} outside [0, 1]",
                    self.oracle.method_name(),
                    response.transmission,
                    response.reflection
                )),
            });
        }

        Ok(SpectrumPoint {
            wavelength_nm,
            transmission: response.transmission.clamp(0.0, 1.0),
            reflection: response.reflection.clamp(0.0, 1.0),
        })
    }

    /// Start an evaluation in the background and return immediately.
    pub fn evaluate_async(
        &self,
        stack: StructureDescription,
        wavelengths: Vec<f64>,
    ) -> SpectrumTask {
        let (tx, rx) = mpsc::channel();
        self.evaluate_then(stack, wavelengths, move |result| {
            // The receiver may have been dropped; nobody is waiting then.
            let _ = tx.send(result);
        });
        SpectrumTask { rx }
    }

    /// Start an evaluation in the background and hand the complete result to
    /// `on_complete` on a worker thread once every wavelength has resolved.
    ///
    /// A panic in the oracle is delivered as [`CoatingError::Panicked`]. A
    /// panic in `on_complete` is logged and dropped.
    pub fn evaluate_then<F>(
        &self,
        stack: StructureDescription,
        wavelengths: Vec<f64>,
        on_complete: F,
    ) where
        F: FnOnce(SpectrumResult) + Send + 'static,
    {
        let engine = self.clone();
        let job = move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                engine.evaluate(&stack, &wavelengths)
            }))
            .unwrap_or_else(|payload| Err(CoatingError::Panicked(panic_message(&*payload))));
            let delivered = panic::catch_unwind(AssertUnwindSafe(move || on_complete(result)));
            if let Err(payload) = delivered {
                log::error!(
                    "spectrum callback for '{}' panicked: {}",
                    stack.name,
                    panic_message(&*payload)
                );
            }
        };
        match &self.pool {
            Some(pool) => pool.spawn(job),
            None => rayon::spawn(job),
        }
    }

    fn run(
        &self,
        stack: &StructureDescription,
        wavelengths: &[f64],
        token: Option<&CancellationToken>,
    ) -> SpectrumResult {
        if let Some(&bad) = wavelengths.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
            return Err(CoatingError::InvalidArgument(format!(
                "wavelength {} nm is not positive",
                bad
            )));
        }
        if let Some(token) = token {
            token.check()?;
        }

        let job = || {
            wavelengths
                .par_iter()
                .map(|&wl| {
                    if let Some(token) = token {
                        token.check()?;
                    }
                    self.evaluate_point(stack, wl)
                })
                .collect::<Vec<_>>()
        };
        let points = self.install(job);

        // Sequential collect keeps the first failure in input order.
        let spectrum = points.into_iter().collect::<SpectrumResult>()?;
        log::debug!(
            "evaluated '{}' at {} wavelengths ({})",
            stack.name,
            spectrum.len(),
            self.oracle.method_name()
        );
        Ok(spectrum)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".into()
    }
}

/// Handle to a background evaluation.
pub struct SpectrumTask {
    rx: mpsc::Receiver<SpectrumResult>,
}

impl SpectrumTask {
    /// Block until the evaluation finishes.
    pub fn wait(self) -> SpectrumResult {
        self.rx.recv().unwrap_or(Err(CoatingError::Disconnected))
    }

    /// Non-blocking poll. `None` while the evaluation is still running.
    ///
    /// The result is handed out once; later polls report
    /// [`CoatingError::Disconnected`].
    pub fn try_result(&self) -> Option<SpectrumResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(CoatingError::Disconnected)),
        }
    }
}
