//! Fitting one-dimensional Gaussian HMMs to a single appliance's readings.
//!
//! The factorial model only consumes fitted parameters, so fitting sits behind
//! the [`HmmFitter`] trait. [`BaumWelch`] is the default implementation:
//! k-means initialisation followed by expectation–maximisation.

use log::debug;
use ndarray::{Array1, Array2, Axis};

use crate::error::{FhmmError, Result};
use crate::hmm::appliance::ApplianceHmm;
use crate::hmm::joint::LN_2PI;
use crate::hmm::k_means::{kmeans, KMeansConfig};
use crate::hmm::posterior::forward_backward;

/// Readings required per hidden state before fitting is attempted.
pub const MIN_SAMPLES_PER_STATE: usize = 2;

/// Produces an [`ApplianceHmm`] from one appliance's power readings.
///
/// The seed is passed explicitly so that runs are reproducible without any
/// process-wide random state.
pub trait HmmFitter {
    fn fit(&self, observations: &[f64], num_states: usize, seed: u64) -> Result<ApplianceHmm>;
}

/// Baum–Welch (EM) trainer for Gaussian HMMs.
#[derive(Debug, Clone)]
pub struct BaumWelch {
    pub max_iterations: usize,
    /// Stop once the log-likelihood improves by less than this.
    pub tolerance: f64,
    /// Lower bound applied to every fitted variance.
    pub min_variance: f64,
}

impl Default for BaumWelch {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-4,
            min_variance: 1e-3,
        }
    }
}

impl BaumWelch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the EM iteration limit.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the log-likelihood convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the variance floor.
    pub fn with_min_variance(mut self, min_variance: f64) -> Self {
        self.min_variance = min_variance;
        self
    }

    /// Initial parameters from a k-means partition of the readings.
    fn initialise(&self, observations: &[f64], k: usize, seed: u64) -> Result<Params> {
        let (assignments, centroids) = kmeans(observations, &KMeansConfig::new(k).with_seed(seed))?;

        let mut sq = vec![0.0; k];
        let mut counts = vec![0_usize; k];
        for (&x, &c) in observations.iter().zip(&assignments) {
            sq[c] += (x - centroids[c]).powi(2);
            counts[c] += 1;
        }
        let overall = variance(observations).max(self.min_variance);
        let variances = Array1::from_shape_fn(k, |c| {
            if counts[c] > 1 {
                (sq[c] / counts[c] as f64).max(self.min_variance)
            } else {
                overall
            }
        });

        // Transition counts from the hard assignment, with add-one smoothing
        let mut transition = Array2::<f64>::ones((k, k));
        for pair in assignments.windows(2) {
            transition[[pair[0], pair[1]]] += 1.0;
        }
        normalise_rows(&mut transition);

        Ok(Params {
            prior: Array1::from_elem(k, 1.0 / k as f64),
            transition,
            means: Array1::from_vec(centroids),
            variances,
        })
    }

    fn step(&self, observations: &[f64], params: &Params) -> Result<(Params, f64)> {
        let k = params.means.len();
        let fb = forward_backward(
            &params.prior,
            &params.transition,
            params.log_emissions(observations),
            true,
        )?;

        let prior = fb.gamma.row(0).to_owned();

        let mut transition = fb.xi_sum.clone();
        for (i, mut row) in transition.axis_iter_mut(Axis(0)).enumerate() {
            let sum = row.sum();
            if sum > 0.0 {
                row /= sum;
            } else {
                row.assign(&params.transition.row(i));
            }
        }

        let x = Array1::from_vec(observations.to_vec());
        let weights = fb.gamma.sum_axis(Axis(0));
        let mut means = params.means.clone();
        let mut variances = params.variances.clone();
        for s in 0..k {
            let w = weights[s];
            if w <= f64::EPSILON {
                continue;
            }
            let gamma_s = fb.gamma.column(s);
            let mean = gamma_s.dot(&x) / w;
            let var = gamma_s
                .iter()
                .zip(x.iter())
                .map(|(g, xi)| g * (xi - mean).powi(2))
                .sum::<f64>()
                / w;
            means[s] = mean;
            variances[s] = var.max(self.min_variance);
        }

        Ok((
            Params {
                prior,
                transition,
                means,
                variances,
            },
            fb.log_likelihood,
        ))
    }
}

impl HmmFitter for BaumWelch {
    /// # Errors
    ///
    /// [`FhmmError::InsufficientTrainingData`] with fewer than
    /// `num_states * MIN_SAMPLES_PER_STATE` readings,
    /// [`FhmmError::NonFiniteObservation`] for NaN/infinite readings, and
    /// any error from the E-step.
    fn fit(&self, observations: &[f64], num_states: usize, seed: u64) -> Result<ApplianceHmm> {
        if num_states == 0 {
            return Err(FhmmError::EmptyModel);
        }
        let required = num_states * MIN_SAMPLES_PER_STATE;
        if observations.len() < required {
            return Err(FhmmError::InsufficientTrainingData {
                required,
                actual: observations.len(),
            });
        }
        if let Some(index) = observations.iter().position(|x| !x.is_finite()) {
            return Err(FhmmError::NonFiniteObservation { index });
        }

        let mut params = self.initialise(observations, num_states, seed)?;
        let mut previous = f64::NEG_INFINITY;
        for iteration in 0..self.max_iterations {
            let (updated, log_likelihood) = self.step(observations, &params)?;
            params = updated;
            if (log_likelihood - previous).abs() < self.tolerance {
                debug!(
                    "baum-welch converged after {} iterations (log-likelihood {:.3})",
                    iteration + 1,
                    log_likelihood
                );
                break;
            }
            previous = log_likelihood;
        }

        params.renormalise();
        ApplianceHmm::new(params.prior, params.transition, params.means, params.variances)
    }
}

#[derive(Debug, Clone)]
struct Params {
    prior: Array1<f64>,
    transition: Array2<f64>,
    means: Array1<f64>,
    variances: Array1<f64>,
}

impl Params {
    fn log_emissions(&self, observations: &[f64]) -> Array2<f64> {
        let k = self.means.len();
        Array2::from_shape_fn((observations.len(), k), |(t, s)| {
            let var = self.variances[s];
            let diff = observations[t] - self.means[s];
            -0.5 * (LN_2PI + var.ln() + diff * diff / var)
        })
    }

    /// Removes rounding drift so the result passes probability validation.
    fn renormalise(&mut self) {
        let total = self.prior.sum();
        if total > 0.0 {
            self.prior /= total;
        }
        normalise_rows(&mut self.transition);
    }
}

fn normalise_rows(matrix: &mut Array2<f64>) {
    for mut row in matrix.axis_iter_mut(Axis(0)) {
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        }
    }
}

fn variance(data: &[f64]) -> f64 {
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n
}
