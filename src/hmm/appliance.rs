//! Per-appliance Gaussian HMM parameters.
//!
//! An [`ApplianceHmm`] holds the four parameter sets the factorial model
//! consumes: start probabilities, a row-stochastic transition matrix, one
//! power mean per state and one variance per state. Construction validates
//! that all of them agree on the state count `k`.

use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::Normal;

use crate::error::{FhmmError, Result};

/// Tolerance used when checking that probability vectors sum to one.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// A discrete-state, one-dimensional Gaussian HMM for a single appliance.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplianceHmm {
    prior: Array1<f64>,
    transition: Array2<f64>,
    means: Array1<f64>,
    variances: Array1<f64>,
}

impl ApplianceHmm {
    /// Creates a validated model.
    ///
    /// # Errors
    ///
    /// Returns [`FhmmError::EmptyModel`] for zero states,
    /// [`FhmmError::ShapeMismatch`] if the arrays disagree on `k`, and
    /// [`FhmmError::InvalidProbability`] if the prior or any transition row is
    /// not a probability distribution.
    pub fn new(
        prior: Array1<f64>,
        transition: Array2<f64>,
        means: Array1<f64>,
        variances: Array1<f64>,
    ) -> Result<Self> {
        let k = means.len();
        if k == 0 {
            return Err(FhmmError::EmptyModel);
        }
        check_len("prior", k, prior.len())?;
        check_len("variances", k, variances.len())?;
        check_len("transition rows", k, transition.nrows())?;
        check_len("transition columns", k, transition.ncols())?;

        if means.iter().any(|m| !m.is_finite()) {
            return Err(FhmmError::InvalidProbability {
                what: "means",
                message: "state means must be finite".to_string(),
            });
        }
        if variances.iter().any(|&v| !(v.is_finite() && v > 0.0)) {
            return Err(FhmmError::InvalidProbability {
                what: "variances",
                message: "state variances must be finite and positive".to_string(),
            });
        }

        check_distribution("prior", prior.iter().copied())?;
        for row in transition.rows() {
            check_distribution("transition", row.iter().copied())?;
        }

        Ok(Self {
            prior,
            transition,
            means,
            variances,
        })
    }

    /// Convenience constructor from plain vectors.
    pub fn from_vecs(
        prior: Vec<f64>,
        transition: Vec<Vec<f64>>,
        means: Vec<f64>,
        variances: Vec<f64>,
    ) -> Result<Self> {
        let k = transition.len();
        let mut flat = Vec::with_capacity(k * k);
        for row in &transition {
            check_len("transition columns", k, row.len())?;
            flat.extend_from_slice(row);
        }
        let transition = Array2::from_shape_vec((k, k), flat).map_err(|_| {
            FhmmError::ShapeMismatch {
                what: "transition",
                expected: k * k,
                actual: transition.iter().map(Vec::len).sum(),
            }
        })?;
        Self::new(
            Array1::from_vec(prior),
            transition,
            Array1::from_vec(means),
            Array1::from_vec(variances),
        )
    }

    /// Number of hidden states `k`.
    pub fn num_states(&self) -> usize {
        self.means.len()
    }

    /// Initial state distribution.
    pub fn prior(&self) -> &Array1<f64> {
        &self.prior
    }

    /// Row-stochastic `k×k` transition matrix, `[from, to]`.
    pub fn transition(&self) -> &Array2<f64> {
        &self.transition
    }

    /// Mean power of each state.
    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    /// Emission variance of each state.
    pub fn variances(&self) -> &Array1<f64> {
        &self.variances
    }

    /// Returns true if the state means are in non-decreasing order.
    pub fn is_sorted(&self) -> bool {
        self.means.windows(2).into_iter().all(|w| w[0] <= w[1])
    }

    /// Draws a synthetic `(states, readings)` trace of length `len`.
    ///
    /// States follow the Markov chain; each reading is drawn from the
    /// Gaussian of the current state.
    pub fn sample<R: Rng + ?Sized>(&self, len: usize, rng: &mut R) -> (Vec<usize>, Vec<f64>) {
        let mut states = Vec::with_capacity(len);
        let mut readings = Vec::with_capacity(len);
        if len == 0 {
            return (states, readings);
        }

        // Validated rows always have positive mass, so these cannot fail.
        let start = match WeightedIndex::<f64>::new(self.prior.iter()) {
            Ok(dist) => dist,
            Err(_) => return (states, readings),
        };
        let rows: Vec<WeightedIndex<f64>> = self
            .transition
            .rows()
            .into_iter()
            .filter_map(|row| WeightedIndex::<f64>::new(row.iter()).ok())
            .collect();
        if rows.len() != self.num_states() {
            return (states, readings);
        }

        let mut state = start.sample(rng);
        for step in 0..len {
            if step > 0 {
                state = rows[state].sample(rng);
            }
            let std_dev = self.variances[state].sqrt();
            let reading = match Normal::new(self.means[state], std_dev) {
                Ok(normal) => normal.sample(rng),
                Err(_) => self.means[state],
            };
            states.push(state);
            readings.push(reading);
        }
        (states, readings)
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(FhmmError::ShapeMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_distribution(what: &'static str, values: impl Iterator<Item = f64>) -> Result<()> {
    let mut sum = 0.0;
    for p in values {
        if !(p.is_finite() && p >= 0.0) {
            return Err(FhmmError::InvalidProbability {
                what,
                message: format!("entry {p} is not a probability"),
            });
        }
        sum += p;
    }
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(FhmmError::InvalidProbability {
            what,
            message: format!("entries sum to {sum}, expected 1"),
        });
    }
    Ok(())
}
