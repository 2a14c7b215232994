//! Per-step joint state probabilities via scaled forward–backward.
//!
//! Emission densities are shifted by their per-step maximum in log space
//! before exponentiation and the forward variables are renormalised at every
//! step, so long sequences do not underflow.

use ndarray::{Array1, Array2, Axis};

use crate::error::{FhmmError, Result};
use crate::hmm::joint::JointHmm;

/// Output of [`posteriors`].
#[derive(Debug, Clone)]
pub struct Posteriors {
    /// `T × K`; row `t` is the distribution over joint states at step `t`.
    pub probabilities: Array2<f64>,
    /// Log-likelihood of the whole sequence under the model.
    pub log_likelihood: f64,
}

impl Posteriors {
    /// Most probable joint state at each step (marginal, not a path).
    pub fn argmax(&self) -> Vec<usize> {
        self.probabilities
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (i, &p)| {
                        if p > best.1 {
                            (i, p)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }
}

/// Computes `P(state_t = s | observations)` for every step and joint state.
///
/// # Errors
///
/// [`FhmmError::NonFiniteObservation`] for NaN/infinite readings and
/// [`FhmmError::DecodeDivergence`] if the forward pass loses all mass.
pub fn posteriors(model: &JointHmm, observations: &[f64]) -> Result<Posteriors> {
    let n = model.num_states();
    if observations.is_empty() {
        return Ok(Posteriors {
            probabilities: Array2::zeros((0, n)),
            log_likelihood: 0.0,
        });
    }
    if let Some(index) = observations.iter().position(|x| !x.is_finite()) {
        return Err(FhmmError::NonFiniteObservation { index });
    }

    let fb = forward_backward(
        model.prior(),
        model.transition(),
        model.log_emission_matrix(observations),
        false,
    )?;
    Ok(Posteriors {
        probabilities: fb.gamma,
        log_likelihood: fb.log_likelihood,
    })
}

/// Smoothed statistics of one sequence under a Gaussian HMM.
#[derive(Debug, Clone)]
pub(crate) struct ForwardBackward {
    /// `T × K` state posteriors.
    pub gamma: Array2<f64>,
    /// `K × K` expected transition counts summed over the sequence.
    /// Left zero unless requested.
    pub xi_sum: Array2<f64>,
    pub log_likelihood: f64,
}

/// Scaled forward–backward over precomputed emission log densities
/// (`T × K`, `T >= 1`).
pub(crate) fn forward_backward(
    prior: &Array1<f64>,
    transition: &Array2<f64>,
    mut emissions: Array2<f64>,
    with_transitions: bool,
) -> Result<ForwardBackward> {
    let (t, n) = emissions.dim();

    // b[t][s] = exp(log_b - max_s log_b)
    let mut shifts = Array1::<f64>::zeros(t);
    for (time, mut row) in emissions.axis_iter_mut(Axis(0)).enumerate() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        if !max.is_finite() {
            return Err(FhmmError::DecodeDivergence { step: time });
        }
        shifts[time] = max;
        row.mapv_inplace(|v| (v - max).exp());
    }

    let mut alpha = Array2::<f64>::zeros((t, n));
    let mut scale = Array1::<f64>::zeros(t);

    let first = prior * &emissions.row(0);
    alpha.row_mut(0).assign(&first);
    scale[0] = normalize_row(&mut alpha, 0)?;

    for time in 1..t {
        let predicted = alpha.row(time - 1).dot(transition);
        let next = predicted * &emissions.row(time);
        alpha.row_mut(time).assign(&next);
        scale[time] = normalize_row(&mut alpha, time)?;
    }

    let mut beta = Array2::<f64>::zeros((t, n));
    beta.row_mut(t - 1).fill(1.0);
    let mut xi_sum = Array2::<f64>::zeros((n, n));
    for time in (0..t - 1).rev() {
        let weighted = &emissions.row(time + 1) * &beta.row(time + 1);
        if with_transitions {
            // xi_t(i, j) = alpha_t(i) A(i, j) b_{t+1}(j) beta_{t+1}(j) / c_{t+1}
            let outer = alpha
                .row(time)
                .insert_axis(Axis(1))
                .dot(&weighted.view().insert_axis(Axis(0)));
            xi_sum += &(outer * transition / scale[time + 1]);
        }
        let back = transition.dot(&weighted) / scale[time + 1];
        beta.row_mut(time).assign(&back);
    }

    let mut gamma = alpha * beta;
    for mut row in gamma.axis_iter_mut(Axis(0)) {
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        }
    }

    let log_likelihood = scale.mapv(f64::ln).sum() + shifts.sum();

    Ok(ForwardBackward {
        gamma,
        xi_sum,
        log_likelihood,
    })
}

fn normalize_row(alpha: &mut Array2<f64>, time: usize) -> Result<f64> {
    let mut row = alpha.row_mut(time);
    let sum = row.sum();
    if !(sum.is_finite() && sum > 0.0) {
        return Err(FhmmError::DecodeDivergence { step: time });
    }
    row /= sum;
    Ok(sum)
}
