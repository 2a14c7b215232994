//! Most-likely joint state path for an aggregate power sequence.

use ndarray::Array2;

use crate::error::{FhmmError, Result};
use crate::hmm::joint::JointHmm;

/// Runs the Viterbi algorithm against a joint model.
///
/// Returns one joint state index per observation. Every call starts from the
/// joint prior; nothing is carried over between sequences.
///
/// # Errors
///
/// - [`FhmmError::NonFiniteObservation`] if a reading is NaN or infinite.
///   Missing readings must be removed by the caller.
/// - [`FhmmError::DecodeDivergence`] if at some step no state has a finite
///   path score, e.g. after underflow or with an impossible transition.
pub fn viterbi(model: &JointHmm, observations: &[f64]) -> Result<Vec<usize>> {
    if observations.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(index) = observations.iter().position(|x| !x.is_finite()) {
        return Err(FhmmError::NonFiniteObservation { index });
    }

    let t = observations.len();
    let n = model.num_states();
    let log_a = model.log_transition();

    // delta[t][s]: best log-score of any path ending in s at time t
    // psi[t][s]: predecessor of s on that path
    let mut delta = Array2::from_elem((t, n), f64::NEG_INFINITY);
    let mut psi = Array2::<usize>::zeros((t, n));

    let emit0 = model.log_emissions(observations[0]);
    for s in 0..n {
        delta[[0, s]] = model.log_prior()[s] + emit0[s];
    }
    check_finite(&delta, 0)?;

    for time in 1..t {
        let emit = model.log_emissions(observations[time]);
        for s in 0..n {
            let mut best_val = f64::NEG_INFINITY;
            let mut best_prev = 0_usize;
            for s_prev in 0..n {
                let candidate = delta[[time - 1, s_prev]] + log_a[[s_prev, s]];
                if candidate > best_val {
                    best_val = candidate;
                    best_prev = s_prev;
                }
            }
            delta[[time, s]] = best_val + emit[s];
            psi[[time, s]] = best_prev;
        }
        check_finite(&delta, time)?;
    }

    let mut best_final_score = f64::NEG_INFINITY;
    let mut best_final_state = 0_usize;
    for s in 0..n {
        if delta[[t - 1, s]] > best_final_score {
            best_final_score = delta[[t - 1, s]];
            best_final_state = s;
        }
    }

    let mut path = vec![0_usize; t];
    path[t - 1] = best_final_state;
    for time in (1..t).rev() {
        path[time - 1] = psi[[time, path[time]]];
    }

    Ok(path)
}

fn check_finite(delta: &Array2<f64>, step: usize) -> Result<()> {
    if delta.row(step).iter().any(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(FhmmError::DecodeDivergence { step })
    }
}
