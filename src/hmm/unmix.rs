//! Maps joint state indices back to per-appliance states and power levels.

use ndarray::Array1;

use crate::error::{FhmmError, Result};
use crate::hmm::radix::MixedRadix;

/// Decoded state and power sequence for one appliance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplianceTrace {
    /// Local (canonical) state index at each step.
    pub states: Vec<usize>,
    /// Power level of that state at each step.
    pub power: Vec<f64>,
}

impl ApplianceTrace {
    fn with_capacity(len: usize) -> Self {
        Self {
            states: Vec::with_capacity(len),
            power: Vec::with_capacity(len),
        }
    }

    /// Number of time steps.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// `(state, power)` pairs in time order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.states.iter().copied().zip(self.power.iter().copied())
    }
}

/// Splits a joint state path into one trace per appliance.
///
/// `state_counts` and `means` must be in the order the appliances were
/// combined; `means[i]` holds appliance `i`'s canonical state means.
///
/// # Errors
///
/// [`FhmmError::ShapeMismatch`] if `means` does not line up with
/// `state_counts`, and [`FhmmError::StateOutOfRange`] for a joint index
/// outside `[0, K)`.
pub fn unmix(
    path: &[usize],
    state_counts: &[usize],
    means: &[Array1<f64>],
) -> Result<Vec<ApplianceTrace>> {
    if means.len() != state_counts.len() {
        return Err(FhmmError::ShapeMismatch {
            what: "appliance means",
            expected: state_counts.len(),
            actual: means.len(),
        });
    }
    for (&k, mu) in state_counts.iter().zip(means) {
        if mu.len() != k {
            return Err(FhmmError::ShapeMismatch {
                what: "appliance state means",
                expected: k,
                actual: mu.len(),
            });
        }
    }

    let radix = MixedRadix::new(state_counts.to_vec())?;
    let mut traces: Vec<ApplianceTrace> = (0..state_counts.len())
        .map(|_| ApplianceTrace::with_capacity(path.len()))
        .collect();
    let mut digits = vec![0; state_counts.len()];

    for &joint in path {
        radix.decode_into(joint, &mut digits)?;
        for ((trace, &local), mu) in traces.iter_mut().zip(&digits).zip(means) {
            trace.states.push(local);
            trace.power.push(mu[local]);
        }
    }

    Ok(traces)
}
