//! State canonicalisation.
//!
//! Fitted HMMs number their states arbitrarily. Before models can be combined
//! or compared, their states are renumbered so that state 0 has the lowest
//! mean power and state `k - 1` the highest. The same permutation is applied
//! to the prior, the variances, and both axes of the transition matrix.

use log::warn;
use ndarray::{Array1, Array2};

use crate::error::{FhmmError, Result};
use crate::hmm::appliance::ApplianceHmm;

/// What to do when two states of one appliance share the same mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateMeanPolicy {
    /// Keep equal means in their fitted order and log a warning.
    #[default]
    StableOrder,
    /// Refuse to canonicalise.
    Reject,
}

/// Computes the permutation that sorts `means` ascending.
///
/// `mapping[i]` is the fitted index of the state that lands at sorted
/// position `i`. Equal means keep their original relative order.
///
/// # Errors
///
/// Returns [`FhmmError::DuplicateMeans`] when `policy` is
/// [`DuplicateMeanPolicy::Reject`] and two means compare equal.
pub fn canonical_mapping(means: &[f64], policy: DuplicateMeanPolicy) -> Result<Vec<usize>> {
    let mut mapping: Vec<usize> = (0..means.len()).collect();
    // sort_by is stable, so ties resolve by fitted index
    mapping.sort_by(|&a, &b| means[a].total_cmp(&means[b]));

    if let Some(pair) = mapping
        .windows(2)
        .find(|pair| means[pair[0]] == means[pair[1]])
    {
        let value = means[pair[0]];
        match policy {
            DuplicateMeanPolicy::Reject => return Err(FhmmError::DuplicateMeans { value }),
            DuplicateMeanPolicy::StableOrder => {
                warn!(
                    "states {} and {} share mean {}; keeping fitted order",
                    pair[0], pair[1], value
                );
            }
        }
    }

    Ok(mapping)
}

/// Returns a copy of `hmm` with its states renumbered in ascending-mean order.
pub fn canonicalize(hmm: &ApplianceHmm, policy: DuplicateMeanPolicy) -> Result<ApplianceHmm> {
    let means = hmm.means().to_vec();
    let mapping = canonical_mapping(&means, policy)?;
    let k = mapping.len();

    let new_means = Array1::from_shape_fn(k, |i| means[mapping[i]]);
    let new_prior = Array1::from_shape_fn(k, |i| hmm.prior()[mapping[i]]);
    let new_variances = Array1::from_shape_fn(k, |i| hmm.variances()[mapping[i]]);
    let new_transition =
        Array2::from_shape_fn((k, k), |(i, j)| hmm.transition()[[mapping[i], mapping[j]]]);

    ApplianceHmm::new(new_prior, new_transition, new_means, new_variances)
}
