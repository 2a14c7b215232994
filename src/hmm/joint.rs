//! Joint (factorial) model construction.
//!
//! Appliances are assumed to switch independently, so the joint chain over
//! the Cartesian product of their states has
//!
//! - prior `π = π_1 ⊗ π_2 ⊗ ... ⊗ π_N`
//! - transition `A = A_1 ⊗ A_2 ⊗ ... ⊗ A_N`
//! - mean `μ(s) = Σ_i μ_i(s_i)`, since the aggregate reading is the sum of
//!   the appliance readings.
//!
//! Every joint state gets the same fixed emission variance rather than one
//! derived from the appliance variances. This is an approximation inherited
//! from the exact FHMM formulation and is configurable.

use log::debug;
use ndarray::linalg::kron;
use ndarray::{Array1, Array2, Axis};

use crate::error::{FhmmError, Result};
use crate::hmm::appliance::ApplianceHmm;
use crate::hmm::radix::MixedRadix;

/// Joint-state emission variance used when none is configured.
pub const DEFAULT_JOINT_VARIANCE: f64 = 5.0;

/// Largest joint state count `combine` accepts. The dense `K×K` transition
/// matrix and its log copy take `16 K²` bytes.
pub const MAX_JOINT_STATES: usize = 1 << 14;

pub(crate) const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// Immutable joint Gaussian HMM over `K = Π k_i` states.
#[derive(Debug, Clone)]
pub struct JointHmm {
    radix: MixedRadix,
    prior: Array1<f64>,
    transition: Array2<f64>,
    means: Array1<f64>,
    variance: f64,
    factor_means: Vec<Array1<f64>>,
    log_prior: Array1<f64>,
    log_transition: Array2<f64>,
}

impl JointHmm {
    /// Combines appliance models, in the given order, into one joint model.
    ///
    /// The order of `models` fixes the digit order of every joint state index:
    /// the first model is the most significant digit. Inputs are expected to
    /// be canonicalised already.
    ///
    /// # Errors
    ///
    /// [`FhmmError::EmptyModel`] for an empty slice,
    /// [`FhmmError::InvalidProbability`] for a non-positive variance,
    /// [`FhmmError::StateSpaceOverflow`] if `K` exceeds [`MAX_JOINT_STATES`], and
    /// [`FhmmError::ShapeMismatch`] if the derived dimensions disagree.
    pub fn combine(models: &[ApplianceHmm], variance: f64) -> Result<Self> {
        if models.is_empty() {
            return Err(FhmmError::EmptyModel);
        }
        if !(variance.is_finite() && variance > 0.0) {
            return Err(FhmmError::InvalidProbability {
                what: "joint variance",
                message: format!("{variance} is not a positive variance"),
            });
        }

        let radix = MixedRadix::new(models.iter().map(ApplianceHmm::num_states).collect())?;
        let k = radix.total();
        if k > MAX_JOINT_STATES || k.checked_mul(k).is_none() {
            return Err(FhmmError::StateSpaceOverflow {
                radices: radix.radices().to_vec(),
            });
        }

        let prior = models[1..]
            .iter()
            .fold(models[0].prior().clone(), |acc, m| kron_vector(&acc, m.prior()));
        let transition = models[1..]
            .iter()
            .fold(models[0].transition().clone(), |acc, m| {
                kron(&acc, m.transition())
            });

        let factor_means: Vec<Array1<f64>> = models.iter().map(|m| m.means().clone()).collect();
        let means = joint_means(&radix, &factor_means)?;

        check_dim("joint prior", k, prior.len())?;
        check_dim("joint means", k, means.len())?;
        check_dim("joint transition rows", k, transition.nrows())?;
        check_dim("joint transition columns", k, transition.ncols())?;

        debug!(
            "combined {} appliances into {} joint states",
            models.len(),
            k
        );

        let log_prior = prior.mapv(f64::ln);
        let log_transition = transition.mapv(f64::ln);

        Ok(Self {
            radix,
            prior,
            transition,
            means,
            variance,
            factor_means,
            log_prior,
            log_transition,
        })
    }

    /// Number of joint states `K`.
    pub fn num_states(&self) -> usize {
        self.radix.total()
    }

    /// Number of appliances combined.
    pub fn num_appliances(&self) -> usize {
        self.radix.num_factors()
    }

    /// Per-appliance state counts in combination order.
    pub fn state_counts(&self) -> &[usize] {
        self.radix.radices()
    }

    /// Digit layout of joint state indices.
    pub fn radix(&self) -> &MixedRadix {
        &self.radix
    }

    /// Joint prior, the Kronecker product of the appliance priors.
    pub fn prior(&self) -> &Array1<f64> {
        &self.prior
    }

    /// `K×K` joint transition matrix.
    pub fn transition(&self) -> &Array2<f64> {
        &self.transition
    }

    /// Aggregate mean power of every joint state.
    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    /// Emission variance shared by every joint state.
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Per-joint-state variances (all equal to [`JointHmm::variance`]).
    pub fn variances(&self) -> Array1<f64> {
        Array1::from_elem(self.num_states(), self.variance)
    }

    /// Canonical means of each appliance, in combination order.
    pub fn factor_means(&self) -> &[Array1<f64>] {
        &self.factor_means
    }

    pub(crate) fn log_prior(&self) -> &Array1<f64> {
        &self.log_prior
    }

    pub(crate) fn log_transition(&self) -> &Array2<f64> {
        &self.log_transition
    }

    /// Log density of `reading` under every joint state's Gaussian.
    pub fn log_emissions(&self, reading: f64) -> Array1<f64> {
        let norm = LN_2PI + self.variance.ln();
        self.means.mapv(|mu| {
            let diff = reading - mu;
            -0.5 * (norm + diff * diff / self.variance)
        })
    }

    /// T×K matrix of emission log densities for a sequence.
    pub(crate) fn log_emission_matrix(&self, observations: &[f64]) -> Array2<f64> {
        let mut out = Array2::zeros((observations.len(), self.num_states()));
        for (mut row, &x) in out.axis_iter_mut(Axis(0)).zip(observations) {
            row.assign(&self.log_emissions(x));
        }
        out
    }
}

/// Kronecker product of two vectors, `a` as the outer (slower) factor.
pub fn kron_vector(a: &Array1<f64>, b: &Array1<f64>) -> Array1<f64> {
    let nb = b.len();
    Array1::from_shape_fn(a.len() * nb, |idx| a[idx / nb] * b[idx % nb])
}

/// Sum of appliance means for every joint state, enumerated in radix order.
fn joint_means(radix: &MixedRadix, factor_means: &[Array1<f64>]) -> Result<Array1<f64>> {
    let mut digits = vec![0; radix.num_factors()];
    let mut means = Array1::zeros(radix.total());
    for (state, slot) in means.iter_mut().enumerate() {
        radix.decode_into(state, &mut digits)?;
        *slot = digits
            .iter()
            .zip(factor_means)
            .map(|(&d, mu)| mu[d])
            .sum::<f64>();
    }
    Ok(means)
}

fn check_dim(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(FhmmError::ShapeMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
