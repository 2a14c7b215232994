//! Mixed-radix indexing of the joint state space.
//!
//! A joint state is a tuple `(s_1, ..., s_N)` with `s_i < k_i`. It is
//! flattened row-major: the first appliance is the most significant digit and
//! the last appliance varies fastest. This is the same order produced by
//! chaining Kronecker products `A_1 ⊗ A_2 ⊗ ... ⊗ A_N`, so the joint model
//! builder and the unmixer both go through this type.

use crate::error::{FhmmError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixedRadix {
    radices: Vec<usize>,
    total: usize,
}

impl MixedRadix {
    /// # Errors
    ///
    /// [`FhmmError::EmptyModel`] if there are no radices or any radix is zero,
    /// [`FhmmError::StateSpaceOverflow`] if the product does not fit in `usize`.
    pub fn new(radices: Vec<usize>) -> Result<Self> {
        if radices.is_empty() || radices.contains(&0) {
            return Err(FhmmError::EmptyModel);
        }
        let total = radices
            .iter()
            .try_fold(1_usize, |acc, &k| acc.checked_mul(k))
            .ok_or_else(|| FhmmError::StateSpaceOverflow {
                radices: radices.clone(),
            })?;
        Ok(Self { radices, total })
    }

    /// Per-factor state counts, in combination order.
    pub fn radices(&self) -> &[usize] {
        &self.radices
    }

    /// Total number of joint states `K = Π k_i`.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of digits (appliances).
    pub fn num_factors(&self) -> usize {
        self.radices.len()
    }

    /// Writes the digits of `state` into `digits`.
    ///
    /// The divisor starts at `K` and is divided by each `k_i` in turn, so
    /// `digits[i] = (state / (K / (k_1 ... k_i))) mod k_i`.
    pub fn decode_into(&self, state: usize, digits: &mut [usize]) -> Result<()> {
        if state >= self.total {
            return Err(FhmmError::StateOutOfRange {
                state,
                num_states: self.total,
            });
        }
        if digits.len() != self.radices.len() {
            return Err(FhmmError::ShapeMismatch {
                what: "digit buffer",
                expected: self.radices.len(),
                actual: digits.len(),
            });
        }
        let mut factor = self.total;
        for (digit, &k) in digits.iter_mut().zip(&self.radices) {
            factor /= k;
            *digit = (state / factor) % k;
        }
        Ok(())
    }

    /// Digits of `state`, most significant first.
    pub fn decode(&self, state: usize) -> Result<Vec<usize>> {
        let mut digits = vec![0; self.radices.len()];
        self.decode_into(state, &mut digits)?;
        Ok(digits)
    }

    /// Inverse of [`MixedRadix::decode`].
    pub fn encode(&self, digits: &[usize]) -> Result<usize> {
        if digits.len() != self.radices.len() {
            return Err(FhmmError::ShapeMismatch {
                what: "digit tuple",
                expected: self.radices.len(),
                actual: digits.len(),
            });
        }
        let mut state = 0;
        for (&digit, &k) in digits.iter().zip(&self.radices) {
            if digit >= k {
                return Err(FhmmError::StateOutOfRange {
                    state: digit,
                    num_states: k,
                });
            }
            state = state * k + digit;
        }
        Ok(state)
    }
}
