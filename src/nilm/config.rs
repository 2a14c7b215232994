//! Driver configuration.

use std::collections::HashMap;

use crate::hmm::canonical::DuplicateMeanPolicy;
use crate::hmm::joint::DEFAULT_JOINT_VARIANCE;
use crate::nilm::appliance_id::ApplianceId;

/// Chunks shorter than this are not decoded.
pub const DEFAULT_MIN_CHUNK_LENGTH: usize = 100;

/// Seed handed to the fitter when none is configured.
pub const DEFAULT_SEED: u64 = 42;

/// Above this many appliances the fallback state count drops from 3 to 2,
/// keeping the joint state space tractable.
pub const MANY_APPLIANCES: usize = 12;

/// Configuration for training and disaggregation.
#[derive(Debug, Clone)]
pub struct FhmmConfig {
    /// Minimum number of readings a chunk needs to be decoded.
    pub min_chunk_length: usize,
    /// Emission variance shared by every joint state.
    pub joint_variance: f64,
    /// Seed passed to the per-appliance fitter.
    pub seed: u64,
    /// Explicit state counts; appliances not listed use the fallback.
    pub num_states: HashMap<ApplianceId, usize>,
    /// Appliances are trained only if their fraction of readings above
    /// `on_power_threshold` is strictly greater than this. Zero disables the
    /// check.
    pub min_activation: f64,
    /// Power (watts) above which an appliance counts as on.
    pub on_power_threshold: f64,
    pub duplicate_means: DuplicateMeanPolicy,
    /// Report state means rounded to whole watts.
    pub round_power: bool,
}

impl Default for FhmmConfig {
    fn default() -> Self {
        Self {
            min_chunk_length: DEFAULT_MIN_CHUNK_LENGTH,
            joint_variance: DEFAULT_JOINT_VARIANCE,
            seed: DEFAULT_SEED,
            num_states: HashMap::new(),
            min_activation: 0.0,
            on_power_threshold: 10.0,
            duplicate_means: DuplicateMeanPolicy::default(),
            round_power: false,
        }
    }
}

impl FhmmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the shortest chunk that is still decoded.
    pub fn with_min_chunk_length(mut self, min_chunk_length: usize) -> Self {
        self.min_chunk_length = min_chunk_length;
        self
    }

    /// Sets the emission variance of every joint state.
    pub fn with_joint_variance(mut self, joint_variance: f64) -> Self {
        self.joint_variance = joint_variance;
        self
    }

    /// Sets the seed passed to the fitter.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fixes the number of states for one appliance.
    pub fn with_num_states(mut self, id: impl Into<ApplianceId>, num_states: usize) -> Self {
        self.num_states.insert(id.into(), num_states);
        self
    }

    /// Enables the activation filter with the given on threshold.
    pub fn with_min_activation(mut self, min_activation: f64, on_power_threshold: f64) -> Self {
        self.min_activation = min_activation;
        self.on_power_threshold = on_power_threshold;
        self
    }

    /// Chooses how tied state means are handled.
    pub fn with_duplicate_means(mut self, policy: DuplicateMeanPolicy) -> Self {
        self.duplicate_means = policy;
        self
    }

    /// Reports whole-watt power levels when set.
    pub fn with_round_power(mut self, round_power: bool) -> Self {
        self.round_power = round_power;
        self
    }

    /// State count for `id` when `num_appliances` are trained together.
    pub fn states_for(&self, id: &ApplianceId, num_appliances: usize) -> usize {
        match self.num_states.get(id) {
            Some(&k) => k,
            None if num_appliances > MANY_APPLIANCES => 2,
            None => 3,
        }
    }
}
