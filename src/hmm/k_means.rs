//! One-dimensional k-means used to seed Gaussian HMM fitting.
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{FhmmError, Result};

/// Settings for scalar k-means.
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    /// Cluster count, one per hidden state being initialised.
    pub k: usize,
    /// Upper bound on assign/update rounds.
    pub max_iterations: usize,
    /// Stop once no centroid moves further than this between rounds.
    pub tolerance: f64,
    pub seed: u64,
}

impl KMeansConfig {
    /// Config for `k` clusters: 300 rounds, tolerance 1e-4, seed 42.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iterations: 300,
            tolerance: 1e-4,
            seed: 42,
        }
    }

    /// Sets the round limit.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the centroid movement tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the seed used to pick initial centroids.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Runs k-means on scalar data, returning per-point assignments and the
/// final centroids.
///
/// Initial centroids are `k` distinct samples drawn with the configured seed,
/// so equal inputs give equal outputs.
///
/// # Errors
///
/// [`FhmmError::InsufficientTrainingData`] if there are fewer points than
/// clusters, or `k` is zero.
pub fn kmeans(data: &[f64], config: &KMeansConfig) -> Result<(Vec<usize>, Vec<f64>)> {
    let n = data.len();
    if config.k == 0 || config.k > n {
        return Err(FhmmError::InsufficientTrainingData {
            required: config.k.max(1),
            actual: n,
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut centroids: Vec<f64> = data.choose_multiple(&mut rng, config.k).copied().collect();

    let mut assignments = vec![0_usize; n];

    for iter in 0..config.max_iterations {
        let mut changed = false;

        // Assignment step
        for (i, &point) in data.iter().enumerate() {
            let best = nearest(point, &centroids);
            if best != assignments[i] {
                assignments[i] = best;
                changed = true;
            }
        }

        // Update step
        let mut sums = vec![0.0; config.k];
        let mut counts = vec![0_usize; config.k];
        for (&point, &c) in data.iter().zip(&assignments) {
            sums[c] += point;
            counts[c] += 1;
        }

        let mut max_shift = 0.0_f64;
        for c in 0..config.k {
            // empty clusters keep their centroid
            if counts[c] > 0 {
                let updated = sums[c] / counts[c] as f64;
                max_shift = max_shift.max((updated - centroids[c]).abs());
                centroids[c] = updated;
            }
        }

        if iter > 0 && (!changed || max_shift < config.tolerance) {
            break;
        }
    }

    Ok((assignments, centroids))
}

fn nearest(point: f64, centroids: &[f64]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (c, &centroid) in centroids.iter().enumerate() {
        let dist = (point - centroid).abs();
        if dist < best_dist {
            best_dist = dist;
            best = c;
        }
    }
    best
}
