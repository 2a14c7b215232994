//! Input chunks, training series and disaggregation output.

use crate::error::{FhmmError, Result};
use crate::hmm::unmix::ApplianceTrace;
use crate::nilm::appliance_id::ApplianceId;

/// A contiguous block of aggregate power readings with their timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PowerChunk {
    /// Seconds since the epoch, one per reading.
    pub timestamps: Vec<i64>,
    /// Readings in watts; NaN marks a missing value.
    pub power: Vec<f64>,
}

impl PowerChunk {
    /// Pairs timestamps with readings; both must have the same length.
    pub fn new(timestamps: Vec<i64>, power: Vec<f64>) -> Result<Self> {
        if timestamps.len() != power.len() {
            return Err(FhmmError::ShapeMismatch {
                what: "chunk timestamps",
                expected: power.len(),
                actual: timestamps.len(),
            });
        }
        Ok(Self { timestamps, power })
    }

    /// Chunk with timestamps `0, 1, 2, ...`.
    pub fn from_readings(power: Vec<f64>) -> Self {
        let timestamps = (0..power.len() as i64).collect();
        Self { timestamps, power }
    }

    pub fn len(&self) -> usize {
        self.power.len()
    }

    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }

    /// Copy of the chunk without rows whose reading is NaN or infinite.
    pub fn drop_missing(&self) -> PowerChunk {
        let (timestamps, power): (Vec<i64>, Vec<f64>) = self
            .timestamps
            .iter()
            .zip(&self.power)
            .filter(|(_, p)| p.is_finite())
            .map(|(&t, &p)| (t, p))
            .unzip();
        PowerChunk { timestamps, power }
    }
}

/// Training data for one appliance.
///
/// Only the first chunk is used for fitting; later chunks are ignored with a
/// warning.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSeries {
    pub id: ApplianceId,
    pub chunks: Vec<Vec<f64>>,
}

impl TrainingSeries {
    /// Series with a single training chunk.
    pub fn new(id: impl Into<ApplianceId>, readings: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            chunks: vec![readings],
        }
    }

    pub fn with_chunks(id: impl Into<ApplianceId>, chunks: Vec<Vec<f64>>) -> Self {
        Self {
            id: id.into(),
            chunks,
        }
    }
}

/// Per-appliance decoded traces for one chunk, aligned with its timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDisaggregation {
    pub timestamps: Vec<i64>,
    pub appliances: Vec<(ApplianceId, ApplianceTrace)>,
}

impl ChunkDisaggregation {
    /// Number of rows (time steps).
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Trace for `id`, if it was part of the joint model.
    pub fn appliance(&self, id: &ApplianceId) -> Option<&ApplianceTrace> {
        self.appliances
            .iter()
            .find(|(candidate, _)| candidate == id)
            .map(|(_, trace)| trace)
    }

    /// Sum of the decoded appliance power at each step.
    pub fn total_power(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.len()];
        for (_, trace) in &self.appliances {
            for (slot, p) in total.iter_mut().zip(&trace.power) {
                *slot += p;
            }
        }
        total
    }
}

/// Destination for disaggregated chunks.
pub trait DisaggregationSink {
    fn append(&mut self, output: ChunkDisaggregation) -> Result<()>;
}

impl DisaggregationSink for Vec<ChunkDisaggregation> {
    fn append(&mut self, output: ChunkDisaggregation) -> Result<()> {
        self.push(output);
        Ok(())
    }
}
