//! Training and disaggregation driver.
//!
//! Training fits one HMM per appliance, canonicalises it and combines all of
//! them, in the order given, into a [`JointHmm`]. Disaggregation decodes each
//! aggregate chunk against that joint model independently and splits the
//! joint path back into per-appliance traces.
//!
//! Training uses a single chunk per appliance. This is a hard precondition:
//! extra chunks are ignored, not merged.

use log::{debug, info, warn};
use ndarray::Array1;
use rayon::prelude::*;

use crate::error::{FhmmError, Result};
use crate::hmm::appliance::ApplianceHmm;
use crate::hmm::canonical::canonicalize;
use crate::hmm::fit::{BaumWelch, HmmFitter};
use crate::hmm::joint::JointHmm;
use crate::hmm::posterior::{posteriors, Posteriors};
use crate::hmm::unmix::unmix;
use crate::hmm::viterbi::viterbi;
use crate::nilm::appliance_id::ApplianceId;
use crate::nilm::chunk::{ChunkDisaggregation, DisaggregationSink, PowerChunk, TrainingSeries};
use crate::nilm::config::FhmmConfig;

/// A canonicalised appliance model and its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedAppliance {
    pub id: ApplianceId,
    pub model: ApplianceHmm,
}

/// Why an appliance was left out of the joint model.
#[derive(Debug, Clone, PartialEq)]
pub enum ExclusionReason {
    /// The series had no chunks or no readings.
    NoData,
    /// Fraction of readings above the on threshold was too low.
    LowActivation { activation: f64 },
    /// The fitter rejected the data, or the fitted model could not be
    /// canonicalised (tied means under [`DuplicateMeanPolicy::Reject`](crate::hmm::DuplicateMeanPolicy::Reject)).
    FitFailed(FhmmError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExcludedAppliance {
    pub id: ApplianceId,
    pub reason: ExclusionReason,
}

/// Outcome of [`Fhmm::train`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainingReport {
    /// Appliances in the joint model, in combination order.
    pub trained: Vec<ApplianceId>,
    pub excluded: Vec<ExcludedAppliance>,
}

/// Counts from a multi-chunk [`Fhmm::disaggregate`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisaggregationSummary {
    pub decoded_chunks: usize,
    pub skipped_chunks: usize,
    pub rows: usize,
}

/// Exact factorial HMM disaggregator.
#[derive(Debug, Clone)]
pub struct Fhmm {
    config: FhmmConfig,
    appliances: Vec<TrainedAppliance>,
    joint: Option<JointHmm>,
}

impl Default for Fhmm {
    fn default() -> Self {
        Self::new(FhmmConfig::default())
    }
}

impl Fhmm {
    /// Untrained disaggregator.
    pub fn new(config: FhmmConfig) -> Self {
        Self {
            config,
            appliances: Vec::new(),
            joint: None,
        }
    }

    pub fn config(&self) -> &FhmmConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.joint.is_some()
    }

    /// Trained appliances in combination order.
    pub fn appliances(&self) -> &[TrainedAppliance] {
        &self.appliances
    }

    /// The joint model, or [`FhmmError::NotTrained`].
    pub fn joint(&self) -> Result<&JointHmm> {
        self.joint.as_ref().ok_or(FhmmError::NotTrained)
    }

    /// Trains with the default [`BaumWelch`] fitter.
    pub fn train(&mut self, series: &[TrainingSeries]) -> Result<TrainingReport> {
        self.train_with(series, &BaumWelch::default())
    }

    /// Fits every series with `fitter` and builds the joint model.
    ///
    /// The order of `series` is the combination order. Appliances that cannot
    /// be fitted or canonicalised are reported in [`TrainingReport::excluded`]
    /// rather than failing the run.
    ///
    /// # Errors
    ///
    /// [`FhmmError::DuplicateAppliance`] if an id repeats,
    /// [`FhmmError::EmptyModel`] if every appliance was excluded, and any
    /// error from canonicalisation or joint model construction.
    pub fn train_with<F: HmmFitter + ?Sized>(
        &mut self,
        series: &[TrainingSeries],
        fitter: &F,
    ) -> Result<TrainingReport> {
        check_unique(series.iter().map(|s| &s.id))?;

        let mut report = TrainingReport::default();
        let mut fitted = Vec::with_capacity(series.len());

        for entry in series {
            let readings = match entry.chunks.first() {
                Some(first) if !first.is_empty() => first,
                _ => {
                    warn!("no training data for {}; excluding it", entry.id);
                    report.excluded.push(ExcludedAppliance {
                        id: entry.id.clone(),
                        reason: ExclusionReason::NoData,
                    });
                    continue;
                }
            };
            if entry.chunks.len() > 1 {
                warn!(
                    "{} has {} training chunks; only the first is used",
                    entry.id,
                    entry.chunks.len()
                );
            }

            let readings: Vec<f64> = readings.iter().copied().filter(|x| x.is_finite()).collect();
            if readings.is_empty() {
                report.excluded.push(ExcludedAppliance {
                    id: entry.id.clone(),
                    reason: ExclusionReason::NoData,
                });
                continue;
            }

            let activation = activation(&readings, self.config.on_power_threshold);
            if self.config.min_activation > 0.0 && activation <= self.config.min_activation {
                warn!(
                    "{} is on for only {:.1}% of readings; excluding it",
                    entry.id,
                    activation * 100.0
                );
                report.excluded.push(ExcludedAppliance {
                    id: entry.id.clone(),
                    reason: ExclusionReason::LowActivation { activation },
                });
                continue;
            }

            let num_states = self.config.states_for(&entry.id, series.len());
            info!("training {}-state model for {}", num_states, entry.id);
            let canonical = fitter
                .fit(&readings, num_states, self.config.seed)
                .and_then(|model| canonicalize(&model, self.config.duplicate_means));
            match canonical {
                Ok(model) => fitted.push((entry.id.clone(), model)),
                Err(err) => {
                    warn!("could not fit {}: {}; excluding it", entry.id, err);
                    report.excluded.push(ExcludedAppliance {
                        id: entry.id.clone(),
                        reason: ExclusionReason::FitFailed(err),
                    });
                }
            }
        }

        report.trained = fitted.iter().map(|(id, _)| id.clone()).collect();
        self.train_from_models(fitted)?;
        Ok(report)
    }

    /// Builds the joint model from already fitted appliance models.
    ///
    /// Models are canonicalised here; the order of `models` is the
    /// combination order.
    pub fn train_from_models(&mut self, models: Vec<(ApplianceId, ApplianceHmm)>) -> Result<()> {
        if models.is_empty() {
            return Err(FhmmError::EmptyModel);
        }
        check_unique(models.iter().map(|(id, _)| id))?;

        let mut appliances = Vec::with_capacity(models.len());
        for (id, model) in models {
            let model = canonicalize(&model, self.config.duplicate_means)?;
            debug!("{} canonical means: {}", id, model.means());
            appliances.push(TrainedAppliance { id, model });
        }

        let canonical: Vec<ApplianceHmm> = appliances.iter().map(|a| a.model.clone()).collect();
        let joint = JointHmm::combine(&canonical, self.config.joint_variance)?;
        info!(
            "joint model: {} appliances, {} states",
            joint.num_appliances(),
            joint.num_states()
        );

        self.appliances = appliances;
        self.joint = Some(joint);
        Ok(())
    }

    /// Most likely joint state path for already-cleaned readings.
    pub fn decode(&self, observations: &[f64]) -> Result<Vec<usize>> {
        viterbi(self.joint()?, observations)
    }

    /// Per-step joint state probabilities for a chunk (missing rows dropped).
    pub fn state_posteriors(&self, chunk: &PowerChunk) -> Result<Posteriors> {
        posteriors(self.joint()?, &chunk.drop_missing().power)
    }

    /// Disaggregates one chunk.
    ///
    /// Missing readings are dropped first; the output has one row per
    /// remaining reading.
    ///
    /// # Errors
    ///
    /// [`FhmmError::InsufficientChunkLength`] if fewer than
    /// `min_chunk_length` readings remain, [`FhmmError::NotTrained`], and any
    /// decoding error.
    pub fn disaggregate_chunk(&self, chunk: &PowerChunk) -> Result<ChunkDisaggregation> {
        let joint = self.joint()?;
        let clean = chunk.drop_missing();
        if clean.len() < self.config.min_chunk_length {
            return Err(FhmmError::InsufficientChunkLength {
                required: self.config.min_chunk_length,
                actual: clean.len(),
            });
        }

        let path = viterbi(joint, &clean.power)?;
        let traces = unmix(&path, joint.state_counts(), &self.power_levels())?;
        debug!("decoded chunk of {} readings", path.len());

        let appliances = self
            .appliances
            .iter()
            .map(|a| a.id.clone())
            .zip(traces)
            .collect();
        Ok(ChunkDisaggregation {
            timestamps: clean.timestamps,
            appliances,
        })
    }

    /// Disaggregates chunks in order, writing each result to `sink`.
    ///
    /// Chunks that are too short are skipped; any other error stops the run.
    pub fn disaggregate<I, S>(&self, chunks: I, sink: &mut S) -> Result<DisaggregationSummary>
    where
        I: IntoIterator<Item = PowerChunk>,
        S: DisaggregationSink + ?Sized,
    {
        let mut summary = DisaggregationSummary::default();
        for chunk in chunks {
            match self.disaggregate_chunk(&chunk) {
                Ok(output) => {
                    summary.decoded_chunks += 1;
                    summary.rows += output.len();
                    sink.append(output)?;
                }
                Err(FhmmError::InsufficientChunkLength { required, actual }) => {
                    debug!("skipping chunk of {} readings (minimum {})", actual, required);
                    summary.skipped_chunks += 1;
                }
                Err(err) => return Err(err),
            }
        }
        if summary.skipped_chunks > 0 {
            warn!(
                "skipped {} chunks shorter than {} readings",
                summary.skipped_chunks, self.config.min_chunk_length
            );
        }
        Ok(summary)
    }

    /// Disaggregates independent chunks in parallel.
    ///
    /// The result is aligned with `chunks`; skipped (too short) chunks are
    /// `None`.
    pub fn disaggregate_parallel(
        &self,
        chunks: &[PowerChunk],
    ) -> Result<Vec<Option<ChunkDisaggregation>>> {
        self.joint()?;
        chunks
            .par_iter()
            .map(|chunk| match self.disaggregate_chunk(chunk) {
                Ok(output) => Ok(Some(output)),
                Err(FhmmError::InsufficientChunkLength { .. }) => Ok(None),
                Err(err) => Err(err),
            })
            .collect()
    }

    /// Per-appliance power levels reported for each canonical state.
    fn power_levels(&self) -> Vec<Array1<f64>> {
        self.appliances
            .iter()
            .map(|a| {
                if self.config.round_power {
                    a.model.means().mapv(f64::round)
                } else {
                    a.model.means().clone()
                }
            })
            .collect()
    }
}

fn check_unique<'a>(ids: impl Iterator<Item = &'a ApplianceId>) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(FhmmError::DuplicateAppliance { id: id.to_string() });
        }
    }
    Ok(())
}

/// Fraction of readings strictly above `threshold`.
fn activation(readings: &[f64], threshold: f64) -> f64 {
    let on = readings.iter().filter(|&&x| x > threshold).count();
    on as f64 / readings.len() as f64
}
