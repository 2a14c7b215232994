pub mod appliance_id;
pub mod chunk;
pub mod config;
pub mod fhmm;

#[cfg(test)]
mod tests;

pub use appliance_id::ApplianceId;
pub use chunk::{ChunkDisaggregation, DisaggregationSink, PowerChunk, TrainingSeries};
pub use config::FhmmConfig;
pub use fhmm::{
    DisaggregationSummary, ExcludedAppliance, ExclusionReason, Fhmm, TrainedAppliance,
    TrainingReport,
};
