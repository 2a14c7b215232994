//! Error type shared by the model builders, the decoder and the driver.

use thiserror::Error;

/// Errors raised while building, fitting or decoding factorial HMMs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FhmmError {
    #[error("shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid probability in {what}: {message}")]
    InvalidProbability { what: &'static str, message: String },

    #[error("model has no states or no appliances")]
    EmptyModel,

    #[error("joint state space overflows: product of state counts {radices:?}")]
    StateSpaceOverflow { radices: Vec<usize> },

    #[error("duplicate state mean {value} prevents an unambiguous state ordering")]
    DuplicateMeans { value: f64 },

    #[error("observation chunk too short: need at least {required} readings, got {actual}")]
    InsufficientChunkLength { required: usize, actual: usize },

    #[error("decoding diverged at step {step}: no finite-likelihood path")]
    DecodeDivergence { step: usize },

    #[error("not enough training data: need at least {required} readings, got {actual}")]
    InsufficientTrainingData { required: usize, actual: usize },

    #[error("model has not been trained")]
    NotTrained,

    #[error("appliance {id} appears more than once in the combination order")]
    DuplicateAppliance { id: String },

    #[error("joint state {state} out of range for {num_states} states")]
    StateOutOfRange { state: usize, num_states: usize },

    #[error("non-finite observation at index {index}")]
    NonFiniteObservation { index: usize },
}

pub type Result<T> = std::result::Result<T, FhmmError>;
