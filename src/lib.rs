//! Non-intrusive load monitoring with an exact factorial HMM.
//!
//! Each appliance is modelled as a small Gaussian HMM. The models are
//! canonicalised, combined into one joint HMM over the product of their state
//! spaces, and an aggregate power signal is decoded against that joint model
//! to recover every appliance's state and power at every step.
//!
//! ```
//! use fhmm_nilm::hmm::ApplianceHmm;
//! use fhmm_nilm::nilm::{Fhmm, FhmmConfig, PowerChunk};
//!
//! let fridge = ApplianceHmm::from_vecs(
//!     vec![0.5, 0.5],
//!     vec![vec![0.9, 0.1], vec![0.1, 0.9]],
//!     vec![10.0, 100.0],
//!     vec![1.0, 1.0],
//! )?;
//! let lamp = ApplianceHmm::from_vecs(
//!     vec![0.5, 0.5],
//!     vec![vec![0.9, 0.1], vec![0.1, 0.9]],
//!     vec![5.0, 50.0],
//!     vec![1.0, 1.0],
//! )?;
//!
//! let mut fhmm = Fhmm::new(FhmmConfig::new().with_min_chunk_length(2));
//! fhmm.train_from_models(vec![("fridge".into(), fridge), ("lamp".into(), lamp)])?;
//!
//! let out = fhmm.disaggregate_chunk(&PowerChunk::from_readings(vec![15.0, 60.0, 150.0]))?;
//! assert_eq!(out.total_power(), vec![15.0, 60.0, 150.0]);
//! # Ok::<(), fhmm_nilm::Error>(())
//! ```

pub mod error;
pub mod hmm;
pub mod nilm;

pub use error::{FhmmError as Error, Result};
pub use hmm::{ApplianceHmm, JointHmm};
pub use nilm::{ApplianceId, Fhmm, FhmmConfig};
