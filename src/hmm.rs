pub mod appliance;
pub mod canonical;
pub mod fit;
pub mod joint;
pub mod k_means;
pub mod posterior;
pub mod radix;
pub mod unmix;
pub mod viterbi;

// Re-export the model-level algorithms with descriptive names
pub use appliance::ApplianceHmm;
pub use canonical::{canonical_mapping, canonicalize, DuplicateMeanPolicy};
pub use fit::{BaumWelch, HmmFitter};
pub use joint::{kron_vector, JointHmm, DEFAULT_JOINT_VARIANCE, MAX_JOINT_STATES};
pub use k_means::{kmeans, KMeansConfig};
pub use posterior::{posteriors, Posteriors};
pub use radix::MixedRadix;
pub use unmix::{unmix, ApplianceTrace};
pub use viterbi::viterbi;
