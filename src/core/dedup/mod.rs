// Duplicate-image detection: the content-hash gate plus the edge-profile
// similarity pass that backs it up for near-identical reposts.

mod gate;
mod similarity;

pub use gate::{Decision, DuplicateGate, Fingerprint, FingerprintStore, GateError};
pub use similarity::{EdgeDetector, EdgeProfile, ProfileRing, SimilarityConfig};
