//! warden-core: Biometric identity engine.
//!
//! Holds the enrolled-identity store, the enrollment quality heuristic, and
//! the tolerance matcher. Face detection and encoding are delegated to a
//! [`FaceEncoder`] implementation.

pub mod encoder;
pub mod enroll;
pub mod matcher;
pub mod store;
pub mod types;

pub use encoder::{CommandEncoder, EncoderError, FaceEncoder, MissingEncoder, DEFAULT_ENCODER_TIMEOUT};
pub use enroll::{quality_score, BestFace, BestFaceTracker, ENROLL_FRAME_CAP, ENROLL_QUALITY_THRESHOLD};
pub use matcher::{FirstMatchMatcher, MatchResult, Matcher, DEFAULT_TOLERANCE};
pub use store::{EmbeddingStore, Gallery, StoreError};
pub use types::{BoundingBox, Detection, Embedding, IdentityRecord};
