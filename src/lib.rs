//! STS annotation corpus to OpenCV cascade training samples
//!
//! This library turns a flat-text traffic-sign annotation corpus into the
//! artifacts the OpenCV cascade tools train from: a positive sample list,
//! a negative sample list mined from sign-free frames, and optionally one
//! best-candidate seed crop for synthetic augmentation.

pub mod brightness;
pub mod candidate;
pub mod config;
pub mod conversion;
pub mod crops;
pub mod dataset;
pub mod error;
pub mod io;
pub mod parser;
pub mod trainer;
pub mod types;

// Re-export commonly used types and functions
pub use config::{Args, CollectionMode};
pub use dataset::{prepare_training_data, PrepOutcome, MIN_POSITIVE_OBJECTS};
pub use error::{PrepError, PrepResult};
pub use parser::{parse_line, CorpusReader, ParseOptions};
pub use types::{
    AnnotationRecord, BoundingBox, FrameSize, ProcessingStats, SampleSet, SignDescriptor,
    Visibility,
};
