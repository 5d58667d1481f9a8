//! Recyclable Waste Classifier
//!
//! This crate classifies waste in photos: an object detector finds items, a
//! mapping store turns each item's class into a recyclability verdict, and
//! the results are aggregated per image and per batch.
//!
//! # Guarantees
//!
//! 1. **Closed verdicts**: only `Recyclable`, `Non-Recyclable`, `Compostable`,
//!    `Special Handling` and `Unknown` can ever enter the mapping store.
//! 2. **One verdict per class**: insertion overwrites; classification traffic
//!    never adds keys.
//! 3. **Failures are data**: an image the detector cannot process yields an
//!    error result for that image only.
//! 4. **Batch order**: a batch of N images returns N results, in input order.
//!
//! # Module Structure
//!
//! - `mapping`: verdict enumeration, class normalization, `MappingStore`
//! - `detect`: `DetectorBackend` trait, stub and ONNX backends, registry
//! - `classify`: single-image `Classifier` and `BatchClassifier`
//! - `service`: composition root used by the API and CLI
//! - `api`: local HTTP/1.1 API
//! - `config`: file + environment configuration

pub mod api;
pub mod classify;
pub mod config;
pub mod detect;
pub mod mapping;
pub mod service;

pub use classify::{
    Assessment, BatchClassifier, ClassificationReport, ClassificationResult,
    ClassificationSummary, Classifier, DetectedObject,
};
pub use config::{ClassifierSettings, DetectorSettings, ServiceConfig};
pub use detect::{BackendRegistry, BoundingBox, Detection, DetectorBackend, StubBackend};
pub use mapping::{normalize_class, Mapping, MappingRequest, MappingStore, Recyclability};
pub use service::ClassificationService;

// -------------------- Validation Errors --------------------

/// Rejected input at a validation boundary (mapping insertion, uploads).
///
/// Never retried; callers report it back to whoever submitted the input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
impl std::error::Error for ValidationError {}
