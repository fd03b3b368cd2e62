//! # trackid
//!
//! Identity enrollment for a people-tracking toolbox: given a labeled
//! dataset of person images, extract embedding vectors from a pretrained
//! feature network, fit a probability-calibrated classifier over them,
//! and persist an inference-ready artifact (classifier plus ordered
//! identity names) for the runtime tracker to consume.
//!
//! ## Components
//!
//! - **Dataset indexing**: one sub-directory per identity, scanned into
//!   a stable ordinal assignment
//! - **Embedding extraction**: interchangeable backends behind one
//!   trait, a frozen ONNX graph or an eager candle module
//! - **Classifier training**: one-vs-rest calibrated support-vector
//!   machines over the embeddings
//! - **Artifact export**: an atomic pair of binary artifact and
//!   human-readable class listing, index alignment guaranteed
//!
//! ## Modules
//!
//! * [`core`] - Errors, configuration, batch partitioning
//! * [`dataset`] - Dataset discovery and label-path pairing
//! * [`extractor`] - Backend-polymorphic embedding extraction
//! * [`classifier`] - Classifier fitting and calibration
//! * [`artifact`] - Artifact persistence and loading
//! * [`pipeline`] - The sequential enrollment pipeline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trackid::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::new(
//!     "data/people",
//!     "out/classifier.bin",
//!     "out/classes.txt",
//!     BackendKind::Graph,
//!     "models/embedder.onnx",
//! )
//! .with_batch_size(16);
//!
//! let report = enroll(&config)?;
//! println!(
//!     "enrolled {} identities from {} images",
//!     report.identity_count, report.sample_count
//! );
//! # Ok(())
//! # }
//! ```
//!
//! At runtime, the tracker side loads the artifact once and maps each
//! query embedding back to a name through the embedded class list:
//!
//! ```rust,no_run
//! use trackid::artifact::ClassifierArtifact;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let embedding = ndarray::Array1::<f32>::zeros(128);
//! let artifact = ClassifierArtifact::load(Path::new("out/classifier.bin"))?;
//! if let Some((name, confidence)) = artifact.predict(embedding.view(), 0.6)? {
//!     println!("{name} ({confidence:.2})");
//! }
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod classifier;
pub mod core;
pub mod dataset;
pub mod extractor;
pub mod pipeline;

/// Prelude module for convenient imports.
///
/// Bring the essentials into scope with a single use statement:
///
/// ```rust
/// use trackid::prelude::*;
/// ```
pub mod prelude {
    pub use crate::artifact::{ArtifactWriter, ClassifierArtifact};
    pub use crate::classifier::{ClassifierTrainer, IdentityClassifier, TrainingSet};
    pub use crate::core::{
        BackendKind, BatchSampler, EnrollError, EnrollResult, PipelineConfig,
    };
    pub use crate::dataset::DatasetIndex;
    pub use crate::extractor::{EmbeddingExtractor, build_extractor};
    pub use crate::pipeline::{EnrollmentReport, enroll, enroll_with_extractor};
}
