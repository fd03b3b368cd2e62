//! Error types for the enrollment pipeline.
//!
//! One crate-wide error enum covers every stage, from configuration
//! validation through artifact persistence. Helper constructors keep the
//! verbose variants ergonomic at call sites.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Enum identifying which stage of the pipeline an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Image decoding.
    Decode,
    /// Image resizing.
    Resize,
    /// Image normalization.
    Normalization,
    /// Assembly of per-image tensors into a batch.
    BatchAssembly,
    /// Forward pass through an embedding backend.
    Inference,
    /// Classifier fitting.
    Training,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::Decode => write!(f, "decode"),
            ProcessingStage::Resize => write!(f, "resize"),
            ProcessingStage::Normalization => write!(f, "normalization"),
            ProcessingStage::BatchAssembly => write!(f, "batch assembly"),
            ProcessingStage::Inference => write!(f, "inference"),
            ProcessingStage::Training => write!(f, "training"),
        }
    }
}

/// Errors that can occur while enrolling identities.
#[derive(Error, Debug)]
pub enum EnrollError {
    /// Configuration was rejected. Every invalid or missing field is
    /// reported at once.
    #[error("configuration rejected: {}", .issues.join("; "))]
    Config {
        /// One human-readable message per rejected field.
        issues: Vec<String>,
    },

    /// The dataset root is missing, not a directory, or holds no
    /// identity sub-directories.
    #[error("dataset root {}: {reason}", .path.display())]
    DatasetNotFound {
        /// The offending root path.
        path: PathBuf,
        /// Why the root was rejected.
        reason: String,
    },

    /// Pretrained weights are missing or unusable by the runtime.
    #[error("model load failed for {}: {reason}", .model_path.display())]
    ModelLoad {
        /// Location of the weights that failed to load.
        model_path: PathBuf,
        /// Why loading failed.
        reason: String,
        /// The underlying error, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A sample image could not be decoded.
    #[error("image decode failed for {}", .path.display())]
    ImageDecode {
        /// The offending image path.
        path: PathBuf,
        /// The decoder error.
        #[source]
        source: image::ImageError,
    },

    /// The training set cannot support classifier fitting.
    #[error("insufficient training data: {reason}")]
    InsufficientData {
        /// What was missing, with counts.
        reason: String,
    },

    /// Writing the artifact pair failed. Destinations are left untouched.
    #[error("artifact write failed at {}", .path.display())]
    ArtifactWrite {
        /// Destination that could not be written.
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A persisted artifact could not be read back.
    #[error("artifact read failed at {}: {reason}", .path.display())]
    ArtifactRead {
        /// Artifact that could not be loaded.
        path: PathBuf,
        /// Why loading failed.
        reason: String,
    },

    /// The trained classifier's class order diverged from the dataset's
    /// identity ordinals.
    #[error("class order mismatch: dataset ordinals {expected:?}, classifier classes {actual:?}")]
    ClassOrderMismatch {
        /// Ordinals the dataset index assigned.
        expected: Vec<usize>,
        /// Classes the fitted classifier reports.
        actual: Vec<usize>,
    },

    /// Error occurred during processing.
    #[error("{stage} failed: {context}")]
    Processing {
        /// The stage where the error occurred.
        stage: ProcessingStage,
        /// Additional context about the error.
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from tensor operations.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

/// Convenient result alias for enrollment operations.
pub type EnrollResult<T> = Result<T, EnrollError>;

impl EnrollError {
    /// Creates a configuration rejection from a list of issues.
    pub fn config_rejected(issues: Vec<String>) -> Self {
        Self::Config { issues }
    }

    /// Creates a dataset error for the given root.
    pub fn dataset_not_found(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::DatasetNotFound {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Creates a model load error with an optional underlying cause.
    pub fn model_load(
        model_path: impl AsRef<Path>,
        reason: impl Into<String>,
        source: Option<impl std::error::Error + Send + Sync + 'static>,
    ) -> Self {
        Self::ModelLoad {
            model_path: model_path.as_ref().to_path_buf(),
            reason: reason.into(),
            source: source.map(|e| Box::new(e) as _),
        }
    }

    /// Creates an image decode error identifying the offending path.
    pub fn image_decode(path: impl AsRef<Path>, source: image::ImageError) -> Self {
        Self::ImageDecode {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates an insufficient-data error.
    pub fn insufficient_data(reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            reason: reason.into(),
        }
    }

    /// Creates an artifact write error for the given destination.
    pub fn artifact_write(
        path: impl AsRef<Path>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ArtifactWrite {
            path: path.as_ref().to_path_buf(),
            source: Box::new(source),
        }
    }

    /// Creates an artifact read error for the given source file.
    pub fn artifact_read(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::ArtifactRead {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Creates a processing error with stage and context.
    pub fn processing(
        stage: ProcessingStage,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            stage,
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Creates an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}
