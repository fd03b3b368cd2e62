//! Pipeline configuration and validation.
//!
//! The configuration is constructed once, validated once, and then passed
//! by reference through the pipeline. Parsing a configuration document
//! into [`PipelineConfig`] is left to the caller; the serde derives use
//! `deny_unknown_fields` so unrecognized keys are rejected rather than
//! silently ignored.

use crate::core::errors::{EnrollError, EnrollResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_image_size() -> u32 {
    DEFAULT_IMAGE_SIZE
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_gpu_memory_fraction() -> f32 {
    DEFAULT_GPU_MEMORY_FRACTION
}

/// Default square input size fed to the embedding network.
pub const DEFAULT_IMAGE_SIZE: u32 = 160;

/// Default number of images per extraction batch.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default accelerator memory fraction (the whole device).
pub const DEFAULT_GPU_MEMORY_FRACTION: f32 = 1.0;

/// Which embedding backend the pipeline binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Frozen computation graph executed through ONNX Runtime.
    Graph,
    /// Pretrained network module executed eagerly through candle.
    Eager,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Graph => write!(f, "graph"),
            BackendKind::Eager => write!(f, "eager"),
        }
    }
}

/// Validated, immutable configuration for one enrollment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Dataset root: one sub-directory per identity.
    pub dataset_dir: PathBuf,
    /// Destination of the binary classifier artifact.
    pub artifact_path: PathBuf,
    /// Destination of the plain-text class name listing.
    pub listing_path: PathBuf,
    /// Embedding backend selection.
    pub backend: BackendKind,
    /// Pretrained weights: an ONNX file for the graph backend, a model
    /// directory for the eager backend.
    pub model_path: PathBuf,
    /// Square input size fed to the embedding network.
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    /// Number of images per extraction batch. Bounds peak memory only;
    /// batch boundaries never affect the resulting embeddings.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Fraction of accelerator memory the backend may claim, in (0, 1].
    #[serde(default = "default_gpu_memory_fraction")]
    pub gpu_memory_fraction: f32,
    /// Minimum confidence for downstream runtime consumers. Passed
    /// through, never interpreted by this pipeline.
    #[serde(default)]
    pub min_confidence: f32,
}

impl PipelineConfig {
    /// Creates a configuration with default resource knobs.
    pub fn new(
        dataset_dir: impl Into<PathBuf>,
        artifact_path: impl Into<PathBuf>,
        listing_path: impl Into<PathBuf>,
        backend: BackendKind,
        model_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dataset_dir: dataset_dir.into(),
            artifact_path: artifact_path.into(),
            listing_path: listing_path.into(),
            backend,
            model_path: model_path.into(),
            image_size: DEFAULT_IMAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            gpu_memory_fraction: DEFAULT_GPU_MEMORY_FRACTION,
            min_confidence: 0.0,
        }
    }

    /// Sets the square network input size.
    pub fn with_image_size(mut self, image_size: u32) -> Self {
        self.image_size = image_size;
        self
    }

    /// Sets the extraction batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the accelerator memory fraction.
    pub fn with_gpu_memory_fraction(mut self, fraction: f32) -> Self {
        self.gpu_memory_fraction = fraction;
        self
    }

    /// Sets the pass-through minimum confidence.
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }
}

impl ConfigValidator for PipelineConfig {
    fn collect_issues(&self, issues: &mut Vec<String>) {
        check_dir_exists(issues, &self.dataset_dir, "dataset_dir");
        check_nonempty_path(issues, &self.artifact_path, "artifact_path");
        check_nonempty_path(issues, &self.listing_path, "listing_path");
        match self.backend {
            BackendKind::Graph => check_file_exists(issues, &self.model_path, "model_path"),
            BackendKind::Eager => check_dir_exists(issues, &self.model_path, "model_path"),
        }
        check_positive_u32(issues, self.image_size, "image_size");
        check_positive_usize(issues, self.batch_size, "batch_size");
        check_open_unit_fraction(issues, self.gpu_memory_fraction, "gpu_memory_fraction");
        check_unit_range(issues, self.min_confidence, "min_confidence");
    }
}

/// A trait for configuration types validated once at construction.
///
/// Implementors describe their problems through [`collect_issues`];
/// `validate` turns a non-empty issue list into a single
/// [`EnrollError::Config`] naming every rejected field at once.
///
/// [`collect_issues`]: ConfigValidator::collect_issues
pub trait ConfigValidator {
    /// Appends one message per invalid or missing field.
    fn collect_issues(&self, issues: &mut Vec<String>);

    /// Validates the configuration, reporting all issues together.
    fn validate(&self) -> EnrollResult<()> {
        let mut issues = Vec::new();
        self.collect_issues(&mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(EnrollError::config_rejected(issues))
        }
    }
}

pub(crate) fn check_positive_usize(issues: &mut Vec<String>, value: usize, field: &str) {
    if value == 0 {
        issues.push(format!("{field} must be greater than 0"));
    }
}

pub(crate) fn check_positive_u32(issues: &mut Vec<String>, value: u32, field: &str) {
    if value == 0 {
        issues.push(format!("{field} must be greater than 0"));
    }
}

pub(crate) fn check_open_unit_fraction(issues: &mut Vec<String>, value: f32, field: &str) {
    if !(value > 0.0 && value <= 1.0) {
        issues.push(format!("{field} must be in (0, 1], got {value}"));
    }
}

pub(crate) fn check_unit_range(issues: &mut Vec<String>, value: f32, field: &str) {
    if !(0.0..=1.0).contains(&value) {
        issues.push(format!("{field} must be between 0.0 and 1.0, got {value}"));
    }
}

pub(crate) fn check_dir_exists(issues: &mut Vec<String>, path: &Path, field: &str) {
    if path.as_os_str().is_empty() {
        issues.push(format!("{field} is missing"));
    } else if !path.is_dir() {
        issues.push(format!("{field} is not a directory: {}", path.display()));
    }
}

pub(crate) fn check_file_exists(issues: &mut Vec<String>, path: &Path, field: &str) {
    if path.as_os_str().is_empty() {
        issues.push(format!("{field} is missing"));
    } else if !path.is_file() {
        issues.push(format!("{field} is not a file: {}", path.display()));
    }
}

pub(crate) fn check_nonempty_path(issues: &mut Vec<String>, path: &Path, field: &str) {
    if path.as_os_str().is_empty() {
        issues.push(format!("{field} is missing"));
    }
}
