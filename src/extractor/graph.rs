//! Frozen-graph embedding backend on ONNX Runtime.
//!
//! Loads a frozen computation graph once at construction and runs batched
//! forward passes through a session held behind a mutex. Accelerator
//! memory is bounded up front through the execution-provider
//! configuration; nothing is negotiated at run time. Construction ends
//! with a probe forward pass, so incompatible weights fail fast instead
//! of surfacing mid-extraction.

use crate::core::batch::{Tensor2D, Tensor4D};
use crate::core::errors::{EnrollError, EnrollResult};
use crate::extractor::EmbeddingExtractor;
use crate::extractor::preprocess::{ImagePreprocessor, l2_normalize_rows};
use ort::logging::LogLevel;
use ort::session::{Session, SessionInputs};
use ort::value::TensorRef;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Assumed device memory pool when translating the configured fraction
/// into the absolute byte cap the CUDA provider expects.
const DEFAULT_DEVICE_MEMORY_BYTES: u64 = 8 * 1024 * 1024 * 1024;

/// Construction parameters for [`GraphExtractor`].
#[derive(Debug, Clone)]
pub struct GraphExtractorConfig {
    /// Path to the frozen ONNX graph.
    pub model_path: PathBuf,
    /// Square input size fed to the graph.
    pub image_size: u32,
    /// Fraction of accelerator memory the session may claim, in (0, 1].
    pub gpu_memory_fraction: f32,
    /// Total device memory the fraction is applied against. Defaults to
    /// 8 GiB when unset.
    pub device_memory_bytes: Option<u64>,
    /// Threads for intra-op parallelism. Runtime default when unset.
    pub intra_threads: Option<usize>,
}

impl GraphExtractorConfig {
    /// Creates a configuration with default resource limits.
    pub fn new(model_path: impl Into<PathBuf>, image_size: u32) -> Self {
        Self {
            model_path: model_path.into(),
            image_size,
            gpu_memory_fraction: 1.0,
            device_memory_bytes: None,
            intra_threads: None,
        }
    }

    /// Absolute accelerator memory cap derived from the fraction.
    pub fn memory_limit_bytes(&self) -> u64 {
        let total = self
            .device_memory_bytes
            .unwrap_or(DEFAULT_DEVICE_MEMORY_BYTES);
        (self.gpu_memory_fraction.clamp(0.0, 1.0) as f64 * total as f64) as u64
    }
}

/// Embedding extractor backed by a frozen ONNX graph.
pub struct GraphExtractor {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    embedding_dim: usize,
    preprocessor: ImagePreprocessor,
    model_path: PathBuf,
}

impl std::fmt::Debug for GraphExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphExtractor")
            .field("model_path", &self.model_path)
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("embedding_dim", &self.embedding_dim)
            .finish()
    }
}

impl GraphExtractor {
    /// Loads the frozen graph, binds input and output names, and probes
    /// the embedding dimensionality with one dummy forward pass.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollError::ModelLoad`] when the graph file is missing,
    /// cannot be parsed, or rejects the probe input.
    pub fn new(config: &GraphExtractorConfig) -> EnrollResult<Self> {
        let path = config.model_path.as_path();
        if !path.is_file() {
            return Err(EnrollError::model_load(
                path,
                "model file does not exist",
                None::<std::io::Error>,
            ));
        }

        let mut builder = Session::builder()?.with_log_level(LogLevel::Error)?;
        if let Some(intra) = config.intra_threads {
            builder = builder.with_intra_threads(intra)?;
        }

        #[cfg(feature = "cuda")]
        {
            let provider = ort::execution_providers::CUDAExecutionProvider::default()
                .with_memory_limit(config.memory_limit_bytes() as usize);
            builder = builder.with_execution_providers([provider.build()])?;
        }

        let session = builder.commit_from_file(path).map_err(|e| {
            EnrollError::model_load(path, "failed to create ONNX session", Some(e))
        })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.to_string())
            .ok_or_else(|| {
                EnrollError::model_load(path, "graph declares no inputs", None::<std::io::Error>)
            })?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.to_string())
            .ok_or_else(|| {
                EnrollError::model_load(path, "graph declares no outputs", None::<std::io::Error>)
            })?;

        let mut extractor = Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            embedding_dim: 0,
            preprocessor: ImagePreprocessor::imagenet(config.image_size)?,
            model_path: path.to_path_buf(),
        };

        // Probe with a single zero image; this pins the embedding width
        // and surfaces weight/runtime incompatibilities at bind time.
        let side = config.image_size as usize;
        let probe = Tensor4D::zeros((1, 3, side, side));
        let out = extractor.forward(&probe).map_err(|e| {
            EnrollError::model_load(path, "probe forward pass rejected", Some(e))
        })?;
        extractor.embedding_dim = out.ncols();

        tracing::debug!(
            model = %path.display(),
            input = %extractor.input_name,
            output = %extractor.output_name,
            embedding_dim = extractor.embedding_dim,
            "bound frozen embedding graph"
        );

        Ok(extractor)
    }

    fn forward(&self, batch: &Tensor4D) -> EnrollResult<Tensor2D> {
        let rows = batch.shape()[0];
        let dims: Vec<i64> = batch.shape().iter().map(|&d| d as i64).collect();
        let data = batch.as_slice().ok_or_else(|| {
            EnrollError::invalid_input("batch tensor is not contiguous in memory")
        })?;
        let tensor_ref = TensorRef::from_array_view((dims, data))?;

        let mut session = self.session.lock().map_err(|_| {
            EnrollError::invalid_input(format!(
                "session lock poisoned for {}",
                self.model_path.display()
            ))
        })?;

        let inputs: SessionInputs<'_, '_, 0> = SessionInputs::ValueMap(vec![(
            Cow::Borrowed(self.input_name.as_str()),
            tensor_ref.into(),
        )]);
        let outputs = session.run(inputs)?;

        let (shape, data) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        if shape.len() != 2 || shape[0] != rows {
            return Err(EnrollError::invalid_input(format!(
                "graph produced shape {shape:?} for a batch of {rows}"
            )));
        }

        let mut embeddings = Tensor2D::from_shape_vec((shape[0], shape[1]), data.to_vec())?;
        l2_normalize_rows(&mut embeddings);
        Ok(embeddings)
    }
}

impl EmbeddingExtractor for GraphExtractor {
    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn extract(&self, batch: &[&Path]) -> EnrollResult<Tensor2D> {
        if batch.is_empty() {
            return Ok(Tensor2D::zeros((0, self.embedding_dim)));
        }
        let images = self.preprocessor.load_batch(batch)?;
        let tensor = self.preprocessor.to_batch(&images)?;
        let embeddings = self.forward(&tensor)?;
        if embeddings.ncols() != self.embedding_dim {
            return Err(EnrollError::invalid_input(format!(
                "graph produced width {}, bound width is {}",
                embeddings.ncols(),
                self.embedding_dim
            )));
        }
        Ok(embeddings)
    }
}
