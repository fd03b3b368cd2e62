//! Eager embedding backend on candle.
//!
//! Loads a pretrained convolutional embedding network from a model
//! directory (`config.json` describing the module graph, weights in
//! `model.safetensors`) and runs batched forward passes directly on the
//! bound device. The device context lives exactly as long as the
//! extractor, so repeated runs never leak accelerator memory.

use crate::core::batch::{Tensor2D, Tensor4D};
use crate::core::errors::{EnrollError, EnrollResult, ProcessingStage};
use crate::extractor::EmbeddingExtractor;
use crate::extractor::preprocess::{ImagePreprocessor, l2_normalize_rows};
use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, Linear, Module, VarBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Network description stored as `config.json` beside the weights.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EagerNetConfig {
    /// Output embedding dimensionality.
    pub embedding_dim: usize,
    /// Square input size the network was trained on.
    pub image_size: u32,
    /// Output channels of each strided convolution block.
    pub channels: Vec<usize>,
}

struct EmbeddingNet {
    blocks: Vec<Conv2d>,
    head: Linear,
}

impl EmbeddingNet {
    fn load(cfg: &EagerNetConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let conv_cfg = Conv2dConfig {
            stride: 2,
            padding: 1,
            ..Default::default()
        };
        let mut blocks = Vec::with_capacity(cfg.channels.len());
        let mut in_channels = 3;
        for (i, &out_channels) in cfg.channels.iter().enumerate() {
            let conv = candle_nn::conv2d(
                in_channels,
                out_channels,
                3,
                conv_cfg,
                vb.pp(format!("features.{i}")),
            )?;
            blocks.push(conv);
            in_channels = out_channels;
        }
        let head = candle_nn::linear(in_channels, cfg.embedding_dim, vb.pp("embed"))?;
        Ok(Self { blocks, head })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut xs = xs.clone();
        for block in &self.blocks {
            xs = block.forward(&xs)?.relu()?;
        }
        // global average pool over the spatial dims, then project
        let pooled = xs.mean(D::Minus1)?.mean(D::Minus1)?;
        self.head.forward(&pooled)
    }
}

/// Embedding extractor backed by an eagerly executed candle module.
pub struct EagerExtractor {
    device: Device,
    net: EmbeddingNet,
    preprocessor: ImagePreprocessor,
    embedding_dim: usize,
    model_dir: PathBuf,
}

impl std::fmt::Debug for EagerExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EagerExtractor")
            .field("model_dir", &self.model_dir)
            .field("embedding_dim", &self.embedding_dim)
            .field("device", &self.device)
            .finish()
    }
}

impl EagerExtractor {
    /// Loads the network from a model directory onto the default device.
    pub fn from_dir(model_dir: impl AsRef<Path>, image_size: u32) -> EnrollResult<Self> {
        Self::from_dir_on(model_dir, image_size, default_device())
    }

    /// Loads the network from a model directory onto the given device.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollError::ModelLoad`] when `config.json` or
    /// `model.safetensors` is missing or incompatible with the declared
    /// module graph.
    pub fn from_dir_on(
        model_dir: impl AsRef<Path>,
        image_size: u32,
        device: Device,
    ) -> EnrollResult<Self> {
        let model_dir = model_dir.as_ref();
        let config_path = model_dir.join("config.json");
        let weights_path = model_dir.join("model.safetensors");

        let raw = std::fs::read_to_string(&config_path).map_err(|e| {
            EnrollError::model_load(&config_path, "missing network config", Some(e))
        })?;
        let net_cfg: EagerNetConfig = serde_json::from_str(&raw).map_err(|e| {
            EnrollError::model_load(&config_path, "malformed network config", Some(e))
        })?;
        if net_cfg.channels.is_empty() {
            return Err(EnrollError::model_load(
                &config_path,
                "network config declares zero convolution blocks",
                None::<std::io::Error>,
            ));
        }
        if net_cfg.image_size != image_size {
            tracing::warn!(
                trained = net_cfg.image_size,
                configured = image_size,
                "input size differs from the size the network was trained on"
            );
        }

        if !weights_path.is_file() {
            return Err(EnrollError::model_load(
                &weights_path,
                "weights file does not exist",
                None::<std::io::Error>,
            ));
        }
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.clone()], DType::F32, &device)
        }
        .map_err(|e| EnrollError::model_load(&weights_path, "failed to map weights", Some(e)))?;

        let net = EmbeddingNet::load(&net_cfg, vb).map_err(|e| {
            EnrollError::model_load(
                &weights_path,
                "weights incompatible with declared module graph",
                Some(e),
            )
        })?;

        tracing::debug!(
            model = %model_dir.display(),
            embedding_dim = net_cfg.embedding_dim,
            blocks = net_cfg.channels.len(),
            "loaded eager embedding network"
        );

        Ok(Self {
            device,
            net,
            preprocessor: ImagePreprocessor::imagenet(image_size)?,
            embedding_dim: net_cfg.embedding_dim,
            model_dir: model_dir.to_path_buf(),
        })
    }

    fn run_batch(&self, batch: &Tensor4D) -> EnrollResult<Tensor2D> {
        let rows = batch.shape()[0];
        let shape = (
            batch.shape()[0],
            batch.shape()[1],
            batch.shape()[2],
            batch.shape()[3],
        );
        let data = batch.as_slice().ok_or_else(|| {
            EnrollError::invalid_input("batch tensor is not contiguous in memory")
        })?;

        let input = Tensor::from_vec(data.to_vec(), shape, &self.device)
            .map_err(|e| infer_err("failed to stage batch on device", e))?;
        let output = self
            .net
            .forward(&input)
            .map_err(|e| infer_err("forward pass failed", e))?;
        let values = output
            .to_vec2::<f32>()
            .map_err(|e| infer_err("failed to read embeddings back", e))?;

        if values.len() != rows || values.iter().any(|row| row.len() != self.embedding_dim) {
            return Err(EnrollError::invalid_input(format!(
                "network produced {} rows, expected {} of width {}",
                values.len(),
                rows,
                self.embedding_dim
            )));
        }

        let flat: Vec<f32> = values.into_iter().flatten().collect();
        let mut embeddings = Tensor2D::from_shape_vec((rows, self.embedding_dim), flat)?;
        l2_normalize_rows(&mut embeddings);
        Ok(embeddings)
    }
}

impl EmbeddingExtractor for EagerExtractor {
    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn extract(&self, batch: &[&Path]) -> EnrollResult<Tensor2D> {
        if batch.is_empty() {
            return Ok(Tensor2D::zeros((0, self.embedding_dim)));
        }
        let images = self.preprocessor.load_batch(batch)?;
        let tensor = self.preprocessor.to_batch(&images)?;
        self.run_batch(&tensor)
    }
}

fn infer_err(context: &str, e: candle_core::Error) -> EnrollError {
    EnrollError::processing(ProcessingStage::Inference, context, e)
}

fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
        tracing::warn!("no usable CUDA device, falling back to CPU");
    }
    Device::Cpu
}
