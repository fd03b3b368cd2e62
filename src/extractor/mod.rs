//! Backend-polymorphic embedding extraction.
//!
//! The pipeline depends only on the [`EmbeddingExtractor`] trait. Two
//! interchangeable backends implement it: a frozen-graph extractor on
//! ONNX Runtime and an eager extractor on candle. Callers select the
//! variant through [`PipelineConfig::backend`]; mixing backends within a
//! single run is not possible because the extractor is bound once.
//!
//! [`PipelineConfig::backend`]: crate::core::config::PipelineConfig

pub mod eager;
pub mod graph;
pub mod preprocess;

pub use eager::{EagerExtractor, EagerNetConfig};
pub use graph::{GraphExtractor, GraphExtractorConfig};
pub use preprocess::ImagePreprocessor;

use crate::core::batch::Tensor2D;
use crate::core::config::{BackendKind, PipelineConfig};
use crate::core::errors::EnrollResult;
use std::path::Path;

/// Capability contract shared by every embedding backend.
///
/// `extract` returns one embedding row per input path, in input order,
/// all of the dimensionality reported by `embedding_dim`. A single
/// undecodable image fails the whole call with an error naming the
/// offending path; partial-batch recovery is the caller's concern.
pub trait EmbeddingExtractor {
    /// Fixed output dimensionality of this backend.
    fn embedding_dim(&self) -> usize;

    /// Embeds a batch of images.
    fn extract(&self, batch: &[&Path]) -> EnrollResult<Tensor2D>;
}

/// Builds the extractor selected by the configuration.
pub fn build_extractor(config: &PipelineConfig) -> EnrollResult<Box<dyn EmbeddingExtractor>> {
    match config.backend {
        BackendKind::Graph => {
            let mut graph_config =
                GraphExtractorConfig::new(&config.model_path, config.image_size);
            graph_config.gpu_memory_fraction = config.gpu_memory_fraction;
            Ok(Box::new(GraphExtractor::new(&graph_config)?))
        }
        BackendKind::Eager => Ok(Box::new(EagerExtractor::from_dir(
            &config.model_path,
            config.image_size,
        )?)),
    }
}
