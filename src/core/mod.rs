//! Core building blocks of the enrollment pipeline.
//!
//! This module contains the fundamental pieces shared by every stage:
//! - Error handling
//! - Configuration and validation
//! - Batch partitioning and tensor aliases

pub mod batch;
pub mod config;
pub mod errors;

pub use batch::{BatchSampler, Tensor2D, Tensor4D};
pub use config::{BackendKind, ConfigValidator, PipelineConfig};
pub use errors::{EnrollError, EnrollResult, ProcessingStage};

/// Initializes the tracing subscriber for logging.
///
/// Sets up the tracing subscriber with environment filter and formatting
/// layer. Typically called once at the start of an application.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
