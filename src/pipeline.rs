//! The enrollment pipeline: index, extract, train, write.
//!
//! Stages run strictly in order as one sequential batch job. There is no
//! partial-success mode: either a complete, internally consistent
//! artifact pair lands on disk, or nothing is written. Callers needing
//! cancellation wrap the whole invocation; concurrent runs targeting the
//! same artifact path must be serialized externally.

use crate::artifact::ArtifactWriter;
use crate::classifier::{ClassifierTrainer, TrainingSet};
use crate::core::batch::{BatchSampler, Tensor2D};
use crate::core::config::{ConfigValidator, PipelineConfig};
use crate::core::errors::{EnrollError, EnrollResult};
use crate::dataset::DatasetIndex;
use crate::extractor::{EmbeddingExtractor, build_extractor};
use ndarray::s;
use std::path::Path;
use std::time::{Duration, Instant};

/// Counts and stage timings for one completed run.
#[derive(Debug, Clone)]
pub struct EnrollmentReport {
    /// Number of identities in the canonical list.
    pub identity_count: usize,
    /// Number of samples embedded and trained on.
    pub sample_count: usize,
    /// Embedding dimensionality of the bound backend.
    pub embedding_dim: usize,
    /// Time spent scanning the dataset.
    pub index_time: Duration,
    /// Time spent extracting embeddings.
    pub extract_time: Duration,
    /// Time spent fitting and calibrating the classifier.
    pub train_time: Duration,
    /// Time spent writing the artifact pair.
    pub write_time: Duration,
}

/// Runs the full pipeline with the backend selected by the configuration.
pub fn enroll(config: &PipelineConfig) -> EnrollResult<EnrollmentReport> {
    config.validate()?;
    let extractor = build_extractor(config)?;
    run_stages(config, extractor.as_ref())
}

/// Runs the full pipeline against a caller-supplied extractor.
///
/// The pipeline itself is backend-agnostic; it touches nothing beyond
/// the [`EmbeddingExtractor`] contract.
pub fn enroll_with_extractor(
    config: &PipelineConfig,
    extractor: &dyn EmbeddingExtractor,
) -> EnrollResult<EnrollmentReport> {
    config.validate()?;
    run_stages(config, extractor)
}

fn run_stages(
    config: &PipelineConfig,
    extractor: &dyn EmbeddingExtractor,
) -> EnrollResult<EnrollmentReport> {
    let started = Instant::now();
    let index = DatasetIndex::scan(&config.dataset_dir)?;
    let index_time = started.elapsed();
    tracing::info!(
        identities = index.identities().len(),
        samples = index.samples().len(),
        "indexed dataset"
    );

    if index.identities().len() < 2 {
        return Err(EnrollError::insufficient_data(format!(
            "need at least 2 identities, dataset has {}",
            index.identities().len()
        )));
    }

    let started = Instant::now();
    let embeddings = extract_all(config, extractor, &index)?;
    let extract_time = started.elapsed();
    tracing::info!(
        rows = embeddings.nrows(),
        dim = embeddings.ncols(),
        elapsed_ms = extract_time.as_millis() as u64,
        "extracted embeddings"
    );

    let ordinals: Vec<usize> = index.samples().iter().map(|s| s.ordinal).collect();
    let training = TrainingSet::new(embeddings, ordinals)?;

    let started = Instant::now();
    let classifier = ClassifierTrainer::new().fit(&training)?;
    let train_time = started.elapsed();

    // The artifact contract hinges on name list index N matching class
    // index N. Verify instead of assuming: the fitted class list must be
    // exactly the dataset's ordinal range, which also catches identities
    // that contributed zero samples.
    let expected: Vec<usize> = (0..index.identities().len()).collect();
    if classifier.classes() != expected.as_slice() {
        return Err(EnrollError::ClassOrderMismatch {
            expected,
            actual: classifier.classes().to_vec(),
        });
    }

    let started = Instant::now();
    let class_names = index.class_names();
    ArtifactWriter::write(
        &classifier,
        &class_names,
        &config.artifact_path,
        &config.listing_path,
    )?;
    let write_time = started.elapsed();

    Ok(EnrollmentReport {
        identity_count: index.identities().len(),
        sample_count: index.samples().len(),
        embedding_dim: extractor.embedding_dim(),
        index_time,
        extract_time,
        train_time,
        write_time,
    })
}

fn extract_all(
    config: &PipelineConfig,
    extractor: &dyn EmbeddingExtractor,
    index: &DatasetIndex,
) -> EnrollResult<Tensor2D> {
    let samples = index.samples();
    let dim = extractor.embedding_dim();
    let mut embeddings = Tensor2D::zeros((samples.len(), dim));

    let sampler = BatchSampler::new(config.batch_size);
    for (offset, batch) in sampler.batches_with_offsets(samples) {
        let paths: Vec<&Path> = batch.iter().map(|s| s.path.as_path()).collect();
        let out = extractor.extract(&paths)?;

        if out.nrows() != batch.len() || out.ncols() != dim {
            return Err(EnrollError::invalid_input(format!(
                "extractor returned {}x{} for a batch of {} (expected width {})",
                out.nrows(),
                out.ncols(),
                batch.len(),
                dim
            )));
        }

        embeddings
            .slice_mut(s![offset..offset + batch.len(), ..])
            .assign(&out);
        tracing::debug!(offset, len = batch.len(), "embedded batch");
    }

    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ClassifierArtifact;
    use crate::core::config::BackendKind;
    use crate::extractor::preprocess::{ImagePreprocessor, l2_normalize_rows};
    use image::RgbImage;
    use ndarray::array;
    use std::path::PathBuf;

    /// Test extractor: decodes images for real, embeds each as its mean
    /// RGB color. Deterministic and batch-size independent, and it
    /// surfaces decode failures exactly like the production backends.
    struct MeanColorExtractor {
        preprocessor: ImagePreprocessor,
    }

    impl MeanColorExtractor {
        fn new() -> Self {
            Self {
                preprocessor: ImagePreprocessor::imagenet(8).unwrap(),
            }
        }
    }

    impl EmbeddingExtractor for MeanColorExtractor {
        fn embedding_dim(&self) -> usize {
            3
        }

        fn extract(&self, batch: &[&Path]) -> EnrollResult<Tensor2D> {
            let images = self.preprocessor.load_batch(batch)?;
            let mut out = Tensor2D::zeros((images.len(), 3));
            for (i, img) in images.iter().enumerate() {
                let mut sums = [0.0f64; 3];
                for pixel in img.pixels() {
                    for c in 0..3 {
                        sums[c] += pixel.0[c] as f64;
                    }
                }
                let count = (img.width() * img.height()) as f64;
                for c in 0..3 {
                    out[[i, c]] = (sums[c] / count) as f32;
                }
            }
            l2_normalize_rows(&mut out);
            Ok(out)
        }
    }

    fn write_image(path: &PathBuf, rgb: [u8; 3]) {
        RgbImage::from_pixel(6, 6, image::Rgb(rgb)).save(path).unwrap();
    }

    /// alice gets reddish images, bob bluish, with slight per-file
    /// variation so the clusters are tight but not degenerate.
    fn build_dataset(root: &Path, alice_count: usize, bob_count: usize) {
        let alice = root.join("alice");
        std::fs::create_dir_all(&alice).unwrap();
        for i in 0..alice_count {
            write_image(&alice.join(format!("{i}.png")), [200 + i as u8, 30, 30]);
        }
        let bob = root.join("bob");
        std::fs::create_dir_all(&bob).unwrap();
        for i in 0..bob_count {
            write_image(&bob.join(format!("{i}.png")), [30, 30, 200 + i as u8]);
        }
    }

    fn test_config(root: &Path, out: &Path) -> PipelineConfig {
        // backend/model fields are unused by enroll_with_extractor but
        // still validated, so point them at something real
        PipelineConfig::new(
            root.join("dataset"),
            out.join("classifier.bin"),
            out.join("classes.txt"),
            BackendKind::Eager,
            root.join("dataset"),
        )
    }

    #[test]
    fn end_to_end_two_identities() {
        let tmp = tempfile::tempdir().unwrap();
        let dataset = tmp.path().join("dataset");
        build_dataset(&dataset, 3, 2);
        let config = test_config(tmp.path(), tmp.path());

        let report = enroll_with_extractor(&config, &MeanColorExtractor::new()).unwrap();
        assert_eq!(report.identity_count, 2);
        assert_eq!(report.sample_count, 5);
        assert_eq!(report.embedding_dim, 3);

        let artifact = ClassifierArtifact::load(&config.artifact_path).unwrap();
        assert_eq!(artifact.class_names, vec!["alice", "bob"]);

        let listing = std::fs::read_to_string(&config.listing_path).unwrap();
        assert_eq!(listing.lines().collect::<Vec<_>>(), vec!["alice", "bob"]);

        // a query near alice's red cluster resolves to class index 0
        let mut query = array![[220.0_f32, 30.0, 30.0]];
        l2_normalize_rows(&mut query);
        let (index, _) = artifact.classifier.predict(query.row(0)).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn batch_size_does_not_change_the_outcome() {
        let tmp = tempfile::tempdir().unwrap();
        let dataset = tmp.path().join("dataset");
        build_dataset(&dataset, 5, 5);

        let out_a = tmp.path().join("a");
        let out_b = tmp.path().join("b");
        std::fs::create_dir_all(&out_a).unwrap();
        std::fs::create_dir_all(&out_b).unwrap();

        let config_a = test_config(tmp.path(), &out_a).with_batch_size(1);
        let config_b = test_config(tmp.path(), &out_b).with_batch_size(5);

        enroll_with_extractor(&config_a, &MeanColorExtractor::new()).unwrap();
        enroll_with_extractor(&config_b, &MeanColorExtractor::new()).unwrap();

        let artifact_a = ClassifierArtifact::load(&config_a.artifact_path).unwrap();
        let artifact_b = ClassifierArtifact::load(&config_b.artifact_path).unwrap();

        let mut query = array![[30.0_f32, 30.0, 210.0]];
        l2_normalize_rows(&mut query);
        let (pred_a, _) = artifact_a.classifier.predict(query.row(0)).unwrap();
        let (pred_b, _) = artifact_b.classifier.predict(query.row(0)).unwrap();
        assert_eq!(pred_a, pred_b);
        assert_eq!(pred_a, 1);
    }

    #[test]
    fn single_identity_fails_and_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dataset = tmp.path().join("dataset");
        build_dataset(&dataset, 3, 0);
        std::fs::remove_dir(dataset.join("bob")).unwrap();
        let config = test_config(tmp.path(), tmp.path());

        let err = enroll_with_extractor(&config, &MeanColorExtractor::new()).unwrap_err();
        assert!(matches!(err, EnrollError::InsufficientData { .. }));
        assert!(!config.artifact_path.exists());
        assert!(!config.listing_path.exists());
    }

    #[test]
    fn corrupt_image_aborts_before_any_artifact_appears() {
        let tmp = tempfile::tempdir().unwrap();
        let dataset = tmp.path().join("dataset");
        build_dataset(&dataset, 3, 2);
        std::fs::write(dataset.join("alice").join("1.png"), b"garbage bytes").unwrap();
        let config = test_config(tmp.path(), tmp.path());

        let err = enroll_with_extractor(&config, &MeanColorExtractor::new()).unwrap_err();
        match err {
            EnrollError::ImageDecode { path, .. } => {
                assert!(path.ends_with(Path::new("alice").join("1.png")));
            }
            other => panic!("expected ImageDecode, got {other:?}"),
        }
        assert!(!config.artifact_path.exists());
        assert!(!config.listing_path.exists());
    }

    #[test]
    fn empty_identity_trips_the_class_order_check() {
        let tmp = tempfile::tempdir().unwrap();
        let dataset = tmp.path().join("dataset");
        build_dataset(&dataset, 3, 2);
        std::fs::create_dir(dataset.join("ann")).unwrap();
        let config = test_config(tmp.path(), tmp.path());

        let err = enroll_with_extractor(&config, &MeanColorExtractor::new()).unwrap_err();
        match err {
            EnrollError::ClassOrderMismatch { expected, actual } => {
                assert_eq!(expected, vec![0, 1, 2]);
                // ann is ordinal 1 and contributed no samples
                assert_eq!(actual, vec![0, 2]);
            }
            other => panic!("expected ClassOrderMismatch, got {other:?}"),
        }
        assert!(!config.artifact_path.exists());
    }

    #[test]
    fn rerun_overwrites_the_previous_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let dataset = tmp.path().join("dataset");
        build_dataset(&dataset, 3, 2);
        let config = test_config(tmp.path(), tmp.path());
        let extractor = MeanColorExtractor::new();

        enroll_with_extractor(&config, &extractor).unwrap();
        let first = std::fs::read(&config.artifact_path).unwrap();

        // add carol and re-run; the artifact gains a class
        let carol = dataset.join("carol");
        std::fs::create_dir(&carol).unwrap();
        write_image(&carol.join("0.png"), [30, 200, 30]);
        write_image(&carol.join("1.png"), [30, 210, 30]);

        enroll_with_extractor(&config, &extractor).unwrap();
        let second = std::fs::read(&config.artifact_path).unwrap();
        assert_ne!(first, second);

        let artifact = ClassifierArtifact::load(&config.artifact_path).unwrap();
        assert_eq!(artifact.class_names, vec!["alice", "bob", "carol"]);
    }
}
