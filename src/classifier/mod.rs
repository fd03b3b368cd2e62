//! Multi-class identity classification over embeddings.
//!
//! One probability-calibrated binary machine per identity, combined
//! one-vs-rest. The classifier's internal class order is the sorted set
//! of distinct ordinals seen at fit time; callers verify that order
//! against the dataset's identity assignment before persisting anything.

pub mod platt;
pub mod svc;

pub use platt::PlattScaling;
pub use svc::{BinarySvc, Kernel, SvcParams};

use crate::core::batch::Tensor2D;
use crate::core::errors::{EnrollError, EnrollResult};
use ndarray::ArrayView1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// The full set of (embedding, ordinal) pairs for one training run.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    embeddings: Tensor2D,
    ordinals: Vec<usize>,
}

impl TrainingSet {
    /// Pairs an embedding matrix with per-row identity ordinals.
    pub fn new(embeddings: Tensor2D, ordinals: Vec<usize>) -> EnrollResult<Self> {
        if embeddings.nrows() != ordinals.len() {
            return Err(EnrollError::invalid_input(format!(
                "{} embedding rows but {} ordinals",
                embeddings.nrows(),
                ordinals.len()
            )));
        }
        Ok(Self {
            embeddings,
            ordinals,
        })
    }

    /// Number of training samples.
    pub fn len(&self) -> usize {
        self.ordinals.len()
    }

    /// Whether the set holds no samples.
    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }

    /// Embedding dimensionality.
    pub fn embedding_dim(&self) -> usize {
        self.embeddings.ncols()
    }

    /// Sorted distinct ordinals present in the set.
    pub fn distinct_ordinals(&self) -> Vec<usize> {
        let mut ordinals = self.ordinals.clone();
        ordinals.sort_unstable();
        ordinals.dedup();
        ordinals
    }

    /// The embedding matrix, one row per sample.
    pub fn embeddings(&self) -> &Tensor2D {
        &self.embeddings
    }

    /// Per-row ordinals, aligned with the embedding rows.
    pub fn ordinals(&self) -> &[usize] {
        &self.ordinals
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalibratedSvc {
    svc: BinarySvc,
    platt: PlattScaling,
}

/// A fitted, probability-calibrated one-vs-rest identity classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClassifier {
    classes: Vec<usize>,
    machines: Vec<CalibratedSvc>,
    embedding_dim: usize,
}

impl IdentityClassifier {
    /// Class ordinals in internal index order.
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Number of classes.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Embedding dimensionality the classifier was fitted on.
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Per-class probabilities for one query embedding, in internal
    /// class index order. The values sum to 1.
    pub fn predict_proba(&self, embedding: ArrayView1<'_, f32>) -> EnrollResult<Vec<f32>> {
        if embedding.len() != self.embedding_dim {
            return Err(EnrollError::invalid_input(format!(
                "query embedding has {} dimensions, classifier expects {}",
                embedding.len(),
                self.embedding_dim
            )));
        }
        let query = embedding.to_vec();

        let mut probs: Vec<f32> = self
            .machines
            .iter()
            .map(|m| m.platt.probability(m.svc.decision(&query)))
            .collect();

        let total: f32 = probs.iter().sum();
        if total > f32::EPSILON {
            for p in &mut probs {
                *p /= total;
            }
        } else {
            let uniform = 1.0 / probs.len() as f32;
            probs.fill(uniform);
        }
        Ok(probs)
    }

    /// Most probable class index and its probability.
    pub fn predict(&self, embedding: ArrayView1<'_, f32>) -> EnrollResult<(usize, f32)> {
        let probs = self.predict_proba(embedding)?;
        let (index, &prob) = probs
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .ok_or_else(|| EnrollError::invalid_input("classifier holds zero classes"))?;
        Ok((index, prob))
    }
}

/// Fits [`IdentityClassifier`]s from training sets.
#[derive(Debug, Clone, Default)]
pub struct ClassifierTrainer {
    params: SvcParams,
}

impl ClassifierTrainer {
    /// Creates a trainer with the standard parameters: linear kernel,
    /// regularization fixed at `C = 1`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the SVC hyperparameters.
    pub fn with_params(params: SvcParams) -> Self {
        Self { params }
    }

    /// Fits a calibrated one-vs-rest classifier.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollError::InsufficientData`] before any fitting when
    /// the set is empty or holds fewer than two distinct identities. A
    /// classifier cannot be calibrated on a single class.
    pub fn fit(&self, training: &TrainingSet) -> EnrollResult<IdentityClassifier> {
        if training.is_empty() {
            return Err(EnrollError::insufficient_data("training set holds no samples"));
        }
        let classes = training.distinct_ordinals();
        if classes.len() < 2 {
            return Err(EnrollError::insufficient_data(format!(
                "need at least 2 distinct identities, got {}",
                classes.len()
            )));
        }

        tracing::debug!(
            samples = training.len(),
            classes = classes.len(),
            dim = training.embedding_dim(),
            "fitting one-vs-rest classifier"
        );

        let x = training.embeddings().view();
        let machines: Vec<CalibratedSvc> = classes
            .par_iter()
            .map(|&class| {
                let labels: Vec<f32> = training
                    .ordinals()
                    .iter()
                    .map(|&o| if o == class { 1.0 } else { -1.0 })
                    .collect();
                let svc = BinarySvc::fit(x, &labels, &self.params);

                let scores: Vec<f32> = (0..training.len())
                    .map(|i| svc.decision(&x.row(i).to_vec()))
                    .collect();
                let bool_labels: Vec<bool> = labels.iter().map(|&l| l > 0.0).collect();
                let platt = PlattScaling::fit(&scores, &bool_labels);

                CalibratedSvc { svc, platt }
            })
            .collect();

        Ok(IdentityClassifier {
            classes,
            machines,
            embedding_dim: training.embedding_dim(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    fn clustered_training_set() -> TrainingSet {
        // three tight clusters along distinct axes
        let embeddings = array![
            [1.0_f32, 0.0, 0.0],
            [0.9, 0.1, 0.0],
            [1.1, -0.1, 0.0],
            [0.0, 1.0, 0.0],
            [0.1, 0.9, 0.0],
            [-0.1, 1.1, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.1, 0.9],
        ];
        let ordinals = vec![0, 0, 0, 1, 1, 1, 2, 2];
        TrainingSet::new(embeddings, ordinals).unwrap()
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let result = TrainingSet::new(Array2::zeros((3, 4)), vec![0, 1]);
        assert!(result.is_err());
    }

    #[test]
    fn empty_training_set_is_insufficient() {
        let training = TrainingSet::new(Array2::zeros((0, 4)), vec![]).unwrap();
        let err = ClassifierTrainer::new().fit(&training).unwrap_err();
        assert!(matches!(err, EnrollError::InsufficientData { .. }));
    }

    #[test]
    fn single_identity_is_insufficient() {
        let training =
            TrainingSet::new(array![[1.0_f32, 0.0], [0.9, 0.1]], vec![0, 0]).unwrap();
        let err = ClassifierTrainer::new().fit(&training).unwrap_err();
        assert!(matches!(err, EnrollError::InsufficientData { .. }));
    }

    #[test]
    fn classes_are_sorted_distinct_ordinals() {
        let training = TrainingSet::new(
            array![[1.0_f32, 0.0], [0.0, 1.0], [1.1, 0.0], [0.0, 0.9]],
            vec![3, 1, 3, 1],
        )
        .unwrap();
        let classifier = ClassifierTrainer::new().fit(&training).unwrap();
        assert_eq!(classifier.classes(), &[1, 3]);
    }

    #[test]
    fn probabilities_sum_to_one_and_pick_the_right_cluster() {
        let training = clustered_training_set();
        let classifier = ClassifierTrainer::new().fit(&training).unwrap();

        let query = array![0.95_f32, 0.05, 0.0];
        let probs = classifier.predict_proba(query.view()).unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);

        let (index, prob) = classifier.predict(query.view()).unwrap();
        assert_eq!(index, 0);
        assert!(prob >= probs[1] && prob >= probs[2]);
    }

    #[test]
    fn query_dimension_is_checked() {
        let classifier = ClassifierTrainer::new()
            .fit(&clustered_training_set())
            .unwrap();
        let query = array![1.0_f32, 0.0];
        assert!(classifier.predict_proba(query.view()).is_err());
    }

    #[test]
    fn refitting_gives_identical_predictions() {
        let training = clustered_training_set();
        let trainer = ClassifierTrainer::new();
        let a = trainer.fit(&training).unwrap();
        let b = trainer.fit(&training).unwrap();

        let query = array![0.0_f32, 0.9, 0.1];
        assert_eq!(
            a.predict_proba(query.view()).unwrap(),
            b.predict_proba(query.view()).unwrap()
        );
    }
}
