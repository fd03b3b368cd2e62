//! Artifact persistence and the runtime-consumer interface.
//!
//! A training run produces exactly two files: a binary artifact holding
//! the fitted classifier together with its ordered class names, and a
//! plain-text listing of the same names for human inspection. The two are
//! written as a pair: both are staged fully in temporaries beside their
//! destinations before the first rename, so a failure leaves no partial
//! file at either destination and never corrupts a previous artifact.
//!
//! Index alignment is load-bearing: entry N of the name list corresponds
//! to the classifier's internal class index N. Runtime consumers must map
//! predictions through the embedded name list, never through the text
//! listing.

use crate::classifier::IdentityClassifier;
use crate::core::errors::{EnrollError, EnrollResult};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const ARTIFACT_MAGIC: u32 = 0x5452_4944; // "TRID"
const ARTIFACT_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
struct ArtifactPayload {
    magic: u32,
    version: u16,
    classifier: IdentityClassifier,
    class_names: Vec<String>,
}

/// A loaded classifier artifact: fitted state plus ordered class names.
#[derive(Debug, Clone)]
pub struct ClassifierArtifact {
    /// The fitted classifier.
    pub classifier: IdentityClassifier,
    /// Identity names, entry N aligned with class index N.
    pub class_names: Vec<String>,
}

impl ClassifierArtifact {
    /// Loads an artifact written by [`ArtifactWriter::write`].
    ///
    /// Both logical fields are deserialized together; magic and version
    /// are verified before anything else is trusted.
    pub fn load(path: &Path) -> EnrollResult<Self> {
        let file = File::open(path)
            .map_err(|e| EnrollError::artifact_read(path, format!("cannot open: {e}")))?;
        let payload: ArtifactPayload = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| EnrollError::artifact_read(path, format!("malformed payload: {e}")))?;

        if payload.magic != ARTIFACT_MAGIC {
            return Err(EnrollError::artifact_read(path, "not a classifier artifact"));
        }
        if payload.version != ARTIFACT_VERSION {
            return Err(EnrollError::artifact_read(
                path,
                format!(
                    "unsupported format version {} (expected {})",
                    payload.version, ARTIFACT_VERSION
                ),
            ));
        }
        if payload.class_names.len() != payload.classifier.class_count() {
            return Err(EnrollError::artifact_read(
                path,
                format!(
                    "{} names but {} classifier classes",
                    payload.class_names.len(),
                    payload.classifier.class_count()
                ),
            ));
        }

        Ok(Self {
            classifier: payload.classifier,
            class_names: payload.class_names,
        })
    }

    /// Predicts the identity name for a query embedding.
    ///
    /// Returns `None` when the winning probability falls below
    /// `min_confidence`.
    pub fn predict(
        &self,
        embedding: ArrayView1<'_, f32>,
        min_confidence: f32,
    ) -> EnrollResult<Option<(&str, f32)>> {
        let (index, prob) = self.classifier.predict(embedding)?;
        if prob < min_confidence {
            return Ok(None);
        }
        Ok(Some((self.class_names[index].as_str(), prob)))
    }
}

/// Writes the artifact pair with tmp-then-rename semantics.
#[derive(Debug, Default)]
pub struct ArtifactWriter;

impl ArtifactWriter {
    /// Persists the classifier and its class names to `artifact_path`,
    /// and the same names to `listing_path`.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollError::ArtifactWrite`] on any I/O failure,
    /// including unwritable destination directories. Temporaries are
    /// removed on failure; destinations keep whatever they held before.
    pub fn write(
        classifier: &IdentityClassifier,
        class_names: &[String],
        artifact_path: &Path,
        listing_path: &Path,
    ) -> EnrollResult<()> {
        if class_names.len() != classifier.class_count() {
            return Err(EnrollError::invalid_input(format!(
                "{} names but {} classifier classes",
                class_names.len(),
                classifier.class_count()
            )));
        }

        let artifact_tmp = staging_path(artifact_path)?;
        let listing_tmp = staging_path(listing_path)?;

        let result = Self::stage_and_commit(
            classifier,
            class_names,
            artifact_path,
            &artifact_tmp,
            listing_path,
            &listing_tmp,
        );
        if result.is_err() {
            let _ = std::fs::remove_file(&artifact_tmp);
            let _ = std::fs::remove_file(&listing_tmp);
        }
        result
    }

    fn stage_and_commit(
        classifier: &IdentityClassifier,
        class_names: &[String],
        artifact_path: &Path,
        artifact_tmp: &Path,
        listing_path: &Path,
        listing_tmp: &Path,
    ) -> EnrollResult<()> {
        let payload = ArtifactPayload {
            magic: ARTIFACT_MAGIC,
            version: ARTIFACT_VERSION,
            classifier: classifier.clone(),
            class_names: class_names.to_vec(),
        };

        let file = File::create(artifact_tmp)
            .map_err(|e| EnrollError::artifact_write(artifact_path, e))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &payload)
            .map_err(|e| EnrollError::artifact_write(artifact_path, e))?;
        writer
            .flush()
            .map_err(|e| EnrollError::artifact_write(artifact_path, e))?;
        writer
            .into_inner()
            .map_err(|e| EnrollError::artifact_write(artifact_path, e.into_error()))?
            .sync_all()
            .map_err(|e| EnrollError::artifact_write(artifact_path, e))?;

        let listing = render_listing(class_names);
        let file =
            File::create(listing_tmp).map_err(|e| EnrollError::artifact_write(listing_path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(listing.as_bytes())
            .map_err(|e| EnrollError::artifact_write(listing_path, e))?;
        writer
            .flush()
            .map_err(|e| EnrollError::artifact_write(listing_path, e))?;
        writer
            .into_inner()
            .map_err(|e| EnrollError::artifact_write(listing_path, e.into_error()))?
            .sync_all()
            .map_err(|e| EnrollError::artifact_write(listing_path, e))?;

        // Both files are complete on disk; the renames below are atomic,
        // so neither destination can ever hold a partial file.
        std::fs::rename(artifact_tmp, artifact_path)
            .map_err(|e| EnrollError::artifact_write(artifact_path, e))?;
        std::fs::rename(listing_tmp, listing_path)
            .map_err(|e| EnrollError::artifact_write(listing_path, e))?;

        tracing::info!(
            artifact = %artifact_path.display(),
            listing = %listing_path.display(),
            classes = class_names.len(),
            "wrote classifier artifact pair"
        );
        Ok(())
    }
}

/// Renders the class name listing: one name per line with a trailing
/// newline per entry, underscores shown as spaces. Presentation only;
/// the artifact keeps the raw names.
fn render_listing(class_names: &[String]) -> String {
    let mut out = String::new();
    for name in class_names {
        out.push_str(&name.replace('_', " "));
        out.push('\n');
    }
    out
}

fn staging_path(destination: &Path) -> EnrollResult<PathBuf> {
    let file_name = destination.file_name().ok_or_else(|| {
        EnrollError::invalid_input(format!(
            "destination has no file name: {}",
            destination.display()
        ))
    })?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    Ok(destination.with_file_name(tmp_name))
}
