//! Dataset discovery and label-path pairing.
//!
//! The dataset root holds one sub-directory per identity with image files
//! directly inside. Nothing deeper is recognized. Identity ordinals are
//! assigned in lexicographic directory order so the artifact's class
//! ordering is predictable from the raw directory structure alone, and
//! they stay fixed for the lifetime of an artifact.

use crate::core::errors::{EnrollError, EnrollResult};
use std::path::{Path, PathBuf};

/// File extensions accepted as dataset images (compared case-insensitively).
const IMAGE_EXTENSIONS: [&str; 6] = ["bmp", "jpeg", "jpg", "png", "tif", "webp"];

/// One distinct person to recognize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Raw label, taken from the sub-directory name.
    pub name: String,
    /// Stable position in the canonical identity list.
    pub ordinal: usize,
}

/// One labeled image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Path to the image file.
    pub path: PathBuf,
    /// Ordinal of the identity this image belongs to.
    pub ordinal: usize,
}

/// Ordered view of a dataset root: the canonical identity list plus one
/// sample per image file, samples nested inside identity order.
#[derive(Debug, Clone)]
pub struct DatasetIndex {
    identities: Vec<Identity>,
    samples: Vec<Sample>,
}

impl DatasetIndex {
    /// Scans a dataset root.
    ///
    /// Non-image files are skipped. An empty identity sub-directory still
    /// occupies its ordinal slot so downstream class ordering never shifts
    /// around gaps.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollError::DatasetNotFound`] when the root does not
    /// exist, is not a directory, or contains zero sub-directories.
    pub fn scan(root: &Path) -> EnrollResult<Self> {
        if !root.is_dir() {
            return Err(EnrollError::dataset_not_found(
                root,
                "does not exist or is not a directory",
            ));
        }

        let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        if dirs.is_empty() {
            return Err(EnrollError::dataset_not_found(
                root,
                "contains zero identity sub-directories",
            ));
        }

        let mut identities = Vec::with_capacity(dirs.len());
        let mut samples = Vec::new();

        for (ordinal, dir) in dirs.iter().enumerate() {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && has_image_extension(path))
                .collect();
            files.sort();

            if files.is_empty() {
                tracing::warn!(identity = %name, ordinal, "identity has no images");
            }

            identities.push(Identity { name, ordinal });
            samples.extend(files.into_iter().map(|path| Sample { path, ordinal }));
        }

        Ok(Self {
            identities,
            samples,
        })
    }

    /// The canonical ordered identity list.
    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// All samples, in identity order then file order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Identity names in ordinal order.
    pub fn class_names(&self) -> Vec<String> {
        self.identities.iter().map(|i| i.name.clone()).collect()
    }

    /// Number of samples per ordinal, in ordinal order.
    pub fn sample_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.identities.len()];
        for sample in &self.samples {
            counts[sample.ordinal] += 1;
        }
        counts
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lowered = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.iter().any(|known| *known == lowered)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"x").unwrap();
    }

    fn build_root(layout: &[(&str, &[&str])]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for (identity, files) in layout {
            let dir = tmp.path().join(identity);
            std::fs::create_dir(&dir).unwrap();
            for file in *files {
                touch(&dir.join(file));
            }
        }
        tmp
    }

    #[test]
    fn identities_follow_directory_order() {
        let tmp = build_root(&[
            ("carol", &["1.jpg"]),
            ("alice", &["1.jpg", "2.png"]),
            ("bob", &["1.jpg"]),
        ]);
        let index = DatasetIndex::scan(tmp.path()).unwrap();

        let names = index.class_names();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
        assert_eq!(index.identities()[0].ordinal, 0);
        assert_eq!(index.identities()[2].ordinal, 2);
        assert!(index.samples().iter().all(|s| s.ordinal < 3));
    }

    #[test]
    fn samples_nest_inside_identity_order() {
        let tmp = build_root(&[("alice", &["b.jpg", "a.jpg"]), ("bob", &["z.jpg"])]);
        let index = DatasetIndex::scan(tmp.path()).unwrap();

        let paths: Vec<String> = index
            .samples()
            .iter()
            .map(|s| {
                s.path
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(paths, vec!["a.jpg", "b.jpg", "z.jpg"]);
        assert_eq!(index.sample_counts(), vec![2, 1]);
    }

    #[test]
    fn non_image_files_are_skipped() {
        let tmp = build_root(&[("alice", &["1.jpg", "notes.txt", "meta.json"])]);
        let index = DatasetIndex::scan(tmp.path()).unwrap();
        assert_eq!(index.samples().len(), 1);
    }

    #[test]
    fn empty_identity_keeps_its_ordinal_slot() {
        let tmp = build_root(&[("alice", &["1.jpg"]), ("bob", &[]), ("carol", &["1.jpg"])]);
        let index = DatasetIndex::scan(tmp.path()).unwrap();

        assert_eq!(index.class_names(), vec!["alice", "bob", "carol"]);
        assert_eq!(index.sample_counts(), vec![1, 0, 1]);
        // carol keeps ordinal 2 even though bob contributed nothing
        assert_eq!(index.samples().last().unwrap().ordinal, 2);
    }

    #[test]
    fn missing_root_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = DatasetIndex::scan(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, EnrollError::DatasetNotFound { .. }));
    }

    #[test]
    fn root_without_subdirectories_fails() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("stray.jpg"));
        let err = DatasetIndex::scan(tmp.path()).unwrap_err();
        assert!(matches!(err, EnrollError::DatasetNotFound { .. }));
    }

    #[test]
    fn uppercase_extensions_are_recognized() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("alice");
        std::fs::create_dir(&dir).unwrap();
        touch(&dir.join("photo.JPG"));
        let index = DatasetIndex::scan(tmp.path()).unwrap();
        assert_eq!(index.samples().len(), 1);
    }
}
