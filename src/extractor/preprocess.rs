//! Shared image preprocessing for the embedding backends.
//!
//! Both backends consume the same pipeline: decode to RGB, resize to the
//! bound square input size, scale/mean/std normalize, and pack into an
//! NCHW batch tensor. The per-channel factors are precomputed as
//! `alpha = scale / std` and `beta = -mean / std` so normalization is a
//! single multiply-add per pixel.

use crate::core::batch::Tensor4D;
use crate::core::errors::{EnrollError, EnrollResult};
use image::RgbImage;
use image::imageops::FilterType;
use rayon::prelude::*;
use std::path::Path;

/// Image count above which batch decoding switches to rayon.
const PARALLEL_DECODE_THRESHOLD: usize = 8;

/// Decodes, resizes, and normalizes images into batch tensors.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    target_size: u32,
    alpha: [f32; 3],
    beta: [f32; 3],
}

impl ImagePreprocessor {
    /// Creates a preprocessor with explicit normalization parameters.
    ///
    /// # Errors
    ///
    /// Returns an error when the target size is zero, the scale is not
    /// positive, or any standard deviation is not positive.
    pub fn new(target_size: u32, scale: f32, mean: [f32; 3], std: [f32; 3]) -> EnrollResult<Self> {
        if target_size == 0 {
            return Err(EnrollError::invalid_input("target size must be positive"));
        }
        if scale <= 0.0 {
            return Err(EnrollError::invalid_input("scale must be positive"));
        }
        for (i, &s) in std.iter().enumerate() {
            if s <= 0.0 {
                return Err(EnrollError::invalid_input(format!(
                    "standard deviation at index {i} must be positive, got {s}"
                )));
            }
        }

        let mut alpha = [0.0; 3];
        let mut beta = [0.0; 3];
        for c in 0..3 {
            alpha[c] = scale / std[c];
            beta[c] = -mean[c] / std[c];
        }

        Ok(Self {
            target_size,
            alpha,
            beta,
        })
    }

    /// Creates a preprocessor with ImageNet normalization.
    pub fn imagenet(target_size: u32) -> EnrollResult<Self> {
        Self::new(
            target_size,
            1.0 / 255.0,
            [0.485, 0.456, 0.406],
            [0.229, 0.224, 0.225],
        )
    }

    /// The square side length images are resized to.
    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    /// Decodes a single image to RGB.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollError::ImageDecode`] naming the offending path.
    pub fn load(&self, path: &Path) -> EnrollResult<RgbImage> {
        let img = image::open(path).map_err(|e| EnrollError::image_decode(path, e))?;
        Ok(img.to_rgb8())
    }

    /// Decodes a batch of images, in order.
    ///
    /// Each image is decoded independently; the first failure aborts the
    /// call with the failing path. Decoding runs on rayon once the batch
    /// outgrows a small threshold.
    pub fn load_batch(&self, paths: &[&Path]) -> EnrollResult<Vec<RgbImage>> {
        if paths.len() > PARALLEL_DECODE_THRESHOLD {
            paths.par_iter().map(|p| self.load(p)).collect()
        } else {
            paths.iter().map(|p| self.load(p)).collect()
        }
    }

    /// Resizes and normalizes decoded images into one NCHW batch tensor.
    pub fn to_batch(&self, images: &[RgbImage]) -> EnrollResult<Tensor4D> {
        if images.is_empty() {
            return Err(EnrollError::invalid_input(
                "cannot build a batch tensor from zero images",
            ));
        }

        let side = self.target_size as usize;
        let mut batch = Tensor4D::zeros((images.len(), 3, side, side));

        for (n, img) in images.iter().enumerate() {
            let resized = if img.width() == self.target_size && img.height() == self.target_size {
                img.clone()
            } else {
                image::imageops::resize(
                    img,
                    self.target_size,
                    self.target_size,
                    FilterType::Lanczos3,
                )
            };

            for (x, y, pixel) in resized.enumerate_pixels() {
                for c in 0..3 {
                    batch[[n, c, y as usize, x as usize]] =
                        self.alpha[c] * pixel.0[c] as f32 + self.beta[c];
                }
            }
        }

        Ok(batch)
    }
}

/// Scales every row of an embedding matrix to unit L2 norm.
///
/// Zero rows are left untouched. Normalized rows make distances
/// comparable across backends with different output scales.
pub fn l2_normalize_rows(embeddings: &mut crate::core::batch::Tensor2D) {
    for mut row in embeddings.rows_mut() {
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            row.mapv_inplace(|v| v / norm);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb(rgb))
    }

    #[test]
    fn normalization_applies_alpha_beta() {
        let pre = ImagePreprocessor::new(2, 1.0 / 255.0, [0.5, 0.5, 0.5], [0.5, 0.5, 0.5]).unwrap();
        let batch = pre.to_batch(&[solid_image(2, 2, [255, 0, 255])]).unwrap();

        // (255/255 - 0.5) / 0.5 = 1.0 and (0/255 - 0.5) / 0.5 = -1.0
        assert!((batch[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((batch[[0, 1, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((batch[[0, 2, 1, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn batch_shape_matches_inputs() {
        let pre = ImagePreprocessor::imagenet(8).unwrap();
        let images = vec![solid_image(20, 10, [10, 20, 30]); 3];
        let batch = pre.to_batch(&images).unwrap();
        assert_eq!(batch.shape(), &[3, 3, 8, 8]);
    }

    #[test]
    fn invalid_std_is_rejected() {
        let result = ImagePreprocessor::new(8, 1.0, [0.0; 3], [0.5, 0.0, 0.5]);
        assert!(result.is_err());
    }

    #[test]
    fn decode_failure_names_the_path() {
        let tmp = tempfile::tempdir().unwrap();
        let bad = tmp.path().join("broken.jpg");
        std::fs::write(&bad, b"not an image at all").unwrap();

        let pre = ImagePreprocessor::imagenet(8).unwrap();
        let err = pre.load_batch(&[bad.as_path()]).unwrap_err();
        match err {
            EnrollError::ImageDecode { path, .. } => assert_eq!(path, bad),
            other => panic!("expected ImageDecode, got {other:?}"),
        }
    }

    #[test]
    fn load_batch_preserves_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..12u8 {
            let path = tmp.path().join(format!("{i:02}.png"));
            solid_image(4, 4, [i, i, i]).save(&path).unwrap();
            paths.push(path);
        }
        let refs: Vec<&Path> = paths.iter().map(|p| p.as_path()).collect();

        let pre = ImagePreprocessor::imagenet(4).unwrap();
        let images = pre.load_batch(&refs).unwrap();
        for (i, img) in images.iter().enumerate() {
            assert_eq!(img.get_pixel(0, 0).0[0], i as u8);
        }
    }

    #[test]
    fn l2_normalize_leaves_unit_rows() {
        let mut m = array![[3.0_f32, 4.0], [0.0, 0.0]];
        l2_normalize_rows(&mut m);
        assert!((m[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((m[[0, 1]] - 0.8).abs() < 1e-6);
        assert_eq!(m[[1, 0]], 0.0);
    }
}
