use image::ImageReader;
use image::imageops::FilterType;
use ndarray::Array4;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("cannot read image file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Turns an image file into a `[1, size, size, 3]` tensor scaled to `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    size: u32,
}

impl ImagePreprocessor {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    pub fn prepare(&self, path: &Path) -> Result<Array4<f32>, PreprocessError> {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        // Nearest neighbour, same as the reference model's training pipeline.
        let rgb = image
            .resize_exact(self.size, self.size, FilterType::Nearest)
            .to_rgb8();

        let side = self.size as usize;
        let tensor = Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| {
            f32::from(rgb.get_pixel(x as u32, y as u32)[c]) / 255.0
        });
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn prepares_normalized_batch_tensor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patch.png");
        let mut img = RgbImage::from_pixel(40, 20, Rgb([255, 0, 51]));
        img.put_pixel(0, 0, Rgb([0, 0, 0]));
        img.save(&path).unwrap();

        let tensor = ImagePreprocessor::new(16).prepare(&path).unwrap();
        assert_eq!(tensor.shape(), &[1, 16, 16, 3]);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(tensor[[0, 8, 8, 0]], 1.0);
        assert_eq!(tensor[[0, 8, 8, 1]], 0.0);
        assert!((tensor[[0, 8, 8, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn format_is_guessed_from_content() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("real.png");
        RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])).save(&png).unwrap();
        let misnamed = dir.path().join("photo.dat");
        std::fs::copy(&png, &misnamed).unwrap();

        assert!(ImagePreprocessor::new(8).prepare(&misnamed).is_ok());
    }

    #[test]
    fn rejects_non_images_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let preprocessor = ImagePreprocessor::new(8);
        assert!(matches!(
            preprocessor.prepare(&path),
            Err(PreprocessError::Decode(_))
        ));
        assert!(matches!(
            preprocessor.prepare(&dir.path().join("missing.png")),
            Err(PreprocessError::Io(_))
        ));
    }
}
