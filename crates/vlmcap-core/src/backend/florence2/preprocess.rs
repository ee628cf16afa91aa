//! Image preprocessing for the Florence-2 vision encoder.
//!
//! Florence-2 expects:
//! - Input size: 768×768 pixels
//! - Normalization: ImageNet mean/std per channel
//! - Channel order: RGB
//! - Tensor layout: NCHW [batch, channels, height, width]

use image::DynamicImage;
use ndarray::Array4;

/// Square input resolution of the vision encoder.
pub const IMAGE_SIZE: u32 = 768;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

const NORM_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const NORM_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize to `image_size × image_size`, convert to RGB, normalize, and
/// return an NCHW tensor suitable for ONNX Runtime.
pub fn preprocess(image: &DynamicImage, image_size: u32) -> Array4<f32> {
    let resized = image.resize_exact(
        image_size,
        image_size,
        image::imageops::FilterType::CatmullRom,
    );
    let rgb = resized.to_rgb8();

    let size = image_size as usize;
    let plane = size * size;
    let mut data = vec![0f32; CHANNELS * plane];

    for (i, pixel) in rgb.as_raw().chunks_exact(CHANNELS).enumerate() {
        for (c, &val) in pixel.iter().enumerate() {
            // NCHW: offset = c * plane + (y * size + x), and i == y * size + x
            data[c * plane + i] = (val as f32 / 255.0 - NORM_MEAN[c]) / NORM_STD[c];
        }
    }

    // Length always matches the shape, so this cannot fail.
    Array4::from_shape_vec((1, CHANNELS, size, size), data)
        .unwrap_or_else(|_| Array4::zeros((1, CHANNELS, size, size)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    #[test]
    fn test_preprocess_shape() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(640, 480));
        let tensor = preprocess(&img, IMAGE_SIZE);
        assert_eq!(tensor.shape(), &[1, 3, 768, 768]);
    }

    #[test]
    fn test_preprocess_normalizes_per_channel() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 255])));
        let tensor = preprocess(&img, 8);

        let red = tensor[[0, 0, 3, 3]];
        assert!((red - (1.0 - 0.485) / 0.229).abs() < 1e-3);

        let green = tensor[[0, 1, 3, 3]];
        assert!((green - (-0.456 / 0.224)).abs() < 1e-3);
    }
}
