use image::imageops::{self, FilterType};
use ndarray::Array3;

use crate::config::{ConfigError, ImageConfig};
use crate::error::DecodeError;

pub const IMG_SIZE: u32 = 224;

/// Decodes uploads into the fixed `H×W×3` array the base classifiers expect.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    width: u32,
    height: u32,
    filter: FilterType,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            width: IMG_SIZE,
            height: IMG_SIZE,
            filter: FilterType::CatmullRom,
        }
    }
}

impl Preprocessor {
    pub fn from_config(config: &ImageConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            width: config.width(),
            height: config.height(),
            filter: config.preprocessing.filter()?,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn preprocess(&self, bytes: &[u8]) -> Result<Array3<u8>, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let rgb = image::load_from_memory(bytes)?.to_rgb8();
        let resized = imageops::resize(&rgb, self.width, self.height, self.filter);

        let array = Array3::from_shape_vec(
            (self.height as usize, self.width as usize, 3),
            resized.into_raw(),
        )?;
        Ok(array)
    }
}

pub fn preprocess(bytes: &[u8]) -> Result<Array3<u8>, DecodeError> {
    Preprocessor::default().preprocess(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn gradient_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    #[test]
    fn output_is_fixed_size_rgb() {
        let pixels = preprocess(&gradient_png(640, 480)).unwrap();
        assert_eq!(pixels.shape(), &[224, 224, 3]);
    }

    #[test]
    fn small_images_are_upscaled() {
        let pixels = preprocess(&gradient_png(16, 9)).unwrap();
        assert_eq!(pixels.shape(), &[224, 224, 3]);
    }

    #[test]
    fn identical_bytes_give_identical_arrays() {
        let bytes = gradient_png(300, 200);
        let first = preprocess(&bytes).unwrap();
        let second = preprocess(&bytes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn grayscale_is_expanded_to_three_channels() {
        let gray = GrayImage::from_pixel(50, 50, image::Luma([90]));
        let bytes = encode(DynamicImage::ImageLuma8(gray), ImageFormat::Png);
        let pixels = preprocess(&bytes).unwrap();
        assert_eq!(pixels.shape(), &[224, 224, 3]);
        assert!(pixels.iter().all(|&v| v == 90));
    }

    #[test]
    fn alpha_channel_is_dropped() {
        let rgba = RgbaImage::from_pixel(32, 32, Rgba([200, 10, 30, 0]));
        let bytes = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);
        let pixels = preprocess(&bytes).unwrap();
        assert_eq!(pixels[[100, 100, 0]], 200);
        assert_eq!(pixels[[100, 100, 1]], 10);
        assert_eq!(pixels[[100, 100, 2]], 30);
    }

    #[test]
    fn jpeg_uploads_decode() {
        let img = RgbImage::from_pixel(64, 48, Rgb([180, 60, 60]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg);
        assert!(preprocess(&bytes).is_ok());
    }

    #[test]
    fn non_image_bytes_fail_to_decode() {
        let err = preprocess(b"%PDF-1.4 this is not an image").unwrap_err();
        assert!(matches!(err, DecodeError::Image(_)));
    }

    #[test]
    fn empty_upload_is_rejected() {
        assert!(matches!(preprocess(&[]), Err(DecodeError::Empty)));
    }

    #[test]
    fn configured_size_is_honored() {
        let config = ImageConfig {
            size: vec![128, 96],
            ..ImageConfig::default()
        };
        let preprocessor = Preprocessor::from_config(&config).unwrap();
        let pixels = preprocessor.preprocess(&gradient_png(40, 40)).unwrap();
        assert_eq!(pixels.shape(), &[96, 128, 3]);
    }
}
