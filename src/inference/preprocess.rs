//! Image → NCHW float tensor conversion shared by both models.

use image::imageops::FilterType;
use image::DynamicImage;

/// Per-channel normalization applied after scaling pixels to `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

/// ImageNet statistics used by the ResNet disease classifier.
pub const IMAGENET: Normalization = Normalization {
    mean: [0.485, 0.456, 0.406],
    std: [0.229, 0.224, 0.225],
};

/// OpenAI CLIP statistics used by the plant image encoder.
pub const CLIP: Normalization = Normalization {
    mean: [0.481_454_66, 0.457_827_5, 0.408_210_73],
    std: [0.268_629_54, 0.261_302_58, 0.275_777_11],
};

/// Both models take 224×224 inputs.
pub const INPUT_SIZE: u32 = 224;

/// Resize to `size`×`size` RGB and return `(shape, data)` for a `[1, 3, H, W]` tensor.
pub fn to_nchw(image: &DynamicImage, size: u32, norm: Normalization) -> (Vec<i64>, Vec<f32>) {
    let rgb = image
        .resize_exact(size, size, FilterType::CatmullRom)
        .to_rgb8();
    let plane = (size * size) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let offset = (y * size + x) as usize;
        for c in 0..3 {
            let value = pixel.0[c] as f32 / 255.0;
            data[c * plane + offset] = (value - norm.mean[c]) / norm.std[c];
        }
    }

    (vec![1, 3, size as i64, size as i64], data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn output_has_nchw_shape() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(31, 17));
        let (shape, data) = to_nchw(&image, INPUT_SIZE, IMAGENET);
        assert_eq!(shape, vec![1, 3, 224, 224]);
        assert_eq!(data.len(), 3 * 224 * 224);
    }

    #[test]
    fn channels_are_planar_and_normalized() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])));
        let (_, data) = to_nchw(&image, 4, IMAGENET);
        let plane = 16;
        let red = (1.0 - IMAGENET.mean[0]) / IMAGENET.std[0];
        let green = (0.0 - IMAGENET.mean[1]) / IMAGENET.std[1];
        assert!((data[0] - red).abs() < 1e-5);
        assert!((data[plane] - green).abs() < 1e-5);
        assert!((data[plane - 1] - red).abs() < 1e-5);
    }
}
