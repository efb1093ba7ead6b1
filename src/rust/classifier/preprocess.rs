use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

use super::error::ClassifierError;

/// Per-channel mean used when CLIP was trained.
pub(crate) const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
/// Per-channel standard deviation used when CLIP was trained.
pub(crate) const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Decodes an encoded image (PNG, JPEG, WebP, ...) held in memory.
///
/// The format is guessed from the leading bytes.
///
/// # Errors
/// - `DecodeError` if `bytes` is empty
/// - `DecodeError` if the format is unknown or the data is corrupt
/// - `DecodeError` if the decoded image has no pixels
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ClassifierError> {
    if bytes.is_empty() {
        return Err(ClassifierError::DecodeError("Image data is empty".into()));
    }
    let image = image::load_from_memory(bytes)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(ClassifierError::DecodeError(format!(
            "Image has no pixels ({}x{})",
            image.width(),
            image.height()
        )));
    }
    Ok(image)
}

/// Centred square of side `min(width, height)` in source coordinates.
fn center_square(width: u32, height: u32) -> (u32, u32, u32) {
    let side = width.min(height);
    ((width - side) / 2, (height - side) / 2, side)
}

/// Converts an image into the `[1, 3, size, size]` pixel tensor CLIP expects.
///
/// Steps:
/// 1. Center-crop the source to a square on its shortest side
/// 2. Resize the square to `size x size` (bicubic)
/// 3. Scale to `[0, 1]` and normalize each channel with the CLIP mean/std
///
/// Cropping first keeps the intermediate buffer at most `size x size`,
/// whatever the aspect ratio of the input.
pub(crate) fn pixel_values(
    image: &DynamicImage,
    size: u32,
) -> Result<Array4<f32>, ClassifierError> {
    if size == 0 {
        return Err(ClassifierError::ValidationError(
            "Target image size must be positive".into(),
        ));
    }
    let (left, top, side) = center_square(image.width(), image.height());
    if side == 0 {
        return Err(ClassifierError::DecodeError("Image has no pixels".into()));
    }
    let rgb = image
        .crop_imm(left, top, side, side)
        .resize_exact(size, size, FilterType::CatmullRom)
        .to_rgb8();

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for channel in 0..3 {
            let value = pixel.0[channel] as f32 / 255.0;
            tensor[[0, channel, y as usize, x as usize]] =
                (value - CLIP_MEAN[channel]) / CLIP_STD[channel];
        }
    }
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 0, 0])));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let image = decode_image(&png_bytes(8, 4)).unwrap();
        assert_eq!((image.width(), image.height()), (8, 4));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_image(b"not an image"), Err(ClassifierError::DecodeError(_))));
        assert!(matches!(decode_image(&[]), Err(ClassifierError::DecodeError(_))));
    }

    #[test]
    fn test_pixel_values_shape_and_normalization() {
        let image = decode_image(&png_bytes(40, 20)).unwrap();
        let tensor = pixel_values(&image, 16).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);

        let red = (1.0 - CLIP_MEAN[0]) / CLIP_STD[0];
        let green = (0.0 - CLIP_MEAN[1]) / CLIP_STD[1];
        assert!((tensor[[0, 0, 8, 8]] - red).abs() < 1e-3);
        assert!((tensor[[0, 1, 8, 8]] - green).abs() < 1e-3);
    }

    #[test]
    fn test_center_square() {
        assert_eq!(center_square(40, 20), (10, 0, 20));
        assert_eq!(center_square(1, 40_000), (0, 19_999, 1));
        assert_eq!(center_square(7, 7), (0, 0, 7));
    }

    #[test]
    fn test_extreme_aspect_ratio_stays_small() {
        // A one-pixel-wide strip would need a 224 x 8_960_000 buffer if resized before cropping.
        let image = decode_image(&png_bytes(1, 40_000)).unwrap();
        let start = std::time::Instant::now();
        let tensor = pixel_values(&image, 224).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        assert!(start.elapsed() < std::time::Duration::from_secs(5));

        let red = (1.0 - CLIP_MEAN[0]) / CLIP_STD[0];
        assert!((tensor[[0, 0, 112, 112]] - red).abs() < 1e-3);
    }

    #[test]
    fn test_pixel_values_rejects_zero_size() {
        let image = decode_image(&png_bytes(4, 4)).unwrap();
        assert!(matches!(pixel_values(&image, 0), Err(ClassifierError::ValidationError(_))));
    }
}
