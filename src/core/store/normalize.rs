//! Border trimming, downscaling and re-encoding of stored images.

use crate::core::hasher::fast_resize::resize_rgba;
use crate::error::StoreError;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Per-channel difference from the corner pixel that counts as content
pub const TRIM_TOLERANCE: i16 = 100;

/// Result of normalizing a decoded image
#[derive(Debug)]
pub enum Normalized {
    /// Nothing to do; store the original bytes
    Unchanged,
    /// Pixels changed; the stored file must be re-encoded
    Changed(DynamicImage),
}

impl Normalized {
    /// The pixels to use: the changed ones, or `original`
    pub fn pixels<'a>(&'a self, original: &'a DynamicImage) -> &'a DynamicImage {
        match self {
            Normalized::Changed(changed) => changed,
            Normalized::Unchanged => original,
        }
    }
}

/// Crop away a uniform border matching the top-left pixel.
///
/// Returns `None` when the image is uniform or has no border to remove.
pub fn trim(image: &DynamicImage) -> Option<DynamicImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let rgba = image.to_rgba8();
    let corner = rgba.get_pixel(0, 0).0;

    let mut left = width;
    let mut top = height;
    let mut right = 0;
    let mut bottom = 0;
    let mut found = false;

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let differs = pixel
            .0
            .iter()
            .zip(corner.iter())
            .any(|(a, b)| (*a as i16 - *b as i16).abs() > TRIM_TOLERANCE);
        if differs {
            found = true;
            left = left.min(x);
            top = top.min(y);
            right = right.max(x);
            bottom = bottom.max(y);
        }
    }

    if !found {
        return None;
    }

    let crop_width = right - left + 1;
    let crop_height = bottom - top + 1;
    if crop_width == width && crop_height == height {
        return None;
    }

    Some(image.crop_imm(left, top, crop_width, crop_height))
}

/// Downsample to `max_width`, keeping the aspect ratio. `None` when already narrow enough.
pub fn shrink(image: &DynamicImage, max_width: u32) -> Result<Option<DynamicImage>, StoreError> {
    let (width, height) = image.dimensions();
    if max_width == 0 || width <= max_width {
        return Ok(None);
    }

    let new_height = ((height as u64 * max_width as u64) / width as u64).max(1) as u32;
    let resized = resize_rgba(image, max_width, new_height).map_err(|e| StoreError::Encode {
        path: Default::default(),
        reason: e.to_string(),
    })?;

    Ok(Some(DynamicImage::ImageRgba8(resized)))
}

/// Encode pixels in the format implied by `target`'s extension.
pub fn encode_for(image: &DynamicImage, target: &Path) -> Result<Vec<u8>, StoreError> {
    let encode_error = |reason: String| StoreError::Encode {
        path: target.to_path_buf(),
        reason,
    };

    let format = ImageFormat::from_path(target).map_err(|e| encode_error(e.to_string()))?;

    // JPEG has no alpha channel
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image.clone(),
    };

    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(|e| encode_error(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn framed(width: u32, height: u32, border: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(ImageBuffer::from_fn(width, height, |x, y| {
            let inside = x >= border && x < width - border && y >= border && y < height - border;
            if inside {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        }))
    }

    #[test]
    fn trim_removes_uniform_border() {
        let trimmed = trim(&framed(20, 10, 2)).unwrap();
        assert_eq!(trimmed.dimensions(), (16, 6));
    }

    #[test]
    fn trim_ignores_uniform_image() {
        let plain = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(8, 8, Rgba([9, 9, 9, 255])));
        assert!(trim(&plain).is_none());
    }

    #[test]
    fn trim_ignores_small_differences() {
        let image = DynamicImage::ImageRgba8(ImageBuffer::from_fn(8, 8, |x, _| {
            if x > 4 {
                Rgba([180, 180, 180, 255])
            } else {
                Rgba([200, 200, 200, 255])
            }
        }));
        assert!(trim(&image).is_none());
    }

    #[test]
    fn shrink_preserves_aspect_ratio() {
        let wide = framed(1600, 400, 0);
        let shrunk = shrink(&wide, 800).unwrap().unwrap();
        assert_eq!(shrunk.dimensions(), (800, 200));
    }

    #[test]
    fn shrink_leaves_narrow_images() {
        assert!(shrink(&framed(640, 480, 0), 800).unwrap().is_none());
    }

    #[test]
    fn encode_follows_target_extension() {
        let image = framed(10, 10, 1);
        let png = encode_for(&image, Path::new("a.png")).unwrap();
        let jpeg = encode_for(&image, Path::new("a.JPG")).unwrap();

        assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn encode_rejects_unknown_extension() {
        let image = framed(10, 10, 1);
        assert!(encode_for(&image, Path::new("a.unknown")).is_err());
    }
}
