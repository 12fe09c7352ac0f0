//! # Hasher Module
//!
//! Computes the two fingerprints every stored image carries.
//!
//! - **Checksum** - BLAKE3 digest of the raw bytes, for identity and idempotence
//! - **Perceptual hash** - dHash of the decoded pixels, for near-duplicates
//!
//! ## How dHash Works
//! 1. Resize image to a small grid ((size+1) x size)
//! 2. Convert to grayscale
//! 3. Record whether each pixel is brighter than its right neighbour
//! 4. Compare hashes using Hamming distance
//!
//! ## Performance Optimizations
//! - Uses `zune-jpeg` for 1.5-2x faster JPEG decoding
//! - Uses `fast_image_resize` for 5-14x faster SIMD-accelerated resizing
//!
//! ## Example
//! ```rust,ignore
//! use imshelf::core::hasher::HashEngine;
//!
//! let engine = HashEngine::new(8, 3, false);
//! let checksum = engine.exact_fingerprint(&bytes);
//! let image = engine.decode(&bytes, &path)?;
//! let hash = engine.perceptual_fingerprint(&image)?;
//! ```

mod algorithms;
mod checksum;
pub mod fast_decode;
pub mod fast_resize;
mod traits;

pub use algorithms::DifferenceHasher;
pub use checksum::Checksum;
pub use traits::{HashAlgorithm, PerceptualHash};

use crate::config::LibraryConfig;
use crate::error::HashError;
use fast_decode::FastDecoder;
use image::DynamicImage;
use std::path::Path;

/// Fingerprinting with one fixed configuration
pub struct HashEngine {
    algorithm: Box<dyn HashAlgorithm>,
    threshold: u32,
    skip_hash: bool,
}

impl HashEngine {
    /// Create an engine with `hash_size²`-bit fingerprints
    pub fn new(hash_size: u32, threshold: u32, skip_hash: bool) -> Self {
        Self {
            algorithm: Box::new(DifferenceHasher::new(hash_size)),
            threshold,
            skip_hash,
        }
    }

    pub fn from_config(config: &LibraryConfig) -> Self {
        Self::new(
            config.hash_size,
            config.hash_difference_threshold,
            config.skip_hash,
        )
    }

    /// Duplicate distance bound; 0 means exact fingerprint equality
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Whether perceptual fingerprinting is disabled library-wide
    pub fn skips_perceptual(&self) -> bool {
        self.skip_hash
    }

    pub fn hash_size(&self) -> u32 {
        self.algorithm.hash_size()
    }

    /// Digest of raw content; always computed on the write path
    pub fn exact_fingerprint(&self, bytes: &[u8]) -> Checksum {
        Checksum::of_bytes(bytes)
    }

    /// Digest of a file on disk
    pub fn checksum_file(&self, path: &Path) -> Result<Checksum, HashError> {
        Checksum::of_file(path)
    }

    /// Decode bytes into pixels; `path` only labels errors
    pub fn decode(&self, bytes: &[u8], path: &Path) -> Result<DynamicImage, HashError> {
        let image = FastDecoder::decode(bytes, path)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(HashError::DecodeError {
                path: path.to_path_buf(),
                reason: "image has no pixels".to_string(),
            });
        }
        Ok(image)
    }

    /// Fingerprint of decoded pixel content
    pub fn perceptual_fingerprint(&self, image: &DynamicImage) -> Result<PerceptualHash, HashError> {
        self.algorithm.hash_image(image)
    }

    /// Hamming distance between two fingerprints
    pub fn distance(&self, a: &PerceptualHash, b: &PerceptualHash) -> u32 {
        a.distance(b)
    }

    /// Whether two fingerprints count as the same picture under this configuration
    pub fn is_near(&self, a: &PerceptualHash, b: &PerceptualHash) -> bool {
        is_within(a, b, self.threshold)
    }
}

/// Threshold semantics shared by the engine and the index:
/// 0 = equality, otherwise distance strictly below the threshold.
pub fn is_within(a: &PerceptualHash, b: &PerceptualHash, threshold: u32) -> bool {
    if threshold == 0 {
        a == b
    } else {
        a.distance(b) < threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn hash(bytes: &[u8]) -> PerceptualHash {
        PerceptualHash::from_bytes(bytes.to_vec())
    }

    #[test]
    fn threshold_zero_means_equality() {
        let engine = HashEngine::new(8, 0, false);
        assert!(engine.is_near(&hash(&[0b1010]), &hash(&[0b1010])));
        assert!(!engine.is_near(&hash(&[0b1010]), &hash(&[0b1011])));
    }

    #[test]
    fn threshold_is_exclusive() {
        let engine = HashEngine::new(8, 2, false);
        assert!(engine.is_near(&hash(&[0b0000]), &hash(&[0b0001])));
        assert!(!engine.is_near(&hash(&[0b0000]), &hash(&[0b0011])));
    }

    #[test]
    fn fingerprint_width_follows_hash_size() {
        let engine = HashEngine::new(16, 3, false);
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(40, 40, |x, _| {
            Rgb([(x * 6) as u8, 0, 0])
        }));

        let fingerprint = engine.perceptual_fingerprint(&image).unwrap();
        assert_eq!(fingerprint.bit_count(), 256);
        assert_eq!(engine.hash_size(), 16);
    }

    #[test]
    fn from_config_copies_settings() {
        let config = LibraryConfig::default().threshold(5).skip_hash(true);
        let engine = HashEngine::from_config(&config);
        assert_eq!(engine.threshold(), 5);
        assert!(engine.skips_perceptual());
    }
}
