//! Difference Hash (dHash) implementation.
//!
//! dHash works by:
//! 1. Resizing the image to (hash_size+1) x hash_size
//! 2. Converting to grayscale
//! 3. Comparing each pixel to the one to its right
//! 4. If left pixel is brighter, set bit to 1, else 0
//!
//! Recompression and resizing barely move the brightness gradients, so
//! re-encoded copies land within a few bits of the original.

use super::super::fast_resize::resize_to_grayscale;
use super::super::traits::{HashAlgorithm, PerceptualHash};
use crate::error::HashError;
use image::DynamicImage;

/// Difference Hash (dHash) implementation
pub struct DifferenceHasher {
    /// Size of the hash (width and height of comparison grid)
    hash_size: u32,
}

impl DifferenceHasher {
    /// Create a new dHash hasher
    pub fn new(hash_size: u32) -> Self {
        Self { hash_size }
    }
}

impl HashAlgorithm for DifferenceHasher {
    fn hash_image(&self, image: &DynamicImage) -> Result<PerceptualHash, HashError> {
        // One extra column so every cell has a right-hand neighbour
        let gray = resize_to_grayscale(image, self.hash_size + 1, self.hash_size)?;

        let bits = self.hash_size * self.hash_size;
        let mut hash_bytes = Vec::with_capacity(bits.div_ceil(8) as usize);
        let mut current_byte: u8 = 0;
        let mut bit_position = 0;

        for y in 0..self.hash_size {
            for x in 0..self.hash_size {
                let left_pixel = gray.get_pixel(x, y)[0];
                let right_pixel = gray.get_pixel(x + 1, y)[0];

                if left_pixel > right_pixel {
                    current_byte |= 1 << (7 - bit_position);
                }

                bit_position += 1;

                if bit_position == 8 {
                    hash_bytes.push(current_byte);
                    current_byte = 0;
                    bit_position = 0;
                }
            }
        }

        // Last partial byte
        if bit_position > 0 {
            hash_bytes.push(current_byte);
        }

        Ok(PerceptualHash::from_bytes(hash_bytes))
    }

    fn hash_size(&self) -> u32 {
        self.hash_size
    }
}
