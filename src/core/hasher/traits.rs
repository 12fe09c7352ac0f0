//! Fingerprint types and the hash algorithm seam.

use crate::error::HashError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fixed-width perceptual fingerprint.
///
/// Visually similar images produce fingerprints with a small Hamming
/// distance. Stored and exported as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PerceptualHash {
    bytes: Vec<u8>,
}

impl PerceptualHash {
    /// Create a fingerprint from raw bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Parse the hex form produced by [`PerceptualHash::to_hex`]
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        if hex.len() % 2 != 0 {
            return Err(HashError::ComputationFailed(format!(
                "odd-length fingerprint: {hex}"
            )));
        }

        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| {
                hex.get(i..i + 2)
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                    .ok_or_else(|| {
                        HashError::ComputationFailed(format!("invalid fingerprint: {hex}"))
                    })
            })
            .collect::<Result<Vec<u8>, HashError>>()?;

        Ok(Self { bytes })
    }

    /// Get the raw hash bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the hash as a hexadecimal string
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Get the total number of bits in this hash
    pub fn bit_count(&self) -> u32 {
        (self.bytes.len() * 8) as u32
    }

    /// Hamming distance to another fingerprint.
    ///
    /// Fingerprints of different widths are never similar: their distance is
    /// the larger bit count.
    pub fn distance(&self, other: &Self) -> u32 {
        if self.bytes.len() != other.bytes.len() {
            return self.bit_count().max(other.bit_count());
        }

        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PerceptualHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<PerceptualHash> for String {
    fn from(hash: PerceptualHash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for PerceptualHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

/// Trait for perceptual hash implementations
pub trait HashAlgorithm: Send + Sync {
    /// Compute a fingerprint from an already-decoded image
    fn hash_image(&self, image: &DynamicImage) -> Result<PerceptualHash, HashError>;

    /// Grid size the algorithm was built with
    fn hash_size(&self) -> u32;
}
