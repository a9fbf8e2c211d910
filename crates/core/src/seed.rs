//! Deterministic seeding for the randomized layout order.

use crate::result::{Error, Result};
use rand::{RngCore, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// A layout seed: a vector of 32-bit words.
///
/// The same seed always produces the identical block order, output bytes,
/// and diagnostic log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    words: Vec<u32>,
}

impl Seed {
    /// Wraps an explicit word vector.
    pub fn new(words: Vec<u32>) -> Self {
        Self { words }
    }

    /// Generates a fresh 256-bit random seed.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let words = (0..8).map(|_| rng.next_u32()).collect();
        Self { words }
    }

    /// Parses a hex string (with or without 0x prefix) into seed words.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        if hex.is_empty() || hex.len() % 8 != 0 {
            return Err(Error::InvalidSeedLength(hex.len()));
        }

        let bytes = ::hex::decode(hex).map_err(|_| Error::InvalidSeedHex)?;
        let words = bytes
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { words })
    }

    /// Formats the seed as a hex string with 0x prefix.
    pub fn to_hex(&self) -> String {
        let bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_be_bytes()).collect();
        format!("0x{}", ::hex::encode(bytes))
    }

    /// The seed's words.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Creates the deterministic RNG that drives the Fisher-Yates shuffle of
    /// the randomized layout order.
    ///
    /// The word vector is hashed under a fixed domain tag so that any way of
    /// producing equal words (literal vector, hex string, `generate`) yields
    /// the same stream.
    pub fn create_deterministic_rng(&self) -> StdRng {
        let mut hasher = Sha3_256::new();
        hasher.update(b"REFLOW_LAYOUT_ORDER");
        for word in &self.words {
            hasher.update(word.to_le_bytes());
        }
        let digest = hasher.finalize();

        let mut seed_bytes = [0u8; 8];
        seed_bytes.copy_from_slice(&digest[..8]);
        StdRng::seed_from_u64(u64::from_le_bytes(seed_bytes))
    }
}
