//! Order-preserving encryption of small counts.
//!
//! Counts map through prefix sums of PRF-derived gaps: deterministic under a
//! fixed key, strictly monotone, and revealing nothing beyond order.
//! Encryption is linear in the count, which stays cheap for word
//! frequencies.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256;

/// Gaps are drawn from `[1, GAP_RANGE]`.
const GAP_RANGE: u64 = 1 << 16;

pub struct Opse {
    cipher: Aes256,
}

impl Opse {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256::new(key.into()),
        }
    }

    /// Keyed monotone map: `x < y` implies `encrypt(x) < encrypt(y)`.
    ///
    /// `encrypt(0) = 0`.
    pub fn encrypt(&self, n: u64) -> u64 {
        (1..=n).map(|j| self.gap(j)).sum()
    }

    fn gap(&self, j: u64) -> u64 {
        let mut block = GenericArray::from(u128::from(j).to_be_bytes());
        self.cipher.encrypt_block(&mut block);
        let word = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
        1 + (u64::from(word) % GAP_RANGE)
    }
}
