//! Content and URI fingerprinting for crawl de-duplication.
//!
//! Two strategies produce 16-byte digests:
//!
//! - [`Md5HashGenerator`]: MD5, collision resistant for practical purposes.
//! - [`Murmur3HashGenerator`]: Murmur3 x64 128, much faster, not
//!   cryptographic.
//!
//! The strategies yield unrelated digests for the same input, so one
//! de-duplication index must only ever be fed by one of them.

use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Seed used by [`Murmur3HashGenerator::new`].
pub const DEFAULT_MURMUR3_SEED: u64 = 144;

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

/// A 16-byte fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashDigest([u8; 16]);

impl HashDigest {
    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for HashDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Fingerprint strategy.
pub trait HashGenerator: Send + Sync {
    /// Digest of `input`.
    fn generate_hash(&self, input: &[u8]) -> HashDigest;

    /// Digest of `input` after single-byte encoding (see [`encode_single_byte`]).
    fn generate_hash_str(&self, input: &str) -> HashDigest {
        self.generate_hash(&encode_single_byte(input))
    }
}

/// Encode one byte per character: ASCII maps to itself, anything else to `?`.
#[must_use]
pub fn encode_single_byte(input: &str) -> Vec<u8> {
    input
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

/// MD5 fingerprints.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5HashGenerator;

impl HashGenerator for Md5HashGenerator {
    fn generate_hash(&self, input: &[u8]) -> HashDigest {
        HashDigest(Md5::digest(input).into())
    }
}

/// Murmur3 x64 128-bit fingerprints.
#[derive(Debug, Clone, Copy)]
pub struct Murmur3HashGenerator {
    seed: u64,
}

impl Murmur3HashGenerator {
    /// Generator with [`DEFAULT_MURMUR3_SEED`].
    #[must_use]
    pub const fn new() -> Self {
        Self::with_seed(DEFAULT_MURMUR3_SEED)
    }

    /// Generator with a custom seed.
    #[must_use]
    pub const fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed in use.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }
}

impl Default for Murmur3HashGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl HashGenerator for Murmur3HashGenerator {
    fn generate_hash(&self, input: &[u8]) -> HashDigest {
        let (h1, h2) = murmur3_x64_128(input, self.seed);
        let mut out = [0_u8; 16];
        out[..8].copy_from_slice(&h1.to_le_bytes());
        out[8..].copy_from_slice(&h2.to_le_bytes());
        HashDigest(out)
    }
}

#[inline]
const fn mix_k1(k1: u64) -> u64 {
    k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2)
}

#[inline]
const fn mix_k2(k2: u64) -> u64 {
    k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1)
}

#[inline]
const fn fmix64(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x
}

fn read_u64_le(bytes: &[u8]) -> u64 {
    let mut word = [0_u8; 8];
    word.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(word)
}

fn murmur3_x64_128(input: &[u8], seed: u64) -> (u64, u64) {
    let mut h1 = seed;
    let mut h2 = seed;

    let mut blocks = input.chunks_exact(16);
    for block in blocks.by_ref() {
        let k1 = read_u64_le(&block[..8]);
        let k2 = read_u64_le(&block[8..]);

        h1 ^= mix_k1(k1);
        h1 = h1.rotate_left(27).wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dc_e729);

        h2 ^= mix_k2(k2);
        h2 = h2.rotate_left(31).wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k1 = 0_u64;
        let mut k2 = 0_u64;
        for (i, byte) in tail.iter().enumerate() {
            let shift = (i % 8) * 8;
            if i < 8 {
                k1 |= u64::from(*byte) << shift;
            } else {
                k2 |= u64::from(*byte) << shift;
            }
        }
        if tail.len() > 8 {
            h2 ^= mix_k2(k2);
        }
        h1 ^= mix_k1(k1);
    }

    let len = input.len() as u64;
    h1 ^= len;
    h2 ^= len;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = fmix64(h1);
    h2 = fmix64(h2);

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}
