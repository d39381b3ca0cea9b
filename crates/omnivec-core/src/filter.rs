//! Bloom filter for runtime block filtering.
//!
//! Built from the keys of one side of a join and pushed down to scans, where
//! [`Block::filter_bloom`](crate::block::Block::filter_bloom) drops positions
//! that definitely cannot match. Nulls are tracked by a separate flag rather
//! than hashed, so a null position passes only if a null was added.

use std::hash::Hasher;

use bitvec::prelude::{BitVec, Lsb0, bitvec};
use omnivec_common::types::Value;
use omnivec_common::{Error, Result};
use rustc_hash::FxHasher;

/// A probabilistic set of column values.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: BitVec<u64, Lsb0>,
    num_hashes: usize,
    contains_null: bool,
    num_inserted: usize,
}

impl BloomFilter {
    /// Sizes a filter for `expected_entries` at the given false positive rate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] unless `0 < false_positive_rate < 1`.
    pub fn new(expected_entries: usize, false_positive_rate: f64) -> Result<Self> {
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(Error::invalid_argument(format!(
                "false positive rate must be in (0, 1), got {false_positive_rate}"
            )));
        }
        let n = expected_entries.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;
        let num_bits = (-(n * false_positive_rate.ln()) / (ln2 * ln2)).ceil().max(64.0) as usize;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().clamp(1.0, 16.0) as usize;

        Ok(Self {
            bits: bitvec![u64, Lsb0; 0; num_bits],
            num_hashes,
            contains_null: false,
            num_inserted: 0,
        })
    }

    /// Adds a value.
    pub fn add(&mut self, value: &Value) {
        self.num_inserted += 1;
        let Some((h1, h2)) = hash_pair(value) else {
            self.contains_null = true;
            return;
        };
        let num_bits = self.bits.len() as u64;
        for i in 0..self.num_hashes as u64 {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % num_bits;
            self.bits.set(bit as usize, true);
        }
    }

    /// Returns `false` if `value` was definitely never added.
    #[must_use]
    pub fn test(&self, value: &Value) -> bool {
        let Some((h1, h2)) = hash_pair(value) else {
            return self.contains_null;
        };
        let num_bits = self.bits.len() as u64;
        (0..self.num_hashes as u64).all(|i| {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % num_bits;
            self.bits[bit as usize]
        })
    }

    /// Number of values added, nulls included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.num_inserted
    }

    /// Returns `true` if nothing was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_inserted == 0
    }

    /// Number of hash probes per value.
    #[must_use]
    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    /// Size of the bit array.
    #[must_use]
    pub fn num_bits(&self) -> usize {
        self.bits.len()
    }
}

/// Two independent hashes for double hashing, or `None` for null.
fn hash_pair(value: &Value) -> Option<(u64, u64)> {
    let mut hasher = FxHasher::default();
    match value {
        Value::Null => return None,
        Value::Byte(v) => {
            hasher.write_u8(1);
            hasher.write_i8(*v);
        }
        Value::Int(v) => {
            hasher.write_u8(2);
            hasher.write_i32(*v);
        }
        Value::Long(v) => {
            hasher.write_u8(3);
            hasher.write_i64(*v);
        }
        Value::Double(v) => {
            hasher.write_u8(4);
            hasher.write_u64(v.to_bits());
        }
        Value::VarChar(s) => {
            hasher.write_u8(5);
            hasher.write(s.as_bytes());
        }
    }
    let h1 = hasher.finish();
    // Second hash: remix h1 (splitmix64 finalizer), forced odd so probes cycle.
    let mut h2 = h1 ^ (h1 >> 30);
    h2 = h2.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h2 ^= h2 >> 27;
    h2 = h2.wrapping_mul(0x94d0_49bb_1331_11eb);
    h2 ^= h2 >> 31;
    Some((h1, h2 | 1))
}
