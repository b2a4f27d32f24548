//! The discrimination lookup table.
//!
//! A dense 48×24×16×16 array of signed scores in [-99, +99]: +99 is pure
//! MUSIC, -99 pure TALK, 0 unknown. Read-only during a filter run.

use crate::analysis::descriptor::Descriptor;
use crate::error::{Result, SiftError};

/// Bin counts per axis: range_dB, cycles/2, low_third/16, mid_third/16.
pub const BINS: [usize; 4] = [48, 24, 16, 16];

/// Total cell count.
pub const CELLS: usize = BINS[0] * BINS[1] * BINS[2] * BINS[3];

/// Dense signed-score table in h-major (h outermost, k innermost) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
    values: Vec<i8>,
}

impl Tensor {
    /// A neutral table scoring every window as unknown.
    pub fn zeroed() -> Self {
        Self {
            values: vec![0; CELLS],
        }
    }

    /// Builds a tensor from raw h-major bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CELLS {
            return Err(SiftError::InvalidTensor(format!(
                "expected {} cells, got {}",
                CELLS,
                bytes.len()
            )));
        }

        Ok(Self {
            values: bytes.iter().map(|&b| b as i8).collect(),
        })
    }

    /// Raw h-major bytes, as persisted and checksummed.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.values.iter().map(|&v| v as u8).collect()
    }

    #[inline]
    pub(crate) fn flat(index: [usize; 4]) -> usize {
        ((index[0] * BINS[1] + index[1]) * BINS[2] + index[2]) * BINS[3] + index[3]
    }

    #[inline]
    pub fn get(&self, index: [usize; 4]) -> i8 {
        self.values[Self::flat(index)]
    }

    #[inline]
    pub fn set(&mut self, index: [usize; 4], value: i8) {
        self.values[Self::flat(index)] = value;
    }

    /// Scores a descriptor. Index saturation happens in the descriptor's
    /// own derivation, so every record maps to a valid cell.
    #[inline]
    pub fn lookup(&self, descriptor: &Descriptor) -> i8 {
        self.get(descriptor.tensor_index())
    }

    /// Unsigned byte sum of the raw table, mod 2^32.
    pub fn checksum(&self) -> u32 {
        self.values
            .iter()
            .fold(0u32, |sum, &v| sum.wrapping_add(v as u8 as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_tensor_scores_unknown() {
        let tensor = Tensor::zeroed();
        let descriptor = Descriptor {
            range_db: 30,
            cycles: 10,
            low_third: 100,
            mid_third: 200,
            high_third: 0,
            attack_ratio: 128,
            peak_jitter: 255,
            spare: 0,
        };
        assert_eq!(tensor.lookup(&descriptor), 0);
        assert_eq!(tensor.checksum(), 0);
    }

    #[test]
    fn test_get_set_round_trip_across_axes() {
        let mut tensor = Tensor::zeroed();
        tensor.set([0, 0, 0, 0], 99);
        tensor.set([47, 23, 15, 15], -99);
        tensor.set([10, 5, 3, 7], 42);
        assert_eq!(tensor.get([0, 0, 0, 0]), 99);
        assert_eq!(tensor.get([47, 23, 15, 15]), -99);
        assert_eq!(tensor.get([10, 5, 3, 7]), 42);
        assert_eq!(tensor.get([10, 5, 3, 8]), 0);
    }

    #[test]
    fn test_byte_round_trip_preserves_signs() {
        let mut tensor = Tensor::zeroed();
        tensor.set([1, 2, 3, 4], -99);
        tensor.set([4, 3, 2, 1], 99);
        let restored = Tensor::from_bytes(&tensor.to_bytes()).unwrap();
        assert_eq!(restored, tensor);
    }

    #[test]
    fn test_from_bytes_rejects_wrong_size() {
        assert!(matches!(
            Tensor::from_bytes(&[0u8; 100]),
            Err(SiftError::InvalidTensor(_))
        ));
    }

    #[test]
    fn test_checksum_is_unsigned_byte_sum() {
        let mut tensor = Tensor::zeroed();
        tensor.set([0, 0, 0, 0], -1);
        // -1 as a raw byte is 0xff
        assert_eq!(tensor.checksum(), 255);
    }

    #[test]
    fn test_flat_layout_is_h_major() {
        let mut tensor = Tensor::zeroed();
        tensor.set([0, 0, 0, 1], 7);
        assert_eq!(tensor.to_bytes()[1], 7);
        tensor.set([1, 0, 0, 0], 9);
        assert_eq!(tensor.to_bytes()[BINS[1] * BINS[2] * BINS[3]], 9);
    }
}
