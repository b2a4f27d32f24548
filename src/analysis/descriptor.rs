//! The 8-byte per-window descriptor record.

use crate::tensor::table::BINS;
use std::io::Read;

/// Size of one serialized descriptor in bytes.
pub const DESCRIPTOR_SIZE: usize = 8;

/// Acoustic summary of one analysis window.
///
/// `range_db` is the peak-to-trough envelope range, clamped to [0, 95].
/// `cycles` is the even count of confirmed envelope half-cycle triggers.
/// The three zone fractions, the attack ratio, and the peak jitter are
/// quantized to [0, 255]; `attack_ratio` defaults to 128 below 4 cycles
/// and `peak_jitter` to 255 below 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub range_db: u8,
    pub cycles: u8,
    pub low_third: u8,
    pub mid_third: u8,
    pub high_third: u8,
    pub attack_ratio: u8,
    pub peak_jitter: u8,
    pub spare: u8,
}

impl Descriptor {
    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_SIZE] {
        [
            self.range_db,
            self.cycles,
            self.low_third,
            self.mid_third,
            self.high_third,
            self.attack_ratio,
            self.peak_jitter,
            self.spare,
        ]
    }

    pub fn from_bytes(bytes: [u8; DESCRIPTOR_SIZE]) -> Self {
        Self {
            range_db: bytes[0],
            cycles: bytes[1],
            low_third: bytes[2],
            mid_third: bytes[3],
            high_third: bytes[4],
            attack_ratio: bytes[5],
            peak_jitter: bytes[6],
            spare: bytes[7],
        }
    }

    /// Tensor cell this descriptor falls into. Sub-resolution bits are
    /// dropped and each axis saturates at its last bin; `high_third`,
    /// `attack_ratio` and `peak_jitter` do not participate in the current
    /// dimensioning.
    pub fn tensor_index(&self) -> [usize; 4] {
        [
            (self.range_db as usize).min(BINS[0] - 1),
            (self.cycles as usize >> 1).min(BINS[1] - 1),
            (self.low_third as usize >> 4).min(BINS[2] - 1),
            (self.mid_third as usize >> 4).min(BINS[3] - 1),
        ]
    }
}

/// Reads every whole descriptor record from a capture stream; a trailing
/// partial record is ignored.
pub fn read_all(reader: &mut impl Read) -> std::io::Result<Vec<Descriptor>> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;

    Ok(raw
        .chunks_exact(DESCRIPTOR_SIZE)
        .map(|chunk| {
            let mut bytes = [0u8; DESCRIPTOR_SIZE];
            bytes.copy_from_slice(chunk);
            Descriptor::from_bytes(bytes)
        })
        .collect())
}
