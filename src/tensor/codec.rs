//! Tensor file format: a small header followed by a dictionary-coded
//! payload.
//!
//! ```text
//! offset  size  field
//!  0      4     version (little-endian u32, currently 1)
//!  4      4     checksum (little-endian u32; byte sum of the raw tensor)
//!  8      4     dims[4] = {48, 24, 16, 16}
//! 12      *     coded payload
//! ```
//!
//! The payload is one gzip member. The writer tries every `maxbits` in
//! [9, 16] (mapped onto the coder's effort levels) and keeps the smallest
//! result. Readers validate everything and reject on any mismatch: a run
//! must not start with an untrusted discriminator.

use crate::error::{Result, SiftError};
use crate::tensor::table::{Tensor, BINS, CELLS};
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// On-disk format version.
pub const TENSOR_VERSION: u32 = 1;

/// Header length in bytes.
pub const HEADER_SIZE: usize = 12;

/// Smallest dictionary width tried by the writer.
pub const MIN_MAXBITS: u32 = 9;

/// Largest dictionary width tried by the writer.
pub const MAX_MAXBITS: u32 = 16;

/// Compresses `src` with the given dictionary width.
pub fn compress(src: &[u8], maxbits: u32) -> Result<Vec<u8>> {
    debug_assert!((MIN_MAXBITS..=MAX_MAXBITS).contains(&maxbits));
    let level = Compression::new(maxbits - MIN_MAXBITS + 2);
    let mut encoder = GzEncoder::new(Vec::new(), level);
    encoder.write_all(src)?;
    Ok(encoder.finish()?)
}

/// Decompresses one coded payload, requiring exactly `expected_len` output
/// bytes and no residual input.
pub fn decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(src);
    let mut decoded = Vec::with_capacity(expected_len);
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| SiftError::InvalidTensor(format!("coder error: {}", e)))?;

    if !decoder.into_inner().is_empty() {
        return Err(SiftError::InvalidTensor("residual input".to_string()));
    }

    if decoded.len() != expected_len {
        return Err(SiftError::InvalidTensor(format!(
            "decoded {} bytes, expected {}",
            decoded.len(),
            expected_len
        )));
    }

    Ok(decoded)
}

/// Serializes a tensor: header plus the smallest payload over the maxbits
/// sweep. Returns the file bytes and the winning maxbits.
pub fn encode(tensor: &Tensor) -> Result<(Vec<u8>, u32)> {
    let raw = tensor.to_bytes();

    let mut payload = compress(&raw, MIN_MAXBITS)?;
    let mut maxbits = MIN_MAXBITS;
    for bits in MIN_MAXBITS + 1..=MAX_MAXBITS {
        let candidate = compress(&raw, bits)?;
        if candidate.len() < payload.len() {
            payload = candidate;
            maxbits = bits;
        }
    }

    let mut file = Vec::with_capacity(HEADER_SIZE + payload.len());
    file.extend_from_slice(&TENSOR_VERSION.to_le_bytes());
    file.extend_from_slice(&tensor.checksum().to_le_bytes());
    file.extend_from_slice(&[BINS[0] as u8, BINS[1] as u8, BINS[2] as u8, BINS[3] as u8]);
    file.extend_from_slice(&payload);

    Ok((file, maxbits))
}

/// Parses and validates a serialized tensor.
pub fn decode(bytes: &[u8]) -> Result<Tensor> {
    if bytes.len() < HEADER_SIZE {
        return Err(SiftError::InvalidTensor("truncated header".to_string()));
    }

    let version = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let checksum = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let dims = &bytes[8..12];

    if version != TENSOR_VERSION {
        return Err(SiftError::InvalidTensor(format!(
            "version {} not supported",
            version
        )));
    }

    if dims != [BINS[0] as u8, BINS[1] as u8, BINS[2] as u8, BINS[3] as u8] {
        return Err(SiftError::InvalidTensor(format!(
            "dimensions {:?} not supported",
            dims
        )));
    }

    let raw = decompress(&bytes[HEADER_SIZE..], CELLS)?;
    let tensor = Tensor::from_bytes(&raw)?;

    if tensor.checksum() != checksum {
        return Err(SiftError::InvalidTensor("checksum mismatch".to_string()));
    }

    Ok(tensor)
}

/// Loads and validates a tensor file.
pub fn read_tensor_file(path: &Path) -> Result<Tensor> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    decode(&bytes)
}

/// Writes a tensor file, reporting the coded size on stderr.
pub fn write_tensor_file(tensor: &Tensor, path: &Path) -> Result<()> {
    let (bytes, maxbits) = encode(tensor)?;

    eprintln!(
        "tensor checksum = {}, stored with maxbits {} in {} bytes (ratio = {:.1}%)",
        tensor.checksum(),
        maxbits,
        bytes.len() - HEADER_SIZE,
        (bytes.len() - HEADER_SIZE) as f64 * 100.0 / CELLS as f64
    );

    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    Ok(())
}
