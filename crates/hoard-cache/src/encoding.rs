//! Chunk encoding seam
//!
//! Chunks are stored in their encoded form: split into fixed-size raw blocks,
//! each optionally compressed and encrypted. The cache itself never encodes;
//! it only needs to know which encoded bytes cover a raw range and hands
//! those bytes to a [`ChunkDecoder`].

use hoard_core::error::HoardError;
use hoard_core::CompressionFormat;

use crate::CacheResult;

/// Encrypted blocks are padded to the cipher block size
pub const ENCRYPTION_ALIGNMENT: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffsetAndLength {
    pub offset: u64,
    pub length: u64,
}

impl OffsetAndLength {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

fn align(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Encoded byte range of a chunk that covers raw bytes `raw_offset..raw_offset + raw_len`.
///
/// `encoded_block_sizes` lists the encoded size of every raw block of
/// `block_size` bytes. A chunk without blocks is stored raw and maps one to one.
pub fn chunk_range(
    raw_size: u64,
    block_size: u32,
    encoded_block_sizes: &[u32],
    raw_offset: u64,
    raw_len: u64,
    encrypted: bool,
) -> CacheResult<OffsetAndLength> {
    let invalid = |reason: String| HoardError::ChunkRange { reason };

    let raw_end = raw_offset
        .checked_add(raw_len)
        .ok_or_else(|| invalid("range overflows".to_string()))?;
    if raw_end > raw_size {
        return Err(invalid(format!(
            "range {}..{} exceeds raw size {}",
            raw_offset, raw_end, raw_size
        )));
    }

    if encoded_block_sizes.is_empty() {
        return Ok(OffsetAndLength::new(raw_offset, raw_len));
    }

    if block_size == 0 {
        return Err(invalid("block size is zero".to_string()));
    }
    let block_size = u64::from(block_size);
    let expected_blocks = raw_size.div_ceil(block_size);
    if expected_blocks != encoded_block_sizes.len() as u64 {
        return Err(invalid(format!(
            "{} encoded blocks for {} raw blocks",
            encoded_block_sizes.len(),
            expected_blocks
        )));
    }

    if raw_len == 0 {
        return Ok(OffsetAndLength::new(0, 0));
    }

    let first_block = (raw_offset / block_size) as usize;
    let last_block = ((raw_end - 1) / block_size) as usize;

    let encoded_size = |size: &u32| {
        let size = u64::from(*size);
        if encrypted {
            align(size, ENCRYPTION_ALIGNMENT)
        } else {
            size
        }
    };

    let offset: u64 = encoded_block_sizes[..first_block].iter().map(encoded_size).sum();
    let length: u64 = encoded_block_sizes[first_block..=last_block]
        .iter()
        .map(encoded_size)
        .sum();

    Ok(OffsetAndLength::new(offset, length))
}

/// Everything a decoder needs besides the encoded bytes
#[derive(Debug, Clone)]
pub struct DecodingParams<'a> {
    pub compression: CompressionFormat,
    pub encryption_key: Option<&'a [u8; 32]>,
    pub block_size: u32,
    pub total_raw_size: u64,
    /// Raw offset of the first requested byte
    pub raw_offset: u64,
    /// Offset of the encoded bytes within the encoded chunk
    pub encoded_offset: u64,
    pub encoded_block_sizes: &'a [u32],
}

/// Turns encoded chunk bytes back into raw bytes
pub trait ChunkDecoder: Send + Sync {
    /// Fill `raw_out` with raw bytes starting at `params.raw_offset`
    fn decode(&self, params: &DecodingParams<'_>, encoded: &[u8], raw_out: &mut [u8])
        -> CacheResult<()>;
}

/// Decoder for chunks stored uncompressed and unencrypted
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDecoder;

impl ChunkDecoder for PassthroughDecoder {
    fn decode(
        &self,
        params: &DecodingParams<'_>,
        encoded: &[u8],
        raw_out: &mut [u8],
    ) -> CacheResult<()> {
        let fail = |reason: String| HoardError::Decode {
            chunk: format!("offset {}", params.raw_offset),
            reason,
        };

        if params.compression.is_compressed() {
            return Err(fail(format!(
                "{} compression is not supported",
                params.compression
            )));
        }
        if params.encryption_key.is_some() {
            return Err(fail("encrypted chunks are not supported".to_string()));
        }

        // Without compression the encoded bytes start at the first covered block
        let skip = if params.encoded_block_sizes.is_empty() || params.block_size == 0 {
            0
        } else {
            params.raw_offset % u64::from(params.block_size)
        } as usize;

        let end = skip + raw_out.len();
        if end > encoded.len() {
            return Err(fail(format!(
                "need {} encoded bytes, have {}",
                end,
                encoded.len()
            )));
        }

        raw_out.copy_from_slice(&encoded[skip..end]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unblocked_range_is_identity() {
        let range = chunk_range(100, 0, &[], 10, 20, false).unwrap();
        assert_eq!(range, OffsetAndLength::new(10, 20));
        assert_eq!(range.end(), 30);
    }

    #[test]
    fn test_blocked_range() {
        // 3 raw blocks of 64 bytes, last one partial
        let blocks = [40, 50, 10];
        assert_eq!(
            chunk_range(150, 64, &blocks, 0, 150, false).unwrap(),
            OffsetAndLength::new(0, 100)
        );
        assert_eq!(
            chunk_range(150, 64, &blocks, 70, 10, false).unwrap(),
            OffsetAndLength::new(40, 50)
        );
        assert_eq!(
            chunk_range(150, 64, &blocks, 63, 2, false).unwrap(),
            OffsetAndLength::new(0, 90)
        );
    }

    #[test]
    fn test_encrypted_blocks_are_aligned() {
        let blocks = [40, 50, 10];
        assert_eq!(
            chunk_range(150, 64, &blocks, 130, 20, true).unwrap(),
            OffsetAndLength::new(48 + 64, 16)
        );
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(chunk_range(100, 0, &[], 90, 20, false).is_err());
        assert!(chunk_range(100, 0, &[50, 50], 0, 10, false).is_err());
        assert!(chunk_range(100, 64, &[50], 0, 10, false).is_err());
        assert!(chunk_range(100, 0, &[], u64::MAX, 2, false).is_err());
    }

    #[test]
    fn test_passthrough_decode() {
        let raw: Vec<u8> = (0..150u8).collect();
        let blocks = [64, 64, 22];
        let range = chunk_range(150, 64, &blocks, 70, 10, false).unwrap();
        let encoded = &raw[range.offset as usize..range.end() as usize];

        let params = DecodingParams {
            compression: CompressionFormat::None,
            encryption_key: None,
            block_size: 64,
            total_raw_size: 150,
            raw_offset: 70,
            encoded_offset: range.offset,
            encoded_block_sizes: &blocks,
        };
        let mut out = vec![0u8; 10];
        PassthroughDecoder.decode(&params, encoded, &mut out).unwrap();
        assert_eq!(out, &raw[70..80]);
    }

    #[test]
    fn test_passthrough_rejects_encoded_chunks() {
        let key = [7u8; 32];
        let mut params = DecodingParams {
            compression: CompressionFormat::Zstd,
            encryption_key: None,
            block_size: 0,
            total_raw_size: 4,
            raw_offset: 0,
            encoded_offset: 0,
            encoded_block_sizes: &[],
        };
        let mut out = [0u8; 4];
        assert!(PassthroughDecoder.decode(&params, b"abcd", &mut out).is_err());

        params.compression = CompressionFormat::None;
        params.encryption_key = Some(&key);
        assert!(PassthroughDecoder.decode(&params, b"abcd", &mut out).is_err());

        params.encryption_key = None;
        assert!(PassthroughDecoder.decode(&params, b"ab", &mut out).is_err());
        PassthroughDecoder.decode(&params, b"abcd", &mut out).unwrap();
        assert_eq!(&out, b"abcd");
    }
}
