//! Bitshuffle transform and the `bslz4` block stream.
//!
//! Bitshuffle regroups a block of `n` elements (`n` a multiple of 8) by bit
//! plane: bit `k` of byte `j` of element `i` lands in bit `i % 8` of byte
//! `(j * 8 + k) * n / 8 + i / 8`. Detector pixels rarely use their high bits,
//! so most planes become runs of zeros that LZ4 compresses well.
//!
//! The `bslz4` stream carries no header. It is a sequence of blocks, each a
//! big-endian `u32` compressed length followed by an LZ4 block holding one
//! bitshuffled block. All blocks but the last hold `block_size` elements; the
//! last holds the remainder rounded down to a multiple of 8, and the final
//! `< 8` elements follow as raw bytes.

use crate::error::{CodecError, CodecResult};
use crate::lz4::decompress_block;
use daq_core::CodecKind;

/// Target uncompressed block size in bytes.
const TARGET_BLOCK_BYTES: usize = 8192;
/// Smallest recommended block, in elements.
const MIN_BLOCK_ELEMENTS: usize = 128;
/// Block sizes are multiples of this many elements.
pub const BLOCKED_MULT: usize = 8;

/// Default block size in elements for an element size in bytes.
pub fn default_block_size(element_size: usize) -> usize {
    let elements = TARGET_BLOCK_BYTES / element_size.max(1) / BLOCKED_MULT * BLOCKED_MULT;
    elements.max(MIN_BLOCK_ELEMENTS)
}

/// Bitshuffle `n = input.len() / element_size` elements.
///
/// `n` must be a multiple of 8; callers handle the remainder.
pub fn shuffle(input: &[u8], element_size: usize) -> Vec<u8> {
    let n = input.len() / element_size;
    debug_assert_eq!(n % BLOCKED_MULT, 0);
    let row = n / 8;
    let mut out = vec![0u8; input.len()];
    for (i, element) in input.chunks_exact(element_size).enumerate() {
        let (byte, bit) = (i / 8, i % 8);
        for (j, &value) in element.iter().enumerate() {
            if value == 0 {
                continue;
            }
            for k in 0..8 {
                if value >> k & 1 != 0 {
                    out[(j * 8 + k) * row + byte] |= 1 << bit;
                }
            }
        }
    }
    out
}

/// Invert [`shuffle`] into `out`, which must have the same length as `input`.
pub fn unshuffle_into(input: &[u8], element_size: usize, out: &mut [u8]) {
    let n = input.len() / element_size;
    debug_assert_eq!(n % BLOCKED_MULT, 0);
    debug_assert_eq!(out.len(), input.len());
    let row = n / 8;
    out.fill(0);
    for plane in 0..element_size * 8 {
        let (j, k) = (plane / 8, plane % 8);
        let bits = &input[plane * row..(plane + 1) * row];
        for (byte, &packed) in bits.iter().enumerate() {
            if packed == 0 {
                continue;
            }
            for bit in 0..8 {
                if packed >> bit & 1 != 0 {
                    out[(byte * 8 + bit) * element_size + j] |= 1 << k;
                }
            }
        }
    }
}

/// Invert [`shuffle`].
pub fn unshuffle(input: &[u8], element_size: usize) -> Vec<u8> {
    let mut out = vec![0u8; input.len()];
    unshuffle_into(input, element_size, &mut out);
    out
}

/// Element counts of each LZ4 block for `n` elements, plus the raw tail length.
fn block_layout(n: usize, block_size: usize) -> (Vec<usize>, usize) {
    let mut blocks = vec![block_size; n / block_size];
    let last = n % block_size;
    let last = last - last % BLOCKED_MULT;
    if last > 0 {
        blocks.push(last);
    }
    (blocks, n % BLOCKED_MULT)
}

fn validate_block_size(block_size: usize) -> CodecResult<usize> {
    if block_size == 0 || block_size % BLOCKED_MULT != 0 {
        return Err(CodecError::failure(
            CodecKind::Bslz4,
            format!("block size {block_size} is not a positive multiple of {BLOCKED_MULT}"),
        ));
    }
    Ok(block_size)
}

/// Decode a `bslz4` stream into `uncompressed_size` bytes.
///
/// `uncompressed_size` must already be a whole number of elements.
pub fn decode(
    payload: &[u8],
    uncompressed_size: usize,
    element_size: usize,
    block_size: Option<usize>,
) -> CodecResult<Vec<u8>> {
    if element_size == 0 || uncompressed_size % element_size != 0 {
        return Err(CodecError::SizeMismatch {
            expected: uncompressed_size - uncompressed_size % element_size.max(1),
            actual: uncompressed_size,
        });
    }
    let block_size =
        validate_block_size(block_size.unwrap_or_else(|| default_block_size(element_size)))?;
    let n = uncompressed_size / element_size;
    let (blocks, tail) = block_layout(n, block_size);

    let mut out = vec![0u8; uncompressed_size];
    let mut cursor = 0usize;
    let mut written = 0usize;
    for (index, elements) in blocks.into_iter().enumerate() {
        let header = payload.get(cursor..cursor + 4).ok_or_else(|| {
            CodecError::failure(CodecKind::Bslz4, format!("stream truncated before block {index}"))
        })?;
        let compressed = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        cursor += 4;
        let body = cursor
            .checked_add(compressed)
            .and_then(|end| payload.get(cursor..end))
            .ok_or_else(|| {
                CodecError::failure(
                    CodecKind::Bslz4,
                    format!(
                        "block {index} declares {compressed} bytes, {} remain",
                        payload.len() - cursor
                    ),
                )
            })?;
        cursor += compressed;

        let bytes = elements * element_size;
        let shuffled = decompress_block(CodecKind::Bslz4, body, bytes)?;
        unshuffle_into(&shuffled, element_size, &mut out[written..written + bytes]);
        written += bytes;
    }

    let tail_bytes = tail * element_size;
    let raw = payload.get(cursor..cursor + tail_bytes).ok_or_else(|| {
        CodecError::failure(CodecKind::Bslz4, "stream truncated in trailing elements")
    })?;
    out[written..].copy_from_slice(raw);
    cursor += tail_bytes;

    if cursor != payload.len() {
        return Err(CodecError::failure(
            CodecKind::Bslz4,
            format!("{} trailing bytes after last block", payload.len() - cursor),
        ));
    }
    Ok(out)
}

/// Encode raw little-endian elements as a `bslz4` stream.
pub fn encode(raw: &[u8], element_size: usize, block_size: Option<usize>) -> CodecResult<Vec<u8>> {
    if element_size == 0 || raw.len() % element_size != 0 {
        return Err(CodecError::SizeMismatch {
            expected: raw.len() - raw.len() % element_size.max(1),
            actual: raw.len(),
        });
    }
    let block_size =
        validate_block_size(block_size.unwrap_or_else(|| default_block_size(element_size)))?;
    let n = raw.len() / element_size;
    let (blocks, _) = block_layout(n, block_size);

    let mut out = Vec::with_capacity(raw.len() / 2);
    let mut offset = 0usize;
    for elements in blocks {
        let bytes = elements * element_size;
        let compressed = lz4_flex::block::compress(&shuffle(&raw[offset..offset + bytes], element_size));
        out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        out.extend_from_slice(&compressed);
        offset += bytes;
    }
    out.extend_from_slice(&raw[offset..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_u16(n: usize) -> Vec<u8> {
        (0..n as u16).flat_map(|v| (v % 1000).to_le_bytes()).collect()
    }

    #[test]
    fn test_default_block_size() {
        assert_eq!(default_block_size(1), 8192);
        assert_eq!(default_block_size(2), 4096);
        assert_eq!(default_block_size(4), 2048);
        assert_eq!(default_block_size(8), 1024);
        assert_eq!(default_block_size(128), 128);
    }

    #[test]
    fn test_shuffle_bit_planes() {
        // Eight u8 elements, only element 3 has bit 1 set.
        let input = [0, 0, 0, 0b10, 0, 0, 0, 0];
        let shuffled = shuffle(&input, 1);
        assert_eq!(shuffled, vec![0, 0b1000, 0, 0, 0, 0, 0, 0]);
        assert_eq!(unshuffle(&shuffled, 1), input);
    }

    #[test]
    fn test_shuffle_inverts_for_wide_elements() {
        let input: Vec<u8> = (0..64u32).flat_map(|v| v.wrapping_mul(2_654_435_761).to_le_bytes()).collect();
        assert_eq!(unshuffle(&shuffle(&input, 4), 4), input);
    }

    #[test]
    fn test_layout_with_partial_last_block_and_tail() {
        let (blocks, tail) = block_layout(4096 + 21, 4096);
        assert_eq!(blocks, vec![4096, 16]);
        assert_eq!(tail, 5);
    }

    #[test]
    fn test_decode_multi_block_stream() {
        let raw = ramp_u16(10_003);
        let payload = encode(&raw, 2, None).unwrap();
        assert!(payload.len() < raw.len());
        assert_eq!(decode(&payload, raw.len(), 2, None).unwrap(), raw);
    }

    #[test]
    fn test_decode_custom_block_size() {
        let raw = ramp_u16(1000);
        let payload = encode(&raw, 2, Some(256)).unwrap();
        assert_eq!(decode(&payload, raw.len(), 2, Some(256)).unwrap(), raw);
        assert!(decode(&payload, raw.len(), 2, None).is_err());
    }

    #[test]
    fn test_tiny_frame_is_stored_raw() {
        let raw = vec![1u8, 2, 3, 4, 5];
        let payload = encode(&raw, 1, None).unwrap();
        assert_eq!(payload, raw);
        assert_eq!(decode(&payload, 5, 1, None).unwrap(), raw);
    }

    #[test]
    fn test_truncated_stream_fails() {
        let raw = ramp_u16(5000);
        let payload = encode(&raw, 2, None).unwrap();
        let err = decode(&payload[..payload.len() - 3], raw.len(), 2, None).unwrap_err();
        assert!(matches!(err, CodecError::DecodeFailure { codec: CodecKind::Bslz4, .. }));
    }

    #[test]
    fn test_corrupt_length_prefix_fails() {
        let raw = ramp_u16(512);
        let mut payload = encode(&raw, 2, None).unwrap();
        payload[0] = 0xff;
        assert!(decode(&payload, raw.len(), 2, None).is_err());
    }

    #[test]
    fn test_trailing_garbage_fails() {
        let raw = ramp_u16(512);
        let mut payload = encode(&raw, 2, None).unwrap();
        payload.push(0);
        assert!(decode(&payload, raw.len(), 2, None).is_err());
    }
}
