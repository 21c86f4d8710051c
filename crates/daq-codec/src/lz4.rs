//! Plain LZ4 block codec.
//!
//! Payloads are raw LZ4 blocks without a size prefix; the decoded size comes
//! from the frame's declared `uncompressed_size`.

use crate::error::{CodecError, CodecResult};
use daq_core::CodecKind;

/// Decompress one LZ4 block into exactly `expected` bytes.
pub(crate) fn decompress_block(
    codec: CodecKind,
    input: &[u8],
    expected: usize,
) -> CodecResult<Vec<u8>> {
    let mut out = vec![0u8; expected];
    decompress_block_into(codec, input, &mut out)?;
    Ok(out)
}

/// Decompress one LZ4 block, requiring it to fill `out` exactly.
pub(crate) fn decompress_block_into(
    codec: CodecKind,
    input: &[u8],
    out: &mut [u8],
) -> CodecResult<()> {
    let written = lz4_flex::block::decompress_into(input, out)
        .map_err(|e| CodecError::failure(codec, format!("LZ4 block: {e}")))?;
    if written != out.len() {
        return Err(CodecError::failure(
            codec,
            format!("LZ4 block produced {written} bytes, expected {}", out.len()),
        ));
    }
    Ok(())
}

/// Decode an `lz4` payload.
pub fn decode(payload: &[u8], uncompressed_size: usize) -> CodecResult<Vec<u8>> {
    let mut out = vec![0u8; uncompressed_size];
    let written = lz4_flex::block::decompress_into(payload, &mut out)
        .map_err(|e| CodecError::failure(CodecKind::Lz4, e.to_string()))?;
    if written != uncompressed_size {
        return Err(CodecError::SizeMismatch {
            expected: uncompressed_size,
            actual: written,
        });
    }
    Ok(out)
}

/// Encode raw bytes as an `lz4` payload.
pub fn encode(raw: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(raw)
}
