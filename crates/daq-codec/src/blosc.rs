//! Blosc1 container.
//!
//! Layout of a compressed buffer:
//!
//! ```text
//! 0      version        u8
//! 1      versionlz      u8
//! 2      flags          u8   0x1 shuffle, 0x2 memcpyed, 0x4 bitshuffle,
//!                            0x8 delta, 0x10 don't split, 0xe0 compressor
//! 3      typesize       u8
//! 4..8   nbytes         u32 LE  uncompressed size
//! 8..12  blocksize      u32 LE
//! 12..16 cbytes         u32 LE  total compressed size including header
//! 16..   bstarts        u32 LE per block, offset of its first stream
//! ```
//!
//! Each block is stored as one stream, or as `typesize` streams (one per byte
//! position) when it is split. A stream is an `i32` LE length followed by an
//! LZ4 block, or by raw bytes when the length equals the stream size.

use crate::bitshuffle;
use crate::error::{CodecError, CodecResult};
use crate::lz4::decompress_block_into;
use crate::shuffle;
use daq_core::CodecKind;

const HEADER_LEN: usize = 16;
const FLAG_SHUFFLE: u8 = 0x1;
const FLAG_MEMCPYED: u8 = 0x2;
const FLAG_BITSHUFFLE: u8 = 0x4;
const FLAG_DELTA: u8 = 0x8;
const FLAG_DONT_SPLIT: u8 = 0x10;
const COMPRESSOR_LZ4: u8 = 1;
const MAX_SPLITS: usize = 16;
const MIN_SPLIT_ELEMENTS: usize = 128;
/// Format version whose bitshuffle leaves non-multiple-of-8 blocks unshuffled.
const LEGACY_BITSHUFFLE_VERSION: u8 = 2;
/// Format version written by [`encode`].
const FORMAT_VERSION: u8 = 3;
const DEFAULT_BLOCK_BYTES: usize = 64 * 1024;

/// Shuffle filter applied before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    /// No filter.
    None,
    /// Byte shuffle.
    #[default]
    Shuffle,
    /// Bit shuffle.
    BitShuffle,
}

/// Parsed container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Container format version.
    pub version: u8,
    /// Raw flag byte.
    pub flags: u8,
    /// Element size used by the shuffle filters.
    pub typesize: usize,
    /// Uncompressed size.
    pub nbytes: usize,
    /// Uncompressed bytes per block.
    pub blocksize: usize,
    /// Total compressed size, header included.
    pub cbytes: usize,
}

impl Header {
    /// Parse and sanity-check the 16-byte header.
    pub fn parse(payload: &[u8]) -> CodecResult<Self> {
        if payload.len() < HEADER_LEN {
            return Err(failure(format!(
                "buffer of {} bytes is shorter than the header",
                payload.len()
            )));
        }
        let header = Header {
            version: payload[0],
            flags: payload[2],
            typesize: payload[3] as usize,
            nbytes: read_u32(payload, 4) as usize,
            blocksize: read_u32(payload, 8) as usize,
            cbytes: read_u32(payload, 12) as usize,
        };
        if header.cbytes > payload.len() {
            return Err(failure(format!(
                "header declares {} compressed bytes, buffer holds {}",
                header.cbytes,
                payload.len()
            )));
        }
        Ok(header)
    }

    /// Inner compressor code.
    pub fn compressor(&self) -> u8 {
        (self.flags & 0xe0) >> 5
    }

    fn memcpyed(&self) -> bool {
        self.flags & FLAG_MEMCPYED != 0
    }
}

fn failure(reason: impl Into<String>) -> CodecError {
    CodecError::failure(CodecKind::Blosc, reason)
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn split_block(flags: u8, typesize: usize, bsize: usize, leftover_block: bool) -> bool {
    flags & FLAG_DONT_SPLIT == 0
        && typesize <= MAX_SPLITS
        && typesize > 0
        && bsize / typesize >= MIN_SPLIT_ELEMENTS
        && !leftover_block
}

/// Decode a blosc buffer into exactly `uncompressed_size` bytes.
pub fn decode(payload: &[u8], uncompressed_size: usize) -> CodecResult<Vec<u8>> {
    let header = Header::parse(payload)?;
    if header.nbytes != uncompressed_size {
        return Err(CodecError::SizeMismatch {
            expected: uncompressed_size,
            actual: header.nbytes,
        });
    }

    if header.memcpyed() {
        let body = payload
            .get(HEADER_LEN..HEADER_LEN + header.nbytes)
            .ok_or_else(|| failure("memcpyed buffer truncated"))?;
        return Ok(body.to_vec());
    }
    if header.flags & FLAG_DELTA != 0 {
        return Err(failure("delta coding is not supported"));
    }
    if header.compressor() != COMPRESSOR_LZ4 {
        return Err(failure(format!(
            "inner compressor {} is not supported, only LZ4",
            header.compressor()
        )));
    }
    if header.nbytes == 0 {
        return Ok(Vec::new());
    }
    if header.blocksize == 0 {
        return Err(failure("zero block size"));
    }

    let nblocks = header.nbytes.div_ceil(header.blocksize);
    let leftover = header.nbytes % header.blocksize;
    let bstarts_end = HEADER_LEN + nblocks * 4;
    if bstarts_end > header.cbytes {
        return Err(failure("block offset table truncated"));
    }
    let data = &payload[..header.cbytes];

    let mut out = vec![0u8; header.nbytes];
    let mut scratch = vec![0u8; header.blocksize.min(header.nbytes)];
    for block in 0..nblocks {
        let leftover_block = block == nblocks - 1 && leftover > 0;
        let bsize = if leftover_block { leftover } else { header.blocksize };
        let start = read_u32(data, HEADER_LEN + block * 4) as usize;
        if start < bstarts_end || start > data.len() {
            return Err(failure(format!("block {block} offset {start} out of range")));
        }
        let dest = &mut out[block * header.blocksize..block * header.blocksize + bsize];
        decode_block(&header, &data[start..], bsize, leftover_block, dest, &mut scratch[..bsize])
            .map_err(|e| match e {
                CodecError::DecodeFailure { reason, .. } => failure(format!("block {block}: {reason}")),
                other => other,
            })?;
    }
    Ok(out)
}

fn decode_block(
    header: &Header,
    mut src: &[u8],
    bsize: usize,
    leftover_block: bool,
    dest: &mut [u8],
    scratch: &mut [u8],
) -> CodecResult<()> {
    let filtered = header.flags & (FLAG_SHUFFLE | FLAG_BITSHUFFLE) != 0;
    let nsplits = if split_block(header.flags, header.typesize, bsize, leftover_block) {
        header.typesize
    } else {
        1
    };
    let neblock = bsize / nsplits;

    {
        let target: &mut [u8] = if filtered { &mut *scratch } else { &mut *dest };
        for split in 0..nsplits {
            let len = src
                .get(..4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .ok_or_else(|| failure("stream length truncated"))?;
            src = &src[4..];
            let len = usize::try_from(len).map_err(|_| failure("negative stream length"))?;
            let stream = src
                .get(..len)
                .ok_or_else(|| failure(format!("stream declares {len} bytes, {} remain", src.len())))?;
            src = &src[len..];

            let out = &mut target[split * neblock..(split + 1) * neblock];
            if len == neblock {
                out.copy_from_slice(stream);
            } else {
                decompress_block_into(CodecKind::Blosc, stream, out)?;
            }
        }
    }

    if !filtered {
        return Ok(());
    }
    if header.flags & FLAG_SHUFFLE != 0 {
        shuffle::unshuffle_into(header.typesize, scratch, dest);
    } else {
        bit_unshuffle(header, scratch, dest);
    }
    Ok(())
}

fn bit_unshuffle(header: &Header, src: &[u8], dest: &mut [u8]) {
    let typesize = header.typesize.max(1);
    let elements = src.len() / typesize;
    if header.version <= LEGACY_BITSHUFFLE_VERSION && elements % bitshuffle::BLOCKED_MULT != 0 {
        dest.copy_from_slice(src);
        return;
    }
    let whole = (elements - elements % bitshuffle::BLOCKED_MULT) * typesize;
    bitshuffle::unshuffle_into(&src[..whole], typesize, &mut dest[..whole]);
    dest[whole..].copy_from_slice(&src[whole..]);
}

fn bit_shuffle(typesize: usize, src: &[u8]) -> Vec<u8> {
    let elements = src.len() / typesize;
    let whole = (elements - elements % bitshuffle::BLOCKED_MULT) * typesize;
    let mut out = bitshuffle::shuffle(&src[..whole], typesize);
    out.extend_from_slice(&src[whole..]);
    out
}

/// Encode raw bytes into a blosc buffer with the LZ4 inner compressor.
///
/// `block_size` defaults to 64 KiB, rounded down to a multiple of `typesize`.
pub fn encode(
    raw: &[u8],
    typesize: usize,
    filter: Filter,
    block_size: Option<usize>,
) -> CodecResult<Vec<u8>> {
    if typesize == 0 || typesize > u8::MAX as usize {
        return Err(failure(format!("typesize {typesize} out of range")));
    }
    let nbytes = u32::try_from(raw.len()).map_err(|_| failure("buffer exceeds 4 GiB"))?;
    let blocksize = block_size.unwrap_or(DEFAULT_BLOCK_BYTES).min(raw.len()).max(1);
    let blocksize = (blocksize - blocksize % typesize).max(typesize.min(raw.len()).max(1));

    let mut flags = COMPRESSOR_LZ4 << 5;
    flags |= match filter {
        Filter::None => 0,
        Filter::Shuffle => FLAG_SHUFFLE,
        Filter::BitShuffle => FLAG_BITSHUFFLE,
    };

    let nblocks = raw.len().div_ceil(blocksize);
    let mut out = vec![0u8; HEADER_LEN + nblocks * 4];
    for (block, chunk) in raw.chunks(blocksize).enumerate() {
        let offset = out.len() as u32;
        out[HEADER_LEN + block * 4..HEADER_LEN + block * 4 + 4].copy_from_slice(&offset.to_le_bytes());

        let leftover_block = chunk.len() < blocksize;
        let filtered = match filter {
            Filter::None => chunk.to_vec(),
            Filter::Shuffle => shuffle::shuffle(typesize, chunk),
            Filter::BitShuffle => bit_shuffle(typesize, chunk),
        };
        let nsplits = if split_block(flags, typesize, chunk.len(), leftover_block) {
            typesize
        } else {
            1
        };
        for stream in filtered.chunks(chunk.len() / nsplits) {
            let compressed = lz4_flex::block::compress(stream);
            if compressed.is_empty() || compressed.len() >= stream.len() {
                out.extend_from_slice(&(stream.len() as i32).to_le_bytes());
                out.extend_from_slice(stream);
            } else {
                out.extend_from_slice(&(compressed.len() as i32).to_le_bytes());
                out.extend_from_slice(&compressed);
            }
        }
    }

    if out.len() >= raw.len() + HEADER_LEN {
        out.truncate(HEADER_LEN);
        out.extend_from_slice(raw);
        flags |= FLAG_MEMCPYED;
    }

    let cbytes = out.len() as u32;
    out[0] = FORMAT_VERSION;
    out[1] = 1;
    out[2] = flags;
    out[3] = typesize as u8;
    out[4..8].copy_from_slice(&nbytes.to_le_bytes());
    out[8..12].copy_from_slice(&(blocksize as u32).to_le_bytes());
    out[12..16].copy_from_slice(&cbytes.to_le_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector_u16(n: usize) -> Vec<u8> {
        (0..n).flat_map(|i| ((i % 97) as u16 * 3).to_le_bytes()).collect()
    }

    #[test]
    fn test_header_parse() {
        let raw = detector_u16(4096);
        let payload = encode(&raw, 2, Filter::Shuffle, None).unwrap();
        let header = Header::parse(&payload).unwrap();
        assert_eq!(header.typesize, 2);
        assert_eq!(header.nbytes, raw.len());
        assert_eq!(header.cbytes, payload.len());
        assert_eq!(header.compressor(), COMPRESSOR_LZ4);
    }

    #[test]
    fn test_decode_each_filter() {
        let raw = detector_u16(50_000);
        for filter in [Filter::None, Filter::Shuffle, Filter::BitShuffle] {
            let payload = encode(&raw, 2, filter, Some(16 * 1024)).unwrap();
            assert!(payload.len() < raw.len(), "{filter:?} did not compress");
            assert_eq!(decode(&payload, raw.len()).unwrap(), raw, "{filter:?}");
        }
    }

    #[test]
    fn test_leftover_block_with_odd_elements() {
        // 1003 u32 elements with 1000-byte blocks: last block is 12 bytes.
        let raw: Vec<u8> = (0..1003u32).flat_map(|v| (v / 7).to_le_bytes()).collect();
        for filter in [Filter::Shuffle, Filter::BitShuffle] {
            let payload = encode(&raw, 4, filter, Some(1000)).unwrap();
            assert_eq!(decode(&payload, raw.len()).unwrap(), raw, "{filter:?}");
        }
    }

    #[test]
    fn test_incompressible_buffer_is_memcpyed() {
        let raw: Vec<u8> = (0..64u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8).collect();
        let payload = encode(&raw, 1, Filter::None, None).unwrap();
        assert_ne!(payload[2] & FLAG_MEMCPYED, 0);
        assert_eq!(payload.len(), HEADER_LEN + raw.len());
        assert_eq!(decode(&payload, raw.len()).unwrap(), raw);
    }

    #[test]
    fn test_declared_size_mismatch() {
        let raw = detector_u16(1024);
        let payload = encode(&raw, 2, Filter::Shuffle, None).unwrap();
        let err = decode(&payload, raw.len() + 2).unwrap_err();
        assert!(matches!(err, CodecError::SizeMismatch { .. }));
    }

    #[test]
    fn test_unsupported_compressor_rejected() {
        let raw = detector_u16(1024);
        let mut payload = encode(&raw, 2, Filter::Shuffle, None).unwrap();
        // zstd
        payload[2] = (payload[2] & 0x1f) | (4 << 5);
        let err = decode(&payload, raw.len()).unwrap_err();
        match err {
            CodecError::DecodeFailure { reason, .. } => assert!(reason.contains("compressor 4")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_delta_rejected() {
        let raw = detector_u16(1024);
        let mut payload = encode(&raw, 2, Filter::Shuffle, None).unwrap();
        payload[2] |= FLAG_DELTA;
        let err = decode(&payload, raw.len()).unwrap_err();
        assert!(matches!(err, CodecError::DecodeFailure { codec: CodecKind::Blosc, .. }));
    }

    #[test]
    fn test_truncated_buffer_rejected() {
        let raw = detector_u16(4096);
        let payload = encode(&raw, 2, Filter::Shuffle, None).unwrap();
        assert!(decode(&payload[..payload.len() - 10], raw.len()).is_err());
        assert!(decode(&payload[..8], raw.len()).is_err());
    }
}
