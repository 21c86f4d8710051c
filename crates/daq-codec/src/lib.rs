//! `daq-codec`
//!
//! Decoders for detector frame payloads. Every decoder is a pure function from
//! an encoded payload plus its declarations (codec, declared size, element
//! type) to a [`TypedBuffer`]; nothing is retained between calls.
//!
//! | codec   | payload                                                  |
//! |---------|----------------------------------------------------------|
//! | `none`  | raw little-endian elements                               |
//! | `bslz4` | headerless bitshuffle + LZ4 block stream ([`bitshuffle`]) |
//! | `lz4`   | one raw LZ4 block ([`lz4`])                               |
//! | `blosc` | Blosc1 container with the LZ4 compressor ([`blosc`])      |
//!
//! Encoders for the same formats are provided for simulated sources and
//! tests.

pub mod bitshuffle;
pub mod blosc;
pub mod error;
pub mod lz4;
pub mod shuffle;

pub use error::{CodecError, CodecResult};

use daq_core::limits::validate_declared_size;
use daq_core::{CodecKind, CodecParams, ElementType, Frame, TypedBuffer};

/// Decode a payload with default codec parameters.
pub fn decode(
    payload: &[u8],
    codec: CodecKind,
    uncompressed_size: u64,
    element_type: ElementType,
) -> CodecResult<TypedBuffer> {
    decode_with_params(
        payload,
        codec,
        &CodecParams::default(),
        uncompressed_size,
        element_type,
    )
}

/// Decode a payload into a typed buffer of `uncompressed_size` bytes.
///
/// The declared size is checked against the frame limit before anything is
/// allocated, and must be a whole number of elements.
pub fn decode_with_params(
    payload: &[u8],
    codec: CodecKind,
    params: &CodecParams,
    uncompressed_size: u64,
    element_type: ElementType,
) -> CodecResult<TypedBuffer> {
    let size = validate_declared_size(uncompressed_size)?;
    let element_size = element_type.size();
    if size % element_size != 0 {
        return Err(CodecError::SizeMismatch {
            expected: size - size % element_size,
            actual: size,
        });
    }

    let bytes = match codec {
        CodecKind::None => {
            if payload.len() != size {
                return Err(CodecError::SizeMismatch {
                    expected: size,
                    actual: payload.len(),
                });
            }
            return Ok(TypedBuffer::from_le_bytes(element_type, payload)?);
        }
        CodecKind::Bslz4 => bitshuffle::decode(payload, size, element_size, params.block_size)?,
        CodecKind::Lz4 => lz4::decode(payload, size)?,
        CodecKind::Blosc => blosc::decode(payload, size)?,
    };
    Ok(TypedBuffer::from_le_bytes(element_type, &bytes)?)
}

/// Decode a frame, resolving its codec tag first.
///
/// An unrecognised tag is [`CodecError::UnsupportedCodec`].
pub fn decode_frame(frame: &Frame) -> CodecResult<TypedBuffer> {
    let codec: CodecKind = frame
        .codec
        .parse()
        .map_err(|_| CodecError::UnsupportedCodec(frame.codec.clone()))?;
    decode_with_params(
        &frame.payload,
        codec,
        &frame.codec_params,
        frame.uncompressed_size,
        frame.element_type,
    )
}

/// Encode raw little-endian elements with `codec`.
///
/// `blosc` uses the LZ4 compressor with byte shuffle.
pub fn encode(
    raw: &[u8],
    codec: CodecKind,
    element_type: ElementType,
    params: &CodecParams,
) -> CodecResult<Vec<u8>> {
    match codec {
        CodecKind::None => Ok(raw.to_vec()),
        CodecKind::Bslz4 => bitshuffle::encode(raw, element_type.size(), params.block_size),
        CodecKind::Lz4 => Ok(lz4::encode(raw)),
        CodecKind::Blosc => blosc::encode(raw, element_type.size(), blosc::Filter::Shuffle, None),
    }
}

/// Encode a typed buffer into a ready-to-process frame.
pub fn encode_frame(
    sequence_id: i64,
    timestamp: f64,
    shape: Vec<u32>,
    data: &TypedBuffer,
    codec: CodecKind,
) -> CodecResult<Frame> {
    let raw = data.to_le_bytes();
    let payload = encode(&raw, codec, data.element_type(), &CodecParams::default())?;
    Ok(Frame::encoded(
        sequence_id,
        timestamp,
        shape,
        data.element_type(),
        codec,
        raw.len() as u64,
        payload,
    ))
}
