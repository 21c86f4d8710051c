//! Frame and array types.
//!
//! [`Frame`] is what the transport hands us: an encoded payload plus the
//! declarations needed to decode it. [`TypedBuffer`] is the decoded flat
//! buffer and [`DecodedArray`] attaches a row-major shape to it.

use crate::error::{AppResult, DaqError};
use crate::limits::validate_frame_size;
use crate::timestamp::Timestamp;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// ElementType
// =============================================================================

/// Numeric element type of a detector frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ElementType {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            ElementType::U8 | ElementType::I8 => 1,
            ElementType::U16 | ElementType::I16 => 2,
            ElementType::U32 | ElementType::I32 | ElementType::F32 => 4,
            ElementType::U64 | ElementType::I64 | ElementType::F64 => 8,
        }
    }

    /// Canonical dtype name used in export layouts (`uint16`, `float32`, ...).
    pub const fn dtype_name(self) -> &'static str {
        match self {
            ElementType::U8 => "uint8",
            ElementType::I8 => "int8",
            ElementType::U16 => "uint16",
            ElementType::I16 => "int16",
            ElementType::U32 => "uint32",
            ElementType::I32 => "int32",
            ElementType::U64 => "uint64",
            ElementType::I64 => "int64",
            ElementType::F32 => "float32",
            ElementType::F64 => "float64",
        }
    }

    /// Map an NTNDArray value-union field name (`ushortValue`, `floatValue`, ...).
    pub fn from_pva_field(field: &str) -> Result<Self, DaqError> {
        let element = match field {
            "byteValue" => ElementType::I8,
            "ubyteValue" => ElementType::U8,
            "shortValue" => ElementType::I16,
            "ushortValue" => ElementType::U16,
            "intValue" => ElementType::I32,
            "uintValue" => ElementType::U32,
            "longValue" => ElementType::I64,
            "ulongValue" => ElementType::U64,
            "floatValue" => ElementType::F32,
            "doubleValue" => ElementType::F64,
            other => return Err(DaqError::UnknownElementType(other.to_string())),
        };
        Ok(element)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dtype_name())
    }
}

impl FromStr for ElementType {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let element = match s.to_ascii_lowercase().as_str() {
            "u8" | "uint8" => ElementType::U8,
            "i8" | "int8" => ElementType::I8,
            "u16" | "uint16" => ElementType::U16,
            "i16" | "int16" => ElementType::I16,
            "u32" | "uint32" => ElementType::U32,
            "i32" | "int32" => ElementType::I32,
            "u64" | "uint64" => ElementType::U64,
            "i64" | "int64" => ElementType::I64,
            "f32" | "float32" => ElementType::F32,
            "f64" | "float64" => ElementType::F64,
            _ => return Err(DaqError::UnknownElementType(s.to_string())),
        };
        Ok(element)
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Compression scheme applied to a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Raw little-endian elements.
    None,
    /// Bitshuffle followed by LZ4 block framing.
    Bslz4,
    /// Plain LZ4 block.
    Lz4,
    /// Blosc1 container.
    Blosc,
}

impl CodecKind {
    /// Tag as used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            CodecKind::None => "none",
            CodecKind::Bslz4 => "bslz4",
            CodecKind::Lz4 => "lz4",
            CodecKind::Blosc => "blosc",
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecKind {
    type Err = DaqError;

    /// The empty tag is what uncompressed NDArrays carry, so it maps to `None`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(CodecKind::None),
            "bslz4" => Ok(CodecKind::Bslz4),
            "lz4" => Ok(CodecKind::Lz4),
            "blosc" => Ok(CodecKind::Blosc),
            _ => Err(DaqError::UnknownCodec(s.to_string())),
        }
    }
}

/// Codec parameters carried alongside the payload.
///
/// The pipeline never interprets these; they are handed to the decoder as is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecParams {
    /// Bitshuffle block size in elements. `None` selects the codec default.
    pub block_size: Option<usize>,
}

// =============================================================================
// Frame
// =============================================================================

/// One detector acquisition as delivered by the transport, still encoded.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Source-assigned, monotonically intended frame id.
    pub sequence_id: i64,
    /// Acquisition time.
    pub timestamp: Timestamp,
    /// Dimensions, fastest-varying first (`[x, y]` for an image).
    pub shape: Vec<u32>,
    /// Declared element type of the decoded buffer.
    pub element_type: ElementType,
    /// Codec tag (`""`, `none`, `bslz4`, `lz4`, `blosc`).
    pub codec: String,
    /// Opaque codec parameters.
    pub codec_params: CodecParams,
    /// Declared decoded size in bytes.
    pub uncompressed_size: u64,
    /// Encoded payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create an uncompressed frame whose payload already holds raw elements.
    pub fn uncompressed(
        sequence_id: i64,
        timestamp: impl Into<Timestamp>,
        shape: Vec<u32>,
        element_type: ElementType,
        payload: impl Into<Bytes>,
    ) -> Self {
        let payload = payload.into();
        Self {
            sequence_id,
            timestamp: timestamp.into(),
            shape,
            element_type,
            codec: String::new(),
            codec_params: CodecParams::default(),
            uncompressed_size: payload.len() as u64,
            payload,
        }
    }

    /// Create a frame with an encoded payload.
    pub fn encoded(
        sequence_id: i64,
        timestamp: impl Into<Timestamp>,
        shape: Vec<u32>,
        element_type: ElementType,
        codec: CodecKind,
        uncompressed_size: u64,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            sequence_id,
            timestamp: timestamp.into(),
            shape,
            element_type,
            codec: codec.as_str().to_string(),
            codec_params: CodecParams::default(),
            uncompressed_size,
            payload: payload.into(),
        }
    }

    /// Attach codec parameters.
    pub fn with_codec_params(mut self, params: CodecParams) -> Self {
        self.codec_params = params;
        self
    }
}

// =============================================================================
// TypedBuffer
// =============================================================================

/// Decoded flat numeric buffer.
///
/// Keeps the detector's native element type; conversion to `f64` happens only
/// when a consumer asks for it.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedBuffer {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

fn collect_le<T, F, const N: usize>(bytes: &[u8], convert: F) -> Vec<T>
where
    F: Fn([u8; N]) -> T,
{
    bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut raw = [0u8; N];
            raw.copy_from_slice(chunk);
            convert(raw)
        })
        .collect()
}

impl TypedBuffer {
    /// Reinterpret little-endian bytes as `element_type`.
    pub fn from_le_bytes(element_type: ElementType, bytes: &[u8]) -> Result<Self, DaqError> {
        let element_size = element_type.size();
        if bytes.len() % element_size != 0 {
            return Err(DaqError::PayloadNotAligned {
                bytes: bytes.len(),
                element_size,
            });
        }

        let buffer = match element_type {
            ElementType::U8 => TypedBuffer::U8(bytes.to_vec()),
            ElementType::I8 => TypedBuffer::I8(bytes.iter().map(|&b| b as i8).collect()),
            ElementType::U16 => TypedBuffer::U16(collect_le(bytes, u16::from_le_bytes)),
            ElementType::I16 => TypedBuffer::I16(collect_le(bytes, i16::from_le_bytes)),
            ElementType::U32 => TypedBuffer::U32(collect_le(bytes, u32::from_le_bytes)),
            ElementType::I32 => TypedBuffer::I32(collect_le(bytes, i32::from_le_bytes)),
            ElementType::U64 => TypedBuffer::U64(collect_le(bytes, u64::from_le_bytes)),
            ElementType::I64 => TypedBuffer::I64(collect_le(bytes, i64::from_le_bytes)),
            ElementType::F32 => TypedBuffer::F32(collect_le(bytes, f32::from_le_bytes)),
            ElementType::F64 => TypedBuffer::F64(collect_le(bytes, f64::from_le_bytes)),
        };
        Ok(buffer)
    }

    /// Serialize back to little-endian bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        fn flatten<T, F, const N: usize>(values: &[T], convert: F) -> Vec<u8>
        where
            T: Copy,
            F: Fn(T) -> [u8; N],
        {
            values.iter().flat_map(|&v| convert(v)).collect()
        }

        match self {
            TypedBuffer::U8(data) => data.clone(),
            TypedBuffer::I8(data) => data.iter().map(|&v| v as u8).collect(),
            TypedBuffer::U16(data) => flatten(data, u16::to_le_bytes),
            TypedBuffer::I16(data) => flatten(data, i16::to_le_bytes),
            TypedBuffer::U32(data) => flatten(data, u32::to_le_bytes),
            TypedBuffer::I32(data) => flatten(data, i32::to_le_bytes),
            TypedBuffer::U64(data) => flatten(data, u64::to_le_bytes),
            TypedBuffer::I64(data) => flatten(data, i64::to_le_bytes),
            TypedBuffer::F32(data) => flatten(data, f32::to_le_bytes),
            TypedBuffer::F64(data) => flatten(data, f64::to_le_bytes),
        }
    }

    /// Element type of this buffer.
    pub fn element_type(&self) -> ElementType {
        match self {
            TypedBuffer::U8(_) => ElementType::U8,
            TypedBuffer::I8(_) => ElementType::I8,
            TypedBuffer::U16(_) => ElementType::U16,
            TypedBuffer::I16(_) => ElementType::I16,
            TypedBuffer::U32(_) => ElementType::U32,
            TypedBuffer::I32(_) => ElementType::I32,
            TypedBuffer::U64(_) => ElementType::U64,
            TypedBuffer::I64(_) => ElementType::I64,
            TypedBuffer::F32(_) => ElementType::F32,
            TypedBuffer::F64(_) => ElementType::F64,
        }
    }

    /// Get the number of elements
    pub fn len(&self) -> usize {
        match self {
            TypedBuffer::U8(data) => data.len(),
            TypedBuffer::I8(data) => data.len(),
            TypedBuffer::U16(data) => data.len(),
            TypedBuffer::I16(data) => data.len(),
            TypedBuffer::U32(data) => data.len(),
            TypedBuffer::I32(data) => data.len(),
            TypedBuffer::U64(data) => data.len(),
            TypedBuffer::I64(data) => data.len(),
            TypedBuffer::F32(data) => data.len(),
            TypedBuffer::F64(data) => data.len(),
        }
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get memory usage in bytes
    pub fn memory_bytes(&self) -> usize {
        self.len() * self.element_type().size()
    }

    /// Convert to f64 for processing/display.
    ///
    /// Returns Cow to avoid allocation for the F64 variant. 64-bit integers
    /// beyond 2^53 lose precision.
    pub fn as_f64(&self) -> Cow<'_, [f64]> {
        match self {
            TypedBuffer::U8(data) => Cow::Owned(data.iter().map(|&v| f64::from(v)).collect()),
            TypedBuffer::I8(data) => Cow::Owned(data.iter().map(|&v| f64::from(v)).collect()),
            TypedBuffer::U16(data) => Cow::Owned(data.iter().map(|&v| f64::from(v)).collect()),
            TypedBuffer::I16(data) => Cow::Owned(data.iter().map(|&v| f64::from(v)).collect()),
            TypedBuffer::U32(data) => Cow::Owned(data.iter().map(|&v| f64::from(v)).collect()),
            TypedBuffer::I32(data) => Cow::Owned(data.iter().map(|&v| f64::from(v)).collect()),
            TypedBuffer::U64(data) => Cow::Owned(data.iter().map(|&v| v as f64).collect()),
            TypedBuffer::I64(data) => Cow::Owned(data.iter().map(|&v| v as f64).collect()),
            TypedBuffer::F32(data) => Cow::Owned(data.iter().map(|&v| f64::from(v)).collect()),
            TypedBuffer::F64(data) => Cow::Borrowed(data.as_slice()),
        }
    }
}

// =============================================================================
// DecodedArray
// =============================================================================

/// A decoded buffer with its row-major shape (slowest-varying dimension first).
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedArray {
    shape: Vec<usize>,
    data: TypedBuffer,
}

impl DecodedArray {
    /// Attach a row-major shape to a buffer.
    pub fn new(shape: Vec<usize>, data: TypedBuffer) -> AppResult<Self> {
        let elements = shape
            .iter()
            .try_fold(1usize, |acc, &extent| acc.checked_mul(extent))
            .ok_or(DaqError::SizeOverflow {
                context: "array element count",
            })?;
        if elements != data.len() {
            return Err(DaqError::ShapeMismatch {
                shape,
                elements: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Reshape from detector dimensions (fastest-varying first) to row-major.
    ///
    /// An empty dimension list yields a flat one-dimensional array. Dimensions
    /// are checked against the frame size limits first.
    pub fn from_detector_dims(dims: &[u32], data: TypedBuffer) -> AppResult<Self> {
        if dims.is_empty() {
            let len = data.len();
            return Self::new(vec![len], data);
        }
        validate_frame_size(dims, data.element_type().size())?;
        let shape = dims.iter().rev().map(|&d| d as usize).collect();
        Self::new(shape, data)
    }

    /// Flat one-dimensional array.
    pub fn flat(data: TypedBuffer) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Row-major shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Underlying buffer.
    pub fn data(&self) -> &TypedBuffer {
        &self.data
    }

    /// Consume and return the underlying buffer.
    pub fn into_data(self) -> TypedBuffer {
        self.data
    }

    /// Element type of the buffer.
    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
