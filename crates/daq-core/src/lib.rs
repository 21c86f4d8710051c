//! `daq-core`
//!
//! Core types shared by every stage of the frame synchronization engine.
//!
//! A detector stream delivers [`Frame`]s (compressed pixel payloads with a
//! sequence id and timestamp) while a handful of metadata channels (motor
//! positions, energy, UB matrix, ROI bounds) publish [`MetadataUpdate`]s at
//! their own rate. The engine decodes each frame, pairs it with the metadata
//! valid at acquisition time and produces a [`SyncRecord`].
//!
//! ## Key Types
//!
//! - [`Frame`]: inbound detector frame, still encoded
//! - [`TypedBuffer`]: decoded flat numeric buffer, one variant per [`ElementType`]
//! - [`DecodedArray`]: typed buffer plus its row-major shape
//! - [`MetadataValue`]: tagged union for channel values (number or text)
//! - [`AssociationOutcome`]: how a channel was paired with a frame
//! - [`SyncRecord`]: the synchronized output record
//! - [`DaqError`]: shared error type for construction and validation failures

pub mod data;
pub mod error;
pub mod limits;
pub mod metadata;
pub mod record;
pub mod timestamp;

pub use data::{CodecKind, CodecParams, DecodedArray, ElementType, Frame, TypedBuffer};
pub use error::{AppResult, DaqError};
pub use metadata::{AssociationOutcome, ChannelAttribute, MetadataUpdate, MetadataValue};
pub use record::SyncRecord;
pub use timestamp::Timestamp;
