//! Corrupted or truncated payloads must surface as errors, never panics.

use daq_codec::{decode, encode, CodecError};
use daq_core::{CodecKind, CodecParams, ElementType};
use proptest::prelude::*;

const CODECS: [CodecKind; 3] = [CodecKind::Bslz4, CodecKind::Lz4, CodecKind::Blosc];

fn frame_bytes() -> Vec<u8> {
    (0..4096u32)
        .flat_map(|i| ((i % 64) as u16 + (i / 512) as u16).to_le_bytes())
        .collect()
}

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic(payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
        for codec in CODECS {
            let _ = decode(&payload, codec, 1024, ElementType::U16);
        }
    }

    #[test]
    fn bit_flips_are_detected_or_decode_to_right_size(
        index in 0usize..1_000,
        flip in 1u8..=255,
    ) {
        let raw = frame_bytes();
        for codec in CODECS {
            let mut payload = encode(&raw, codec, ElementType::U16, &CodecParams::default()).unwrap();
            let i = index % payload.len();
            payload[i] ^= flip;
            if let Ok(buffer) = decode(&payload, codec, raw.len() as u64, ElementType::U16) {
                prop_assert_eq!(buffer.len(), raw.len() / 2);
            }
        }
    }

    #[test]
    fn truncation_is_rejected(cut in 1usize..64) {
        let raw = frame_bytes();
        for codec in CODECS {
            let payload = encode(&raw, codec, ElementType::U16, &CodecParams::default()).unwrap();
            let keep = payload.len().saturating_sub(cut);
            prop_assert!(decode(&payload[..keep], codec, raw.len() as u64, ElementType::U16).is_err());
        }
    }
}

#[test]
fn decode_failure_names_the_codec() {
    let err = decode(&[0xde, 0xad], CodecKind::Blosc, 8, ElementType::U8).unwrap_err();
    assert!(matches!(err, CodecError::DecodeFailure { codec: CodecKind::Blosc, .. }));
    assert!(err.to_string().starts_with("blosc decode failed"));
}
