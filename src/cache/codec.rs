//! Transparent gzip codec for cached payloads.
//!
//! Large analytics products (period statistics, MMR histories) are stored
//! compressed; small ones skip the codec entirely via their cache policy.
//! The codec is symmetric: `decompress(compress(x)) == x`.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::CacheError;

/// Compress a serialized payload.
///
/// # Errors
///
/// Returns [`CacheError::Codec`] if the encoder fails.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(|e| CacheError::Codec {
        message: format!("gzip encode failed: {e}"),
    })?;
    encoder.finish().map_err(|e| CacheError::Codec {
        message: format!("gzip finish failed: {e}"),
    })
}

/// Decompress a payload previously produced by [`compress`].
///
/// # Errors
///
/// Returns [`CacheError::Codec`] if the payload is not valid gzip.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CacheError::Codec {
            message: format!("gzip decode failed: {e}"),
        })?;
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trip_preserves_payload() {
        let payload = br#"{"period":"week","total_games":42}"#;
        let packed = compress(payload).unwrap();
        assert_eq!(decompress(&packed).unwrap(), payload);
    }

    #[test]
    fn garbage_input_is_a_codec_error() {
        let err = decompress(b"definitely not gzip").unwrap_err();
        assert!(matches!(err, CacheError::Codec { .. }));
    }

    proptest! {
        #[test]
        fn codec_is_symmetric(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let packed = compress(&payload).unwrap();
            prop_assert_eq!(decompress(&packed).unwrap(), payload);
        }
    }
}
