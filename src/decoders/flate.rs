//! FlateDecode (zlib/deflate) implementation.
//!
//! The most common PDF filter. Decoding tries standard zlib first; corrupt
//! files get two recovery attempts: raw deflate (for streams written
//! without the zlib wrapper) and partial output (when the tail of an
//! otherwise valid stream is truncated).

use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// Decompress zlib/deflate data with best-effort recovery.
pub fn flate_decode(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    match ZlibDecoder::new(input).read_to_end(&mut output) {
        Ok(_) => return Ok(output),
        Err(e) => {
            if !output.is_empty() {
                log::warn!(
                    "FlateDecode: partial recovery, {} bytes before corruption: {}",
                    output.len(),
                    e
                );
                return Ok(output);
            }
        },
    }

    // Some generators write raw deflate with no zlib wrapper
    output.clear();
    match DeflateDecoder::new(input).read_to_end(&mut output) {
        Ok(_) => {
            log::info!("FlateDecode: raw deflate fallback succeeded ({} bytes)", output.len());
            Ok(output)
        },
        Err(_) if !output.is_empty() => {
            log::warn!("FlateDecode: raw deflate partial recovery ({} bytes)", output.len());
            Ok(output)
        },
        Err(e) => Err(Error::syntax(format!("FlateDecode failed: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(8);
        assert_eq!(flate_decode(&deflate(&data)).unwrap(), data);
    }

    #[test]
    fn test_truncated_stream_partial_recovery() {
        let data = b"abcdefgh".repeat(64);
        let mut compressed = deflate(&data);
        compressed.truncate(compressed.len() - 4);
        let out = flate_decode(&compressed).unwrap();
        assert!(!out.is_empty());
        assert!(data.starts_with(&out[..out.len().min(data.len())]));
    }

    #[test]
    fn test_garbage_fails() {
        assert!(flate_decode(b"\x00\x01garbage").is_err());
    }
}
