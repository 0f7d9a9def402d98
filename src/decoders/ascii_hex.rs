//! ASCIIHexDecode implementation.
//!
//! Pairs of hex digits become bytes; whitespace is ignored; `>` marks end
//! of data; an odd trailing digit is padded with zero.

use crate::error::{Error, Result};
use crate::lexer::is_whitespace;

/// Decode ASCII-hex data up to the `>` EOD marker (or end of input).
pub fn ascii_hex_decode(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() / 2);
    let mut hi: Option<u8> = None;

    for &c in input {
        let digit = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            b'>' => break,
            c if is_whitespace(c) => continue,
            other => {
                return Err(Error::syntax(format!(
                    "invalid character 0x{other:02X} in ASCIIHex data"
                )));
            },
        };
        match hi.take() {
            Some(h) => out.push((h << 4) | digit),
            None => hi = Some(digit),
        }
    }
    if let Some(h) = hi {
        out.push(h << 4);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        assert_eq!(ascii_hex_decode(b"48656C6C6F>").unwrap(), b"Hello");
    }

    #[test]
    fn test_whitespace_ignored() {
        assert_eq!(ascii_hex_decode(b"48 65\n6C 6C 6F>").unwrap(), b"Hello");
    }

    #[test]
    fn test_odd_digit_padded() {
        assert_eq!(ascii_hex_decode(b"901FA>").unwrap(), vec![0x90, 0x1F, 0xA0]);
    }

    #[test]
    fn test_missing_eod_tolerated() {
        assert_eq!(ascii_hex_decode(b"4142").unwrap(), b"AB");
    }

    #[test]
    fn test_invalid_character() {
        assert!(ascii_hex_decode(b"41ZZ>").is_err());
    }
}
