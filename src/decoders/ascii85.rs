//! ASCII85Decode implementation.
//!
//! Groups of five characters in `!`..`u` encode four bytes base-85. `z` is
//! shorthand for four zero bytes. `~>` marks end of data. A final partial
//! group of n chars yields n-1 bytes.

use crate::error::{Error, Result};
use crate::lexer::is_whitespace;

/// Decode ASCII-85 data up to the `~>` EOD marker (or end of input).
pub fn ascii85_decode(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut count = 0usize;
    let mut i = 0usize;

    // Optional <~ prefix used by some generators
    let data = if input.starts_with(b"<~") { &input[2..] } else { input };

    while i < data.len() {
        let c = data[i];
        i += 1;
        if is_whitespace(c) {
            continue;
        }
        if c == b'~' {
            break;
        }
        if c == b'z' {
            if count != 0 {
                return Err(Error::syntax("'z' inside ASCII85 group"));
            }
            out.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        if !(b'!'..=b'u').contains(&c) {
            return Err(Error::syntax(format!("invalid character 0x{c:02X} in ASCII85 data")));
        }
        group[count] = c - b'!';
        count += 1;
        if count == 5 {
            let value = group.iter().fold(0u32, |acc, &d| {
                acc.wrapping_mul(85).wrapping_add(d as u32)
            });
            out.extend_from_slice(&value.to_be_bytes());
            count = 0;
        }
    }

    // Partial final group: pad with 'u' (84), emit count-1 bytes
    if count == 1 {
        return Err(Error::syntax("single trailing character in ASCII85 data"));
    }
    if count > 1 {
        for slot in group.iter_mut().skip(count) {
            *slot = 84;
        }
        let value = group.iter().fold(0u32, |acc, &d| {
            acc.wrapping_mul(85).wrapping_add(d as u32)
        });
        out.extend_from_slice(&value.to_be_bytes()[..count - 1]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_groups() {
        // "Man " encodes to 9jqo^ per the classic example
        assert_eq!(ascii85_decode(b"9jqo^~>").unwrap(), b"Man ");
    }

    #[test]
    fn test_partial_group() {
        // "sure" -> F*2M7 ; "s" alone -> F)
        assert_eq!(ascii85_decode(b"F*2M7~>").unwrap(), b"sure");
    }

    #[test]
    fn test_z_shorthand() {
        assert_eq!(ascii85_decode(b"z~>").unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_whitespace_and_prefix() {
        assert_eq!(ascii85_decode(b"<~9j qo\n^~>").unwrap(), b"Man ");
    }

    #[test]
    fn test_invalid_char() {
        assert!(ascii85_decode(b"9jqo\x7f~>").is_err());
    }
}
