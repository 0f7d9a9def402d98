//! LZWDecode implementation.
//!
//! PDF's LZW: MSB-first bit order, 9-bit initial codes growing to 12,
//! clear code 256, EOD 257, and EarlyChange=1 by default (code width grows
//! one code early). weezl handles the default case; the EarlyChange=0
//! variant and malformed tails fall back to a hand-rolled decoder.

use crate::error::{Error, Result};

/// Decompress LZW data.
pub fn lzw_decode(input: &[u8], early_change: bool) -> Result<Vec<u8>> {
    if early_change {
        use weezl::{BitOrder, decode::Decoder as WeezlDecoder};
        let mut decoder = WeezlDecoder::new(BitOrder::Msb, 8);
        match decoder.decode(input) {
            Ok(out) => return Ok(out),
            Err(e) => {
                log::warn!("LZWDecode: weezl failed ({e:?}), using fallback decoder");
            },
        }
    }
    lzw_decode_custom(input, early_change)
}

/// Spec-exact LZW decoder covering EarlyChange=0 and damaged tails.
fn lzw_decode_custom(input: &[u8], early_change: bool) -> Result<Vec<u8>> {
    const CLEAR: u16 = 256;
    const EOD: u16 = 257;
    const FIRST: u16 = 258;
    const MAX_CODE: u16 = 4095;

    let mut out = Vec::with_capacity(input.len() * 3);
    // table[i] = (prefix code or u16::MAX, final byte)
    let mut table: Vec<(u16, u8)> = Vec::with_capacity(4096);
    let reset = |table: &mut Vec<(u16, u8)>| {
        table.clear();
        for i in 0..256u16 {
            table.push((u16::MAX, i as u8));
        }
        table.push((u16::MAX, 0)); // clear
        table.push((u16::MAX, 0)); // eod
    };
    reset(&mut table);

    let mut bit_pos = 0usize;
    let mut width = 9usize;
    let mut prev: Option<u16> = None;
    let early = if early_change { 1 } else { 0 };

    let expand = |table: &[(u16, u8)], code: u16, out: &mut Vec<u8>| {
        let start = out.len();
        let mut c = code;
        loop {
            let (prefix, byte) = table[c as usize];
            out.push(byte);
            if prefix == u16::MAX {
                break;
            }
            c = prefix;
        }
        out[start..].reverse();
    };

    loop {
        if bit_pos + width > input.len() * 8 {
            // Ran off the end without EOD: tolerate, the data ends here
            break;
        }
        let mut code = 0u16;
        for i in 0..width {
            let bit = (input[(bit_pos + i) / 8] >> (7 - (bit_pos + i) % 8)) & 1;
            code = (code << 1) | bit as u16;
        }
        bit_pos += width;

        match code {
            CLEAR => {
                reset(&mut table);
                width = 9;
                prev = None;
            },
            EOD => break,
            code => {
                let next_entry = table.len() as u16;
                if code < next_entry {
                    expand(&table, code, &mut out);
                    if let Some(p) = prev {
                        let first_byte = out[out.len() - {
                            // length of expansion of `code`
                            let mut len = 1usize;
                            let mut c = code;
                            while table[c as usize].0 != u16::MAX {
                                c = table[c as usize].0;
                                len += 1;
                            }
                            len
                        }];
                        if next_entry <= MAX_CODE {
                            table.push((p, first_byte));
                        }
                    }
                } else if code == next_entry {
                    // KwKwK case: expansion of prev + first byte of prev
                    let p = prev.ok_or_else(|| Error::syntax("LZW code before any output"))?;
                    let start = out.len();
                    expand(&table, p, &mut out);
                    let first = out[start];
                    out.push(first);
                    if next_entry <= MAX_CODE {
                        table.push((p, first));
                    }
                } else {
                    return Err(Error::syntax(format!("LZW code {code} out of range")));
                }
                prev = Some(code);

                let limit = table.len() + early;
                width = match limit {
                    l if l >= 4096 => 12,
                    l if l >= 2048 => 12,
                    l if l >= 1024 => 11,
                    l if l >= 512 => 10,
                    _ => 9,
                };
            },
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lzw_encode(data: &[u8]) -> Vec<u8> {
        use weezl::{BitOrder, encode::Encoder};
        Encoder::new(BitOrder::Msb, 8).encode(data).unwrap()
    }

    #[test]
    fn test_round_trip_via_weezl() {
        let data = b"TOBEORNOTTOBEORTOBEORNOT";
        assert_eq!(lzw_decode(&lzw_encode(data), true).unwrap(), data);
    }

    #[test]
    fn test_custom_decoder_matches() {
        let data = b"aaaaaaaaaabbbbbbbbbbababababab".repeat(4);
        let encoded = lzw_encode(&data);
        assert_eq!(lzw_decode_custom(&encoded, true).unwrap(), data);
    }

    #[test]
    fn test_empty_input() {
        assert!(lzw_decode(&[], true).unwrap().is_empty());
    }
}
