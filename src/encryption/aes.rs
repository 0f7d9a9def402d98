//! AES-CBC decryption for PDF content.
//!
//! AES-encrypted strings and streams carry a 16-byte IV prefix followed by
//! ciphertext with PKCS#7 padding. The caller strips the prefix; these
//! functions take key, IV, and ciphertext.

use crate::error::{Error, Result};
use aes::cipher::{BlockDecryptMut, KeyIvInit};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Decrypt AES-128-CBC data and strip PKCS#7 padding.
pub fn aes128_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if key.len() != 16 {
        return Err(Error::Auth("AES-128 key must be 16 bytes".into()));
    }
    decrypt_cbc(data, iv, |buffer| {
        let cipher = Aes128CbcDec::new(key.into(), iv.into());
        cipher
            .decrypt_padded_mut::<aes::cipher::block_padding::NoPadding>(buffer)
            .map(|_| ())
            .map_err(|_| Error::Auth("AES-128 decryption failed".into()))
    })
}

/// Decrypt AES-256-CBC data and strip PKCS#7 padding.
pub fn aes256_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if key.len() != 32 {
        return Err(Error::Auth("AES-256 key must be 32 bytes".into()));
    }
    decrypt_cbc(data, iv, |buffer| {
        let cipher = Aes256CbcDec::new(key.into(), iv.into());
        cipher
            .decrypt_padded_mut::<aes::cipher::block_padding::NoPadding>(buffer)
            .map(|_| ())
            .map_err(|_| Error::Auth("AES-256 decryption failed".into()))
    })
}

/// Decrypt AES-256-CBC with no padding removal (used for the /UE and /OE
/// file-key envelopes, which are exactly 32 bytes).
pub fn aes256_decrypt_no_pad(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if key.len() != 32 {
        return Err(Error::Auth("AES-256 key must be 32 bytes".into()));
    }
    if data.is_empty() || data.len() % 16 != 0 {
        return Err(Error::Auth("AES ciphertext length must be a multiple of 16".into()));
    }
    let mut buffer = data.to_vec();
    let cipher = Aes256CbcDec::new(key.into(), iv.into());
    cipher
        .decrypt_padded_mut::<aes::cipher::block_padding::NoPadding>(&mut buffer)
        .map_err(|_| Error::Auth("AES-256 decryption failed".into()))?;
    Ok(buffer)
}

fn decrypt_cbc(
    data: &[u8],
    iv: &[u8],
    decrypt: impl FnOnce(&mut [u8]) -> Result<()>,
) -> Result<Vec<u8>> {
    if iv.len() != 16 {
        return Err(Error::Auth("AES IV must be 16 bytes".into()));
    }
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() % 16 != 0 {
        return Err(Error::Auth("AES ciphertext length must be a multiple of 16".into()));
    }

    let mut buffer = data.to_vec();
    decrypt(&mut buffer)?;

    // Strip PKCS#7 padding; malformed padding is tolerated with a warning
    // because real files get this wrong.
    let pad = *buffer.last().unwrap_or(&0) as usize;
    if pad >= 1 && pad <= 16 && pad <= buffer.len() {
        let body = buffer.len() - pad;
        if buffer[body..].iter().all(|&b| b as usize == pad) {
            buffer.truncate(body);
            return Ok(buffer);
        }
    }
    log::warn!("AES: malformed PKCS#7 padding, keeping full plaintext");
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    fn encrypt(key: &[u8; 16], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
        let mut padded = data.to_vec();
        let pad = 16 - data.len() % 16;
        padded.extend(std::iter::repeat(pad as u8).take(pad));
        let len = padded.len();
        let cipher = Aes128CbcEnc::new(key.into(), iv.into());
        cipher
            .encrypt_padded_mut::<aes::cipher::block_padding::NoPadding>(&mut padded, len)
            .unwrap();
        padded
    }

    #[test]
    fn test_aes128_round_trip() {
        let key = [7u8; 16];
        let iv = [3u8; 16];
        let plain = b"stream content under test";
        let cipher = encrypt(&key, &iv, plain);
        assert_eq!(aes128_decrypt(&key, &iv, &cipher).unwrap(), plain);
    }

    #[test]
    fn test_bad_key_length() {
        assert!(aes128_decrypt(&[0u8; 5], &[0u8; 16], &[0u8; 16]).is_err());
        assert!(aes256_decrypt(&[0u8; 16], &[0u8; 16], &[0u8; 16]).is_err());
    }

    #[test]
    fn test_empty_ciphertext() {
        assert!(aes128_decrypt(&[0u8; 16], &[0u8; 16], &[]).unwrap().is_empty());
    }
}
