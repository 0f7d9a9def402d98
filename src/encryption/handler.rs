//! Encryption handler: authentication state and content decryption.

use super::aes::{aes128_decrypt, aes256_decrypt, aes256_decrypt_no_pad};
use super::algorithms;
use super::rc4::rc4_apply;
use super::{CryptMethod, Permissions};
use crate::error::{Error, Result};
use crate::object::{Dict, DictExt, ObjRef, Object};
use md5::{Digest, Md5};

/// Parsed /Encrypt dictionary plus authentication state.
///
/// Constructed at document open; `authenticate` derives and stores the
/// document key, after which `decrypt_stream` / `decrypt_string` apply the
/// per-object key schedule.
#[derive(Debug, Clone)]
pub struct EncryptionHandler {
    revision: u32,
    key_length: usize,
    owner_value: Vec<u8>,
    user_value: Vec<u8>,
    owner_encrypted_key: Vec<u8>,
    user_encrypted_key: Vec<u8>,
    permissions: i32,
    encrypt_metadata: bool,
    file_id: Vec<u8>,
    stream_method: CryptMethod,
    string_method: CryptMethod,
    key: Option<Vec<u8>>,
}

impl EncryptionHandler {
    /// Build a handler from the trailer's /Encrypt dictionary and the first
    /// element of /ID. Only the standard security handler is recognized.
    pub fn new(encrypt: &Dict, file_id: Vec<u8>) -> Result<Self> {
        match encrypt.get_name("Filter") {
            Some("Standard") | None => {},
            Some(other) => {
                return Err(Error::Unsupported(format!("security handler {other}")));
            },
        }

        let version = encrypt.get_int("V").unwrap_or(0);
        let revision = encrypt.get_int("R").unwrap_or(2).max(2) as u32;
        let key_length = (encrypt.get_int("Length").unwrap_or(40).clamp(40, 256) / 8) as usize;

        let get_bytes = |key: &str| -> Vec<u8> {
            encrypt
                .get(key)
                .and_then(Object::as_string)
                .map(<[u8]>::to_vec)
                .unwrap_or_default()
        };

        let (stream_method, string_method) = crypt_methods(encrypt, version);

        log::info!(
            "encrypted document: standard handler V={version} R={revision}, \
             stream={stream_method:?} string={string_method:?}"
        );

        Ok(Self {
            revision,
            key_length,
            owner_value: get_bytes("O"),
            user_value: get_bytes("U"),
            owner_encrypted_key: get_bytes("OE"),
            user_encrypted_key: get_bytes("UE"),
            permissions: encrypt.get_int("P").unwrap_or(-1) as i32,
            encrypt_metadata: encrypt.get_bool("EncryptMetadata").unwrap_or(true),
            file_id,
            stream_method,
            string_method,
            key: None,
        })
    }

    /// Whether a document key has been established.
    pub fn is_authenticated(&self) -> bool {
        self.key.is_some()
    }

    /// The user access permissions.
    pub fn permissions(&self) -> Permissions {
        Permissions::from_bits_truncate(self.permissions as u32)
    }

    /// Try a password as user then owner password. Returns true on success
    /// and stores the document key.
    pub fn authenticate(&mut self, password: &[u8]) -> Result<bool> {
        if self.revision >= 5 {
            return self.authenticate_r5_r6(password);
        }

        let user = algorithms::authenticate_user_password(
            password,
            &self.owner_value,
            &self.user_value,
            self.permissions,
            &self.file_id,
            self.revision,
            self.key_length,
            self.encrypt_metadata,
        );
        if let Some(key) = user {
            self.key = Some(key);
            return Ok(true);
        }

        let owner = algorithms::authenticate_owner_password(
            password,
            &self.owner_value,
            &self.user_value,
            self.permissions,
            &self.file_id,
            self.revision,
            self.key_length,
            self.encrypt_metadata,
        );
        if let Some(key) = owner {
            self.key = Some(key);
            return Ok(true);
        }
        Ok(false)
    }

    fn authenticate_r5_r6(&mut self, password: &[u8]) -> Result<bool> {
        let r6 = self.revision >= 6;

        // User password check: udata is empty
        if let Some(ikey) = algorithms::authenticate_r5_r6(password, &self.user_value, b"", r6)? {
            let file_key =
                aes256_decrypt_no_pad(&ikey, &[0u8; 16], &self.user_encrypted_key)
                    .map_err(|e| e.context("decrypting /UE"))?;
            self.key = Some(file_key[..32.min(file_key.len())].to_vec());
            return Ok(true);
        }

        // Owner password check: udata is the full 48-byte /U
        let udata = &self.user_value[..self.user_value.len().min(48)];
        if let Some(ikey) = algorithms::authenticate_r5_r6(password, &self.owner_value, udata, r6)? {
            let file_key =
                aes256_decrypt_no_pad(&ikey, &[0u8; 16], &self.owner_encrypted_key)
                    .map_err(|e| e.context("decrypting /OE"))?;
            self.key = Some(file_key[..32.min(file_key.len())].to_vec());
            return Ok(true);
        }
        Ok(false)
    }

    /// Decrypt a stream payload read for object `re`.
    pub fn decrypt_stream(&self, data: &[u8], re: ObjRef) -> Result<Vec<u8>> {
        self.decrypt(data, re, self.stream_method)
    }

    /// Decrypt a string value read for object `re`.
    pub fn decrypt_string(&self, data: &[u8], re: ObjRef) -> Result<Vec<u8>> {
        self.decrypt(data, re, self.string_method)
    }

    fn decrypt(&self, data: &[u8], re: ObjRef, method: CryptMethod) -> Result<Vec<u8>> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| Error::Auth("document key not established".into()))?;

        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => {
                let object_key = self.object_key(key, re, false);
                Ok(rc4_apply(&object_key, data))
            },
            CryptMethod::Aes128 => {
                let object_key = self.object_key(key, re, true);
                split_iv(data).map_or(Ok(Vec::new()), |(iv, body)| {
                    aes128_decrypt(&object_key, iv, body)
                })
            },
            CryptMethod::Aes256 => split_iv(data).map_or(Ok(Vec::new()), |(iv, body)| {
                aes256_decrypt(key, iv, body)
            }),
        }
    }

    /// Derive the per-object key: MD5(key || objnum[0..3] || gen[0..2]
    /// [|| sAlT]) truncated to key_length + 5, capped at 16 bytes. V5 keys
    /// are used directly and never reach here.
    fn object_key(&self, key: &[u8], re: ObjRef, aes: bool) -> Vec<u8> {
        let mut hasher = Md5::new();
        hasher.update(key);
        hasher.update(&re.num.to_le_bytes()[..3]);
        hasher.update(&re.gen.to_le_bytes()[..2]);
        if aes {
            hasher.update(b"sAlT");
        }
        let digest = hasher.finalize();
        let len = (key.len() + 5).min(16);
        digest[..len].to_vec()
    }
}

fn split_iv(data: &[u8]) -> Option<(&[u8], &[u8])> {
    if data.len() < 16 {
        if !data.is_empty() {
            log::warn!("AES payload shorter than its IV, treating as empty");
        }
        return None;
    }
    Some((&data[..16], &data[16..]))
}

/// Resolve stream/string crypt methods from V and the crypt filter map.
fn crypt_methods(encrypt: &Dict, version: i64) -> (CryptMethod, CryptMethod) {
    match version {
        1 | 2 => (CryptMethod::Rc4, CryptMethod::Rc4),
        4 | 5 => {
            let lookup = |which: &str| -> CryptMethod {
                let name = encrypt.get_name(which).unwrap_or("Identity");
                if name == "Identity" {
                    return CryptMethod::Identity;
                }
                let cfm = encrypt
                    .get_dict("CF")
                    .and_then(|cf| cf.get_dict(name))
                    .and_then(|f| f.get_name("CFM"))
                    .unwrap_or("None");
                match cfm {
                    "V2" => CryptMethod::Rc4,
                    "AESV2" => CryptMethod::Aes128,
                    "AESV3" => CryptMethod::Aes256,
                    other => {
                        log::warn!("unknown crypt filter method {other}, using identity");
                        CryptMethod::Identity
                    },
                }
            };
            (lookup("StmF"), lookup("StrF"))
        },
        other => {
            log::warn!("unknown encryption V={other}, assuming RC4");
            (CryptMethod::Rc4, CryptMethod::Rc4)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::Name;

    fn synthetic_r3_dict(password: &[u8]) -> (Dict, Vec<u8>) {
        // Build O/U values consistent with an R3 document for `password`
        let file_id = b"file-id-bytes".to_vec();
        let owner_value = vec![0xAAu8; 32];
        let key = algorithms::compute_encryption_key(
            password,
            &owner_value,
            -44,
            &file_id,
            3,
            16,
            true,
        );
        let user_value = algorithms::compute_user_key(&key, &file_id, 3);

        let mut dict = Dict::new();
        dict.insert(Name::new("Filter"), Object::Name("Standard".into()));
        dict.insert(Name::new("V"), Object::Int(2));
        dict.insert(Name::new("R"), Object::Int(3));
        dict.insert(Name::new("Length"), Object::Int(128));
        dict.insert(Name::new("P"), Object::Int(-44));
        dict.insert(Name::new("O"), Object::String(owner_value));
        dict.insert(Name::new("U"), Object::String(user_value));
        (dict, file_id)
    }

    #[test]
    fn test_authenticate_and_decrypt_rc4() {
        let (dict, file_id) = synthetic_r3_dict(b"pw");
        let mut handler = EncryptionHandler::new(&dict, file_id).unwrap();
        assert!(!handler.is_authenticated());
        assert!(!handler.authenticate(b"wrong").unwrap());
        assert!(handler.authenticate(b"pw").unwrap());
        assert!(handler.is_authenticated());

        // decrypt is RC4, so decrypting twice restores the input
        let re = ObjRef::new(7, 0);
        let data = b"secret stream".to_vec();
        let once = handler.decrypt_stream(&data, re).unwrap();
        let twice = handler.decrypt_stream(&once, re).unwrap();
        assert_eq!(twice, data);
        assert_ne!(once, data);
    }

    #[test]
    fn test_decrypt_before_auth_fails() {
        let (dict, file_id) = synthetic_r3_dict(b"pw");
        let handler = EncryptionHandler::new(&dict, file_id).unwrap();
        let err = handler.decrypt_stream(b"x", ObjRef::new(1, 0)).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_unknown_handler_rejected() {
        let mut dict = Dict::new();
        dict.insert(Name::new("Filter"), Object::Name("FooSec".into()));
        assert!(matches!(
            EncryptionHandler::new(&dict, Vec::new()),
            Err(Error::Unsupported(_))
        ));
    }
}
