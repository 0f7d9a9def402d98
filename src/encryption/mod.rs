//! Encryption support for PDF documents.
//!
//! Implements the standard security handler: key derivation and password
//! authentication for revisions 2 through 6, RC4 and AES-128/256-CBC
//! content decryption, and the per-object key schedule. The core's
//! contract is the decryption hook: once a document key is established,
//! string and stream values are decrypted transparently on read.

mod aes;
mod algorithms;
mod handler;
mod rc4;

pub use handler::EncryptionHandler;
pub use rc4::rc4_apply;

use bitflags::bitflags;

bitflags! {
    /// User access permissions from the /P entry.
    ///
    /// Bit positions are 1-based in the format description; bit 3 is
    /// value 1 << 2.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        /// Print the document
        const PRINT = 1 << 2;
        /// Modify contents
        const MODIFY = 1 << 3;
        /// Copy text and graphics
        const COPY = 1 << 4;
        /// Add or modify annotations
        const ANNOTATE = 1 << 5;
        /// Fill in form fields
        const FILL_FORMS = 1 << 8;
        /// Extract for accessibility
        const ACCESSIBILITY = 1 << 9;
        /// Assemble the document
        const ASSEMBLE = 1 << 10;
        /// Print at full resolution
        const PRINT_HIGH_RES = 1 << 11;
    }
}

/// Content encryption method selected by a crypt filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// No encryption
    Identity,
    /// RC4 stream cipher
    Rc4,
    /// AES-128 in CBC mode with a per-datum IV prefix
    Aes128,
    /// AES-256 in CBC mode with a per-datum IV prefix
    Aes256,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_bits() {
        let p = Permissions::from_bits_truncate(0b0000_0100);
        assert!(p.contains(Permissions::PRINT));
        assert!(!p.contains(Permissions::MODIFY));
    }
}
