// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Payload encryption used by the gateway's local API.
//!
//! Request and response bodies are AES-256 encrypted block by block (ECB),
//! padded with NUL bytes to the block size and framed as base64 text.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::CryptoError;

/// Cipher block size in bytes.
pub const BLOCK_SIZE: usize = 16;

const KEY_LEN: usize = 32;

/// Symmetric payload cipher keyed with the gateway's derived key.
///
/// # Examples
///
/// ```
/// use thermogw_lib::protocol::Encryption;
///
/// let key = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";
/// let encryption = Encryption::from_hex_key(key).unwrap();
///
/// let frame = encryption.encrypt(r#"{"value":"manual"}"#);
/// assert_eq!(encryption.decrypt(&frame).unwrap(), r#"{"value":"manual"}"#);
/// ```
#[derive(Clone)]
pub struct Encryption {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for Encryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryption").finish_non_exhaustive()
    }
}

impl Encryption {
    /// Creates a cipher from the hex encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError` if the key is not hex or not 32 bytes long.
    pub fn from_hex_key(key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(key.trim()).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let key: [u8; KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len()))?;
        Ok(Self { key })
    }

    /// Returns the key as hex text, suitable for storing in a config entry.
    #[must_use]
    pub fn key_hex(&self) -> String {
        hex::encode(self.key)
    }

    /// Encrypts a plaintext message into a base64 frame.
    #[must_use]
    pub fn encrypt(&self, plaintext: &str) -> String {
        let cipher = Aes256::new(GenericArray::from_slice(&self.key));
        let mut data = plaintext.as_bytes().to_vec();
        pad(&mut data);
        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        STANDARD.encode(data)
    }

    /// Decrypts a base64 frame.
    ///
    /// Frames of two characters or less carry no payload and decode to an
    /// empty JSON object.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError` if the frame is not base64 or does not decrypt
    /// to UTF-8 text.
    pub fn decrypt(&self, frame: &str) -> Result<String, CryptoError> {
        let frame = frame.trim();
        if frame.len() <= 2 {
            return Ok("{}".to_string());
        }

        let mut data = STANDARD
            .decode(frame)
            .map_err(|e| CryptoError::InvalidBase64(e.to_string()))?;
        pad(&mut data);

        let cipher = Aes256::new(GenericArray::from_slice(&self.key));
        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }

        let text = String::from_utf8(data).map_err(|e| CryptoError::Decrypt(e.to_string()))?;
        Ok(text.trim_end_matches('\0').to_string())
    }
}

/// Pads `data` with NUL bytes up to a multiple of the block size.
fn pad(data: &mut Vec<u8>) {
    let rem = data.len() % BLOCK_SIZE;
    if rem != 0 {
        data.resize(data.len() + BLOCK_SIZE - rem, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

    #[test]
    fn rejects_non_hex_key() {
        assert!(matches!(
            Encryption::from_hex_key("not a key"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn rejects_short_key() {
        assert_eq!(
            Encryption::from_hex_key("0011").unwrap_err(),
            CryptoError::InvalidKeyLength(2)
        );
    }

    #[test]
    fn ciphertext_is_block_aligned() {
        let enc = Encryption::from_hex_key(KEY).unwrap();
        let frame = enc.encrypt(r#"{"value":21.5}"#);
        let raw = STANDARD.decode(frame).unwrap();
        assert_eq!(raw.len() % BLOCK_SIZE, 0);
        assert_eq!(raw.len(), 16);
    }

    #[test]
    fn decrypt_strips_padding() {
        let enc = Encryption::from_hex_key(KEY).unwrap();
        let message = r#"{"id":"/gateway/uuid","value":"123456789"}"#;
        assert_eq!(enc.decrypt(&enc.encrypt(message)).unwrap(), message);
    }

    #[test]
    fn short_frame_is_empty_object() {
        let enc = Encryption::from_hex_key(KEY).unwrap();
        assert_eq!(enc.decrypt("").unwrap(), "{}");
        assert_eq!(enc.decrypt("  \n").unwrap(), "{}");
    }

    #[test]
    fn invalid_base64_is_crypto_error() {
        let enc = Encryption::from_hex_key(KEY).unwrap();
        assert!(matches!(
            enc.decrypt("***not base64***"),
            Err(CryptoError::InvalidBase64(_))
        ));
    }

    #[test]
    fn wrong_key_does_not_yield_plaintext() {
        let enc = Encryption::from_hex_key(KEY).unwrap();
        let other = Encryption::from_hex_key(&"ff".repeat(32)).unwrap();
        let frame = enc.encrypt(r#"{"value":"auto"}"#);
        assert_ne!(
            other.decrypt(&frame).ok().as_deref(),
            Some(r#"{"value":"auto"}"#)
        );
    }

    #[test]
    fn key_hex_round_trips() {
        let enc = Encryption::from_hex_key(KEY).unwrap();
        assert_eq!(enc.key_hex(), KEY);
    }
}
