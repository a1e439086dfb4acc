//! Symmetric cipher for cluster passwords at rest.
//!
//! Layout: `base64(iv || AES-256-CBC-PKCS7(plaintext))` with a random
//! 16-byte IV per encryption. The AES key is SHA-256 of the configured key
//! material.

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};
use sqlward_core::{Classify, ErrorKind};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const IV_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("cipher key material is empty")]
    EmptyKey,

    #[error("secret is not valid base64: {0}")]
    Base64(String),

    #[error("secret is too short ({0} bytes)")]
    TooShort(usize),

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("secret padding is invalid")]
    Padding,

    #[error("secret is not valid UTF-8")]
    Utf8,

    #[error("no entropy available: {0}")]
    Entropy(String),
}

impl Classify for CodecError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

#[derive(Clone)]
pub struct SecretCodec {
    key: [u8; 32],
}

impl std::fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCodec").finish_non_exhaustive()
    }
}

impl SecretCodec {
    pub fn new(key_material: &str) -> Result<Self, CodecError> {
        if key_material.is_empty() {
            return Err(CodecError::EmptyKey);
        }
        Ok(Self {
            key: Sha256::digest(key_material.as_bytes()).into(),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CodecError> {
        let mut iv = [0u8; IV_LEN];
        getrandom::getrandom(&mut iv).map_err(|e| CodecError::Entropy(e.to_string()))?;
        let cipher = Aes256CbcEnc::new_from_slices(&self.key, &iv)
            .map_err(|e| CodecError::Cipher(e.to_string()))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CodecError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CodecError::Base64(e.to_string()))?;
        // At least the IV and one cipher block.
        if raw.len() < IV_LEN * 2 || (raw.len() - IV_LEN) % IV_LEN != 0 {
            return Err(CodecError::TooShort(raw.len()));
        }
        let (iv, ciphertext) = raw.split_at(IV_LEN);
        let cipher = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|e| CodecError::Cipher(e.to_string()))?;
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CodecError::Padding)?;
        String::from_utf8(plaintext).map_err(|_| CodecError::Utf8)
    }
}
