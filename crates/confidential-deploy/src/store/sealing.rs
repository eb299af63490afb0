//! AES-256-GCM sealing of stored documents.

use crate::error::StoreError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

/// Nonce size for AES-GCM (96 bits = 12 bytes).
const NONCE_SIZE: usize = 12;

/// Encrypts and decrypts documents with a fixed 256-bit key.
///
/// Sealed layout: `[12 bytes nonce][ciphertext with auth tag]`.
#[derive(Clone)]
pub struct Sealer {
    key: [u8; 32],
}

impl fmt::Debug for Sealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Sealer(<redacted>)")
    }
}

impl Sealer {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Key from configuration: 64 hex characters are used as the raw key,
    /// anything else is treated as a passphrase and hashed with SHA-256.
    pub fn from_secret(secret: &str) -> Self {
        let mut key = [0u8; 32];

        match hex::decode(secret.trim()) {
            Ok(bytes) if bytes.len() == 32 => key.copy_from_slice(&bytes),
            _ => key.copy_from_slice(&Sha256::digest(secret.as_bytes())),
        }

        Self { key }
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StoreError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, plaintext)?;

        let mut data = nonce_bytes.to_vec();
        data.extend(ciphertext);
        Ok(data)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, StoreError> {
        if sealed.len() < NONCE_SIZE {
            return Err(StoreError::Encryption("sealed document too short".into()));
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);

        cipher.decrypt(nonce, &sealed[NONCE_SIZE..]).map_err(|_| {
            StoreError::Encryption(
                "failed to unseal document; the sealing key may have changed".to_string(),
            )
        })
    }
}
