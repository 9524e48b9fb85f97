use chacha20poly1305::{
    aead::{Aead, AeadCore, OsRng},
    XChaCha20Poly1305,
    KeyInit,
    XNonce,
};

pub const NONCE_LEN: usize = 24;
pub const KEY_LEN: usize = 32;

pub type Key = [u8; KEY_LEN];

#[inline]
pub fn empty_key() -> Key {
    [0; KEY_LEN]
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid data provided")]
    InvalidData,

    #[error("data encryption failed")]
    EncryptFailed,

    #[error("data decryption failed")]
    DecryptFailed,
}

/// reversible cipher for secrets that have to be displayed again later,
/// totp secrets, device fingerprints and recovery code verifiers.
///
/// output layout is the 24 byte nonce followed by the ciphertext
pub struct Cipher {
    inner: XChaCha20Poly1305,
}

impl Cipher {
    pub fn new(key: &Key) -> Self {
        Cipher {
            inner: XChaCha20Poly1305::new_from_slice(key).unwrap(),
        }
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

        let Ok(encrypted) = self.inner.encrypt(&nonce, data) else {
            return Err(CryptoError::EncryptFailed);
        };

        let mut rtn = Vec::with_capacity(nonce.len() + encrypted.len());
        rtn.extend(nonce);
        rtn.extend(encrypted);

        Ok(rtn)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < NONCE_LEN {
            return Err(CryptoError::InvalidData);
        }

        let (nonce, encrypted) = data.split_at(NONCE_LEN);

        let Ok(result) = self.inner.decrypt(XNonce::from_slice(nonce), encrypted) else {
            return Err(CryptoError::DecryptFailed);
        };

        Ok(result)
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}
