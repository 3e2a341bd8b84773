//! AES-256-GCM record cipher keyed by PBKDF2-HMAC-SHA256.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::VaultError;

/// PBKDF2 rounds for the master key. Never lower this.
pub const PBKDF2_ITERATIONS: u32 = 210_000;
pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 12;

/// Derived store key. The raw key bytes are wiped once the cipher is built,
/// so only the cipher object survives in memory.
pub struct VaultKey {
    cipher: Aes256Gcm,
}

impl VaultKey {
    pub fn derive(password: &str, salt: &[u8]) -> Result<Self, VaultError> {
        if password.is_empty() {
            return Err(VaultError::EmptyPassword);
        }
        let mut key = Zeroizing::new([0u8; 32]);
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, key.as_mut());
        let cipher = Aes256Gcm::new_from_slice(key.as_ref())
            .map_err(|e| VaultError::Storage(format!("aes key: {e}")))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &[u8], iv: &[u8; IV_LEN], aad: &[u8]) -> Result<Vec<u8>, VaultError> {
        self.cipher
            .encrypt(Nonce::from_slice(iv), Payload { msg: plaintext, aad })
            .map_err(|_| VaultError::Storage("encryption failed".into()))
    }

    /// Wrong key and tampered ciphertext are indistinguishable here.
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        if iv.len() != IV_LEN {
            return Err(VaultError::DecryptionFailed);
        }
        self.cipher
            .decrypt(Nonce::from_slice(iv), Payload { msg: ciphertext, aad })
            .map(Zeroizing::new)
            .map_err(|_| VaultError::DecryptionFailed)
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(..)")
    }
}

pub fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

pub fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Associated data binding a ciphertext to its record id, type and salt.
pub fn record_aad(id: &str, type_: &str, salt: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(id.len() + type_.len() + salt.len() + 2);
    aad.extend_from_slice(id.as_bytes());
    aad.push(0);
    aad.extend_from_slice(type_.as_bytes());
    aad.push(0);
    aad.extend_from_slice(salt);
    aad
}

pub(crate) fn encode_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

pub(crate) fn decode_base64(value: &str) -> Result<Vec<u8>, VaultError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|_| VaultError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_with_aad() {
        let salt = random_salt();
        let key = VaultKey::derive("correct horse", &salt).unwrap();
        let iv = random_iv();
        let aad = record_aad("device-shard", "shard", &salt);

        let ciphertext = key.encrypt(b"shard bytes", &iv, &aad).unwrap();
        let plaintext = key.decrypt(&ciphertext, &iv, &aad).unwrap();
        assert_eq!(plaintext.as_slice(), b"shard bytes");
    }

    #[test]
    fn wrong_password_fails_generically() {
        let salt = random_salt();
        let good = VaultKey::derive("right", &salt).unwrap();
        let bad = VaultKey::derive("wrong", &salt).unwrap();
        let iv = random_iv();

        let ciphertext = good.encrypt(b"secret", &iv, b"aad").unwrap();
        assert!(matches!(bad.decrypt(&ciphertext, &iv, b"aad"), Err(VaultError::DecryptionFailed)));
    }

    #[test]
    fn tampering_and_aad_swap_fail() {
        let salt = random_salt();
        let key = VaultKey::derive("pw", &salt).unwrap();
        let iv = random_iv();
        let mut ciphertext = key.encrypt(b"secret", &iv, b"record-a").unwrap();

        assert!(key.decrypt(&ciphertext, &iv, b"record-b").is_err());
        ciphertext[0] ^= 0xFF;
        assert!(key.decrypt(&ciphertext, &iv, b"record-a").is_err());
        assert!(key.decrypt(&ciphertext, &iv[..8], b"record-a").is_err());
    }

    #[test]
    fn empty_password_rejected() {
        assert!(matches!(VaultKey::derive("", &[0u8; 16]), Err(VaultError::EmptyPassword)));
    }
}
