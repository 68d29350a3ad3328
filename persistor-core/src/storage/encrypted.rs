/*!
AES-128 encrypted storage adapter.

File layout: `[16-byte IV][AES-128-CBC ciphertext]`. The plaintext is the
SHA-256 digest of the blob followed by the blob itself, so decrypting with
the wrong key fails on the digest check even when the padding happens to
look valid.
*/

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{FileStorage, StorageAdapter};
use crate::{PersistError, Result};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Cipher key and IV length in bytes
pub const BYTE_LENGTH: usize = 16;

/// Fixed salt for key derivation
pub const KEY_GEN_SALT: [u8; 8] = [10, 20, 30, 40, 50, 60, 70, 80];

/// PBKDF2 iteration count
pub const DEFAULT_KDF_ROUNDS: u32 = 10_000;

const DIGEST_LENGTH: usize = 32;

/// Encrypts blobs before handing them to an inner adapter
///
/// The cipher key is stretched from the logical key passed to `save`/`load`,
/// or from a fixed passphrase when one is configured.
#[derive(Debug, Clone)]
pub struct EncryptedStorage<S = FileStorage> {
    inner: S,
    passphrase: Option<String>,
    rounds: u32,
}

impl<S: StorageAdapter> EncryptedStorage<S> {
    /// Wrap `inner`, deriving cipher keys from logical keys
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            passphrase: None,
            rounds: DEFAULT_KDF_ROUNDS,
        }
    }

    /// Derive cipher keys from `passphrase` instead of the logical key
    pub fn with_passphrase<P: Into<String>>(mut self, passphrase: P) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Override the PBKDF2 iteration count
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn cipher_key(&self, key: &str) -> [u8; BYTE_LENGTH] {
        let password = self.passphrase.as_deref().unwrap_or(key);
        derive_key(password, self.rounds)
    }

    fn encrypt(&self, key: &str, data: &[u8]) -> Vec<u8> {
        let cipher_key = self.cipher_key(key);
        let mut iv = [0u8; BYTE_LENGTH];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut plaintext = Vec::with_capacity(DIGEST_LENGTH + data.len());
        plaintext.extend_from_slice(&Sha256::digest(data));
        plaintext.extend_from_slice(data);

        let ciphertext =
            Aes128CbcEnc::new(&cipher_key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

        let mut out = Vec::with_capacity(BYTE_LENGTH + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        out
    }

    fn decrypt(&self, key: &str, stored: &[u8]) -> Result<Vec<u8>> {
        if stored.len() < BYTE_LENGTH * 2 {
            return Err(PersistError::crypto(format!(
                "Encrypted store is truncated ({} bytes)",
                stored.len()
            )));
        }

        let (iv, ciphertext) = stored.split_at(BYTE_LENGTH);
        let mut iv_block = [0u8; BYTE_LENGTH];
        iv_block.copy_from_slice(iv);
        let cipher_key = self.cipher_key(key);

        let plaintext = Aes128CbcDec::new(&cipher_key.into(), &iv_block.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| PersistError::crypto("Decryption failed: wrong key or corrupted data"))?;

        if plaintext.len() < DIGEST_LENGTH {
            return Err(PersistError::crypto(
                "Decryption failed: wrong key or corrupted data",
            ));
        }
        let (digest, data) = plaintext.split_at(DIGEST_LENGTH);
        if Sha256::digest(data).as_slice() != digest {
            return Err(PersistError::crypto(
                "Decryption failed: integrity check did not match",
            ));
        }

        Ok(data.to_vec())
    }
}

impl<S: StorageAdapter> StorageAdapter for EncryptedStorage<S> {
    fn save(&self, key: &str, data: &[u8]) -> Result<()> {
        let encrypted = self.encrypt(key, data);
        debug!(storage = %self.inner.describe(), bytes = encrypted.len(), "Encrypted store");
        self.inner.save(key, &encrypted)
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.inner.load(key)? {
            Some(stored) => self.decrypt(key, &stored).map(Some),
            None => Ok(None),
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.inner.exists(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key)
    }

    fn describe(&self) -> String {
        format!("aes-128 over {}", self.inner.describe())
    }
}

/// Stretch `password` into a 16-byte AES key with PBKDF2-HMAC-SHA256
pub fn derive_key(password: &str, rounds: u32) -> [u8; BYTE_LENGTH] {
    let mut key = [0u8; BYTE_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &KEY_GEN_SALT, rounds, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage_in(dir: &TempDir) -> EncryptedStorage<FileStorage> {
        EncryptedStorage::new(FileStorage::new(dir.path().join("store.aes"))).with_rounds(100)
    }

    #[test]
    fn test_encrypted_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        storage.save("C1", b"secret state").unwrap();
        assert_eq!(storage.load("C1").unwrap(), Some(b"secret state".to_vec()));
    }

    #[test]
    fn test_file_layout_is_iv_then_ciphertext() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        storage.save("C1", b"secret state").unwrap();
        let raw = std::fs::read(temp_dir.path().join("store.aes")).unwrap();

        // IV + one digest-and-data ciphertext rounded up to whole blocks
        assert_eq!((raw.len() - BYTE_LENGTH) % BYTE_LENGTH, 0);
        assert_eq!(raw.len(), BYTE_LENGTH + 48);
        assert!(!raw.windows(6).any(|w| w == b"secret"));
    }

    #[test]
    fn test_fresh_iv_per_write() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);
        let path = temp_dir.path().join("store.aes");

        storage.save("C1", b"same").unwrap();
        let first = std::fs::read(&path).unwrap();
        storage.save("C1", b"same").unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_ne!(first[..BYTE_LENGTH], second[..BYTE_LENGTH]);
    }

    #[test]
    fn test_wrong_key_is_crypto_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        storage.save("K1", b"secret state").unwrap();
        let err = storage.load("K2").unwrap_err();
        assert!(err.is_crypto(), "unexpected error: {err}");
    }

    #[test]
    fn test_passphrase_overrides_logical_key() {
        let temp_dir = TempDir::new().unwrap();
        let writer = storage_in(&temp_dir).with_passphrase("hunter2");
        writer.save("K1", b"data").unwrap();

        let reader = storage_in(&temp_dir).with_passphrase("hunter2");
        assert_eq!(reader.load("another key").unwrap(), Some(b"data".to_vec()));

        let wrong = storage_in(&temp_dir).with_passphrase("hunter3");
        assert!(wrong.load("K1").unwrap_err().is_crypto());
    }

    #[test]
    fn test_absent_file_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);
        assert_eq!(storage.load("C1").unwrap(), None);
    }

    #[test]
    fn test_truncated_and_tampered_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);
        let path = temp_dir.path().join("store.aes");

        std::fs::write(&path, [1u8; 10]).unwrap();
        assert!(storage.load("C1").unwrap_err().is_crypto());

        storage.save("C1", b"secret state").unwrap();
        let mut raw = std::fs::read(&path).unwrap();
        raw[BYTE_LENGTH + 3] ^= 0xff;
        std::fs::write(&path, &raw).unwrap();
        assert!(storage.load("C1").unwrap_err().is_crypto());
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        assert_eq!(derive_key("C1", 100), derive_key("C1", 100));
        assert_ne!(derive_key("C1", 100), derive_key("C2", 100));
    }
}
