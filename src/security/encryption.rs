//! Credential obfuscation with a locally stored AES-256-GCM key.
//!
//! The key file sits next to the data it protects, so this only keeps
//! credentials out of config dumps and logs. It is not a secrets vault.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use sha2::Sha256;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const SALT_SIZE: usize = 16;
const SEED_SIZE: usize = 32;
const KDF_ITERATIONS: u32 = 100_000;

/// Prefix marking an encrypted configuration value.
pub const ENCRYPTED_PREFIX: &str = "enc:";

pub struct CryptoManager {
    key: [u8; KEY_SIZE],
    key_path: PathBuf,
}

impl std::fmt::Debug for CryptoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoManager")
            .field("key_path", &self.key_path)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl CryptoManager {
    /// Load the key from `path`, creating the file on first use.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let key = if path.exists() {
            read_key_file(path)?
        } else {
            let key = create_key_file(path)?;
            info!("Generated new credential key at {}", path.display());
            key
        };

        Ok(Self {
            key,
            key_path: path.to_path_buf(),
        })
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Returns `base64(nonce):base64(ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let (nonce_b64, ct_b64) = encrypt_aes_gcm(plaintext.as_bytes(), &self.key)?;
        Ok(format!("{nonce_b64}:{ct_b64}"))
    }

    pub fn decrypt(&self, encrypted: &str) -> Result<String> {
        let (nonce_b64, ct_b64) = encrypted
            .split_once(':')
            .ok_or_else(|| anyhow!("Invalid encrypted value format"))?;
        let plaintext = decrypt_aes_gcm(nonce_b64, ct_b64, &self.key)?;
        String::from_utf8(plaintext).context("Decrypted value is not UTF-8")
    }

    /// Decrypts `enc:`-prefixed values and passes plain values through.
    pub fn reveal(&self, value: &str) -> Result<String> {
        match value.strip_prefix(ENCRYPTED_PREFIX) {
            Some(encrypted) => self.decrypt(encrypted),
            None => Ok(value.to_string()),
        }
    }

    /// Encrypts and adds the `enc:` prefix for use in config files.
    pub fn seal(&self, value: &str) -> Result<String> {
        Ok(format!("{ENCRYPTED_PREFIX}{}", self.encrypt(value)?))
    }
}

fn read_key_file(path: &Path) -> Result<[u8; KEY_SIZE]> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file {}", path.display()))?;
    let key_part = contents
        .trim()
        .split('.')
        .next()
        .ok_or_else(|| anyhow!("Empty key file"))?;
    let bytes = BASE64
        .decode(key_part)
        .context("Key file is not valid base64")?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("Key file must hold a {KEY_SIZE}-byte key"))
}

fn create_key_file(path: &Path) -> Result<[u8; KEY_SIZE]> {
    let mut rng = rand::rng();
    let seed: Vec<u8> = (0..SEED_SIZE).map(|_| rng.random()).collect();
    let salt = generate_salt();
    let key = derive_key(&seed, &salt, KDF_ITERATIONS);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, format!("{}.{}", BASE64.encode(key), BASE64.encode(&salt)))
        .with_context(|| format!("Failed to write key file {}", path.display()))?;
    restrict_permissions(path)?;
    Ok(key)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn encrypt_aes_gcm(plaintext: &[u8], key: &[u8]) -> Result<(String, String)> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key);
    let cipher = Aes256Gcm::new(cipher_key);

    let mut rng = rand::rng();
    let nonce_bytes: [u8; NONCE_SIZE] = std::array::from_fn(|_| rng.random());
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow!("Encryption failed: {e}"))?;

    Ok((BASE64.encode(nonce_bytes), BASE64.encode(ciphertext)))
}

fn decrypt_aes_gcm(nonce_b64: &str, ciphertext_b64: &str, key: &[u8]) -> Result<Vec<u8>> {
    let nonce_bytes = BASE64
        .decode(nonce_b64)
        .map_err(|e| anyhow!("Invalid nonce: {e}"))?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(anyhow!("Invalid nonce length"));
    }
    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .map_err(|e| anyhow!("Invalid ciphertext: {e}"))?;

    let cipher_key = Key::<Aes256Gcm>::from_slice(key);
    let cipher = Aes256Gcm::new(cipher_key);
    let nonce = Nonce::from_slice(&nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|e| anyhow!("Decryption failed: {e}"))
}

/// PBKDF2-HMAC-SHA256 with a 32-byte output.
pub fn derive_key(secret: &[u8], salt: &[u8], iterations: u32) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret, salt, iterations, &mut key);
    key
}

pub fn generate_salt() -> Vec<u8> {
    let mut rng = rand::rng();
    (0..SALT_SIZE).map(|_| rng.random()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, CryptoManager) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = CryptoManager::load_or_create(dir.path().join(".key")).expect("key");
        (dir, mgr)
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let (_dir, mgr) = manager();
        let encrypted = mgr.encrypt("smtp-password").expect("Encrypt failed");
        assert_ne!(encrypted, "smtp-password");
        assert_eq!(mgr.decrypt(&encrypted).expect("Decrypt failed"), "smtp-password");
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let (_dir, mgr) = manager();
        let a = mgr.encrypt("same").expect("Encrypt failed");
        let b = mgr.encrypt("same").expect("Encrypt failed");
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let (_dir, mgr) = manager();
        let encrypted = mgr.encrypt("secret").expect("Encrypt failed");
        let (nonce, ct) = encrypted.split_once(':').expect("format");
        let mut bytes = BASE64.decode(ct).expect("b64");
        bytes[0] ^= 0xff;
        let tampered = format!("{nonce}:{}", BASE64.encode(bytes));
        assert!(mgr.decrypt(&tampered).is_err());
        assert!(mgr.decrypt("no-separator").is_err());
    }

    #[test]
    fn test_key_file_is_created_once_and_reused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("keys").join(".key");
        let first = CryptoManager::load_or_create(&path).expect("create");
        let stored = fs::read_to_string(&path).expect("read");
        assert_eq!(stored.split('.').count(), 2);

        let sealed = first.encrypt("api-user").expect("Encrypt failed");
        let second = CryptoManager::load_or_create(&path).expect("reload");
        assert_eq!(fs::read_to_string(&path).expect("read"), stored);
        assert_eq!(second.decrypt(&sealed).expect("Decrypt failed"), "api-user");
    }

    #[test]
    fn test_reveal_passes_plain_values_through() {
        let (_dir, mgr) = manager();
        assert_eq!(mgr.reveal("plain").expect("reveal"), "plain");
        let sealed = mgr.seal("hidden").expect("seal");
        assert!(sealed.starts_with(ENCRYPTED_PREFIX));
        assert_eq!(mgr.reveal(&sealed).expect("reveal"), "hidden");
    }

    #[test]
    fn test_derive_key_matches_pbkdf2_sha256_vectors() {
        assert_eq!(
            hex::encode(derive_key(b"password", b"salt", 1)),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );
        assert_eq!(
            hex::encode(derive_key(b"password", b"salt", 4096)),
            "c5e478d59288c841aa530db6845c4c8d962893a001ce4e11a4963873aa98134a"
        );
    }

    #[test]
    fn test_key_file_holds_sixteen_byte_salt() {
        let (dir, _mgr) = manager();
        let stored = fs::read_to_string(dir.path().join(".key")).expect("read");
        let (_, salt) = stored.trim().split_once('.').expect("key.salt");
        assert_eq!(BASE64.decode(salt).expect("b64").len(), SALT_SIZE);
        assert_eq!(generate_salt().len(), 16);
    }
}
