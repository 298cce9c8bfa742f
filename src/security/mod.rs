pub mod encryption;
pub mod headers;
pub mod password;

pub use encryption::CryptoManager;
pub use headers::{security_headers_middleware, SecurityHeadersConfig};
pub use password::{validate_new_password, Argon2Config, PasswordService};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// URL-safe random token carrying `bytes` bytes of entropy.
pub fn generate_token(bytes: usize) -> String {
    let mut rng = rand::rng();
    let raw: Vec<u8> = (0..bytes).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(raw)
}

/// SHA-256 hex digest. Reset tokens are only ever stored in this form.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_is_url_safe_and_unique() {
        let a = generate_token(32);
        let b = generate_token(32);
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_hash_token_is_stable_hex() {
        let h = hash_token("abc");
        assert_eq!(h, hash_token("abc"));
        assert_eq!(h.len(), 64);
        assert_ne!(h, hash_token("abd"));
    }
}
