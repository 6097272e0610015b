//! API key generation, hashing, and verification.
//!
//! Key format: `pk_{environment}_{token}` where the token is 43 URL-safe
//! base64 characters encoding 32 bytes of CSPRNG output (51 characters
//! total). Keys are hashed with plain SHA-256: the secret is itself
//! high-entropy, so a KDF would only slow down the per-request verify path.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use regex_lite::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use subtle::ConstantTimeEq;
use switchyard_core::KeyEnvironment;

const TOKEN_BYTES: usize = 32; // 32 bytes = 43 URL-safe base64 characters

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^pk_(live|test)_[A-Za-z0-9_-]{43}$").unwrap())
}

/// A freshly generated API key. `full_key` is shown exactly once and never
/// stored; only `key_hash` goes to the database.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub full_key: String,
    pub key_hash: String,
    pub key_hint: String,
    pub key_prefix: String,
}

/// Generate a new API key for the given environment.
pub fn generate(environment: KeyEnvironment) -> GeneratedKey {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes[..]);
    let token = URL_SAFE_NO_PAD.encode(bytes);

    let key_prefix = format!("pk_{environment}_");
    let full_key = format!("{key_prefix}{token}");
    let key_hint = token[token.len() - 4..].to_string();
    let key_hash = hash_key(&full_key);

    GeneratedKey {
        full_key,
        key_hash,
        key_hint,
        key_prefix,
    }
}

/// Lowercase hex SHA-256 of the plaintext key.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Verify a plaintext key against a stored hash.
///
/// Constant-time comparison over the hex digests. Any malformed input
/// (empty key, empty hash) returns `false` rather than erroring.
pub fn verify_key(key: &str, key_hash: &str) -> bool {
    if key.is_empty() || key_hash.is_empty() {
        return false;
    }
    let computed = hash_key(key);
    computed.as_bytes().ct_eq(key_hash.as_bytes()).into()
}

/// Validate key format without touching the database.
pub fn validate_format(key: &str) -> bool {
    key_pattern().is_match(key)
}

/// Extract the environment from a well-formed key.
pub fn extract_environment(key: &str) -> Option<KeyEnvironment> {
    if !validate_format(key) {
        return None;
    }
    key.split('_').nth(1)?.parse().ok()
}

/// Extract the prefix (e.g. `pk_live_`) from a well-formed key.
pub fn extract_prefix(key: &str) -> Option<String> {
    if !validate_format(key) {
        return None;
    }
    let mut parts = key.splitn(3, '_');
    let pk = parts.next()?;
    let env = parts.next()?;
    Some(format!("{pk}_{env}_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_valid_format_and_length() {
        for env in [KeyEnvironment::Live, KeyEnvironment::Test] {
            let key = generate(env);
            assert_eq!(key.full_key.len(), 51);
            assert!(validate_format(&key.full_key), "bad format: {}", key.full_key);
            assert_eq!(key.key_hash.len(), 64);
            assert_eq!(key.key_hint.len(), 4);
            assert!(key.full_key.ends_with(&key.key_hint));
        }
    }

    #[test]
    fn generated_keys_are_unique() {
        let a = generate(KeyEnvironment::Test);
        let b = generate(KeyEnvironment::Test);
        assert_ne!(a.full_key, b.full_key);
        assert_ne!(a.key_hash, b.key_hash);
    }

    #[test]
    fn verify_roundtrip() {
        let key = generate(KeyEnvironment::Live);
        assert!(verify_key(&key.full_key, &key.key_hash));

        let other = generate(KeyEnvironment::Live);
        assert!(!verify_key(&other.full_key, &key.key_hash));
    }

    #[test]
    fn verify_rejects_malformed_input() {
        let key = generate(KeyEnvironment::Test);
        assert!(!verify_key("", &key.key_hash));
        assert!(!verify_key(&key.full_key, ""));
        assert!(!verify_key(&key.full_key, "not-a-hash"));
    }

    #[test]
    fn format_validator_rejects_deviations() {
        assert!(!validate_format("invalid_key"));
        assert!(!validate_format("pk_prod_AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"));
        // 42-char token
        assert!(!validate_format("pk_live_AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"));
        // illegal character set
        assert!(!validate_format("pk_live_AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA!"));
        assert!(validate_format("pk_live_AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"));
    }

    #[test]
    fn extract_parts() {
        let key = generate(KeyEnvironment::Test);
        assert_eq!(extract_environment(&key.full_key), Some(KeyEnvironment::Test));
        assert_eq!(extract_prefix(&key.full_key).as_deref(), Some("pk_test_"));
        assert_eq!(extract_environment("garbage"), None);
        assert_eq!(extract_prefix("garbage"), None);
    }

    #[test]
    fn hash_is_deterministic_lowercase_hex() {
        let h1 = hash_key("pk_test_example");
        let h2 = hash_key("pk_test_example");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
