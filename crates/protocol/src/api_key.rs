//! API-key format: `{project_id}_{key_id}_{secret}`.
//!
//! The project slug before the first underscore is the source of truth for
//! prefix-based identification. Keys are stored as a SHA-256 hash plus a
//! short display prefix; plaintext is only ever seen at creation time.

use {
    rand::{Rng, distr::Alphanumeric},
    sha2::{Digest, Sha256},
};

/// Characters of plaintext kept for human identification of a stored key.
pub const KEY_PREFIX_LEN: usize = 20;

/// Random characters in the secret portion of a generated key.
const SECRET_LEN: usize = 24;

/// Minimum total plaintext length accepted by [`parse_key_prefix`].
pub const MIN_KEY_LEN: usize = 32;

/// Hash and display prefix of a stored API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyDigest {
    /// Lowercase hex SHA-256 of the full plaintext.
    pub hash: String,
    /// First [`KEY_PREFIX_LEN`] characters of the plaintext.
    pub prefix: String,
}

/// Generate a fresh API key for `project_id`/`key_id`.
///
/// Returns the plaintext (shown to the caller exactly once) and the digest
/// to store.
#[must_use]
pub fn generate_api_key(project_id: &str, key_id: &str) -> (String, ApiKeyDigest) {
    let secret: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect();
    let plaintext = format!("{project_id}_{key_id}_{secret}");
    let digest = digest_of(&plaintext);
    (plaintext, digest)
}

/// Compute the stored digest of a plaintext key.
#[must_use]
pub fn digest_of(plaintext: &str) -> ApiKeyDigest {
    ApiKeyDigest {
        hash: sha256_hex(plaintext),
        prefix: plaintext.chars().take(KEY_PREFIX_LEN).collect(),
    }
}

/// Lowercase hex SHA-256 of `input`.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let out = hasher.finalize();
    out.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parse `(project_id, key_id)` from an API-key prefix.
///
/// The project slug portion must be strictly lowercase alphanumeric; slugs
/// containing underscores are not derivable from a key prefix.
#[must_use]
pub fn parse_key_prefix(api_key: &str) -> Option<(&str, &str)> {
    let mut parts = api_key.splitn(3, '_');
    let project_id = parts.next()?;
    let key_id = parts.next()?;
    // Three parts minimum: project, key id, secret.
    parts.next()?;

    if project_id.is_empty() || key_id.is_empty() {
        return None;
    }
    if !project_id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return None;
    }
    Some((project_id, key_id))
}
