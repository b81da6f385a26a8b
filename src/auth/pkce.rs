//! PKCE verifier/challenge pair generation.
//!
//! Each login attempt gets a fresh verifier drawn from the OS CSPRNG and a
//! challenge derived as `base64url(sha256(verifier))` without padding. The
//! verifier is never persisted; it is dropped once the challenge exists.

use crate::error::Error;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Random bytes drawn per verifier. 32 bytes = 256 bits of entropy,
/// comfortably above the 224-bit floor required for PKCE.
const VERIFIER_BYTES: usize = 32;

/// Opaque, hex-encoded code verifier. 64 characters, inside the 43..=128
/// window RFC 7636 allows.
#[derive(Clone, PartialEq, Eq)]
pub struct Verifier(String);

impl Verifier {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep verifiers out of Debug output; only the derived challenge may be logged.
impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Verifier([redacted])")
    }
}

/// Base64url-encoded SHA-256 digest of a verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge(String);

impl Challenge {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Draw a fresh code verifier from the OS CSPRNG.
///
/// # Errors
/// Returns `Error::Invariant` when the CSPRNG is unavailable. There is no
/// fallback to a weaker generator.
pub fn generate_verifier() -> Result<Verifier, Error> {
    let mut bytes = [0u8; VERIFIER_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| Error::Invariant(format!("CSPRNG unavailable: {err}")))?;

    let mut encoded = String::with_capacity(VERIFIER_BYTES * 2);
    for byte in bytes {
        write!(encoded, "{byte:02x}").map_err(|err| Error::Invariant(err.to_string()))?;
    }

    Ok(Verifier(encoded))
}

/// Derive the challenge for a verifier: `base64url(sha256(verifier))`,
/// padding stripped. Pure and deterministic.
#[must_use]
pub fn derive_challenge(verifier: &Verifier) -> Challenge {
    // An empty verifier cannot come out of `generate_verifier`.
    debug_assert!(!verifier.0.is_empty(), "verifier must not be empty");

    let mut hasher = Sha256::new();
    hasher.update(verifier.0.as_bytes());
    Challenge(Base64UrlUnpadded::encode_string(&hasher.finalize()))
}
