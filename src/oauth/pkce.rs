//! PKCE (RFC 7636) verifier/challenge pairs, S256 method only.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes behind a verifier (43 base64url characters).
const VERIFIER_BYTES: usize = 32;

/// A fresh code verifier and its S256 challenge.
///
/// The verifier stays server-side until the token exchange; only the
/// challenge goes into the authorization URL.
#[derive(Clone, Debug)]
pub struct PkcePair {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl PkcePair {
    /// Generate a new pair from 32 bytes of OS-seeded randomness.
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let code_verifier = URL_SAFE_NO_PAD.encode(bytes);
        let code_challenge = Self::challenge_for(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
        }
    }

    /// `BASE64URL-NOPAD(SHA256(verifier))`
    pub fn challenge_for(code_verifier: &str) -> String {
        let digest = Sha256::digest(code_verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}
