//! PKCE S256 verifier, challenge, and state generation
//!
//! Implements the client half of Proof Key for Code Exchange (RFC 7636):
//!
//! 1. A high-entropy `code_verifier` drawn from the unreserved URL alphabet
//!    `[A-Za-z0-9-._~]`.
//! 2. The `code_challenge`: base64url (no padding) of SHA-256 over the
//!    verifier's ASCII bytes.
//! 3. An unrelated random `state` value used purely for CSRF binding of the
//!    redirect back from the authorization server.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use base64::Engine as _;
use rand::Rng as _;
use sha2::{Digest, Sha256};

/// Unreserved characters permitted in a PKCE code verifier (RFC 7636 §4.1).
const VERIFIER_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Default verifier length.  Sits well inside the 43..=128 range.
pub const DEFAULT_VERIFIER_LENGTH: usize = 64;

/// Shortest verifier RFC 7636 permits.
pub const MIN_VERIFIER_LENGTH: usize = 43;

/// Longest verifier RFC 7636 permits.
pub const MAX_VERIFIER_LENGTH: usize = 128;

/// Random bytes behind a `state` value (encodes to 22 characters).
const STATE_BYTES: usize = 16;

// ---------------------------------------------------------------------------
// PkceMaterial
// ---------------------------------------------------------------------------

/// Verifier, challenge, and state for one login attempt.
///
/// Created once per call to
/// [`LoginInitiator::start_login`](super::login::LoginInitiator::start_login).
/// The verifier and state are parked in tab-scoped storage until the callback
/// consumes them; the challenge only travels in the authorization URL.
///
/// # Examples
///
/// ```
/// use erp_auth::auth::pkce::{generate_challenge, PkceMaterial};
///
/// let material = PkceMaterial::generate();
/// assert_eq!(material.verifier.len(), 64);
/// assert_eq!(material.challenge, generate_challenge(&material.verifier));
/// assert_ne!(material.state, material.verifier);
/// ```
#[derive(Debug, Clone)]
pub struct PkceMaterial {
    /// The `code_verifier` sent to the token endpoint during code exchange.
    pub verifier: String,

    /// The `code_challenge` sent to the authorization endpoint.
    pub challenge: String,

    /// The `state` nonce echoed back by the authorization server.
    pub state: String,
}

impl PkceMaterial {
    /// Generates fresh material with the default verifier length.
    pub fn generate() -> Self {
        Self::with_verifier_length(DEFAULT_VERIFIER_LENGTH)
    }

    /// Generates fresh material with a verifier of `length` characters.
    ///
    /// `length` is clamped into `43..=128`.
    pub fn with_verifier_length(length: usize) -> Self {
        let verifier = generate_verifier(length);
        let challenge = generate_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: generate_state(),
        }
    }
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/// Generates a random code verifier of `length` characters.
///
/// Characters are drawn uniformly from `[A-Za-z0-9-._~]`.  The length is
/// clamped into the `43..=128` range RFC 7636 requires so that callers cannot
/// produce a verifier the authorization server would reject.
///
/// # Examples
///
/// ```
/// use erp_auth::auth::pkce::generate_verifier;
///
/// let verifier = generate_verifier(50);
/// assert_eq!(verifier.len(), 50);
///
/// // Out-of-range requests are clamped.
/// assert_eq!(generate_verifier(10).len(), 43);
/// assert_eq!(generate_verifier(500).len(), 128);
/// ```
pub fn generate_verifier(length: usize) -> String {
    let length = length.clamp(MIN_VERIFIER_LENGTH, MAX_VERIFIER_LENGTH);
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..VERIFIER_ALPHABET.len());
            VERIFIER_ALPHABET[idx] as char
        })
        .collect()
}

/// Computes the S256 code challenge for `verifier`.
///
/// `BASE64URL-NOPAD(SHA256(ASCII(verifier)))`.  Pure and deterministic.
///
/// # Examples
///
/// ```
/// use erp_auth::auth::pkce::generate_challenge;
///
/// // RFC 7636 Appendix B
/// assert_eq!(
///     generate_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
///     "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
/// );
/// ```
pub fn generate_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

/// Generates a random `state` nonce.
///
/// 16 random bytes encoded as base64url without padding.
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
