//! HMAC-SHA1 signing of cookie values.
//!
//! # Responsibilities
//! - Sign an opaque value together with the time it was signed
//! - Verify a (value, timestamp, signature) triple
//! - Encode/decode the `base64|timestamp|hexsig` wire value
//! - Reject values older than the validity window
//!
//! # Design Decisions
//! - Signature covers the base64 text, not the raw value
//! - Signatures are compared in constant time (`Mac::verify_slice`)
//! - Only lowercase hex is accepted, so every bit of the wire value matters

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;

use crate::clock::unix_now;

type HmacSha1 = Hmac<Sha1>;

/// Signed cookies older than this are rejected regardless of signature.
pub const MAX_COOKIE_AGE_SECS: u64 = 31 * 86_400;

/// Reasons a signed cookie can be refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CookieError {
    /// No secret key was configured; signing is disabled.
    #[error("cookie secret has not been configured")]
    NoSecret,

    /// The wire value does not have three `|`-separated fields.
    #[error("malformed signed cookie value")]
    Malformed,

    /// The recomputed signature does not match.
    #[error("cookie signature mismatch")]
    BadSignature,

    /// The signature is valid but older than the validity window.
    #[error("signed cookie expired ({age_secs}s old)")]
    Expired { age_secs: u64 },

    /// The payload is not base64-encoded UTF-8.
    #[error("cookie payload is not valid base64 text")]
    Encoding,
}

/// Timestamp and signature produced for a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedValue {
    /// Unix seconds at signing time.
    pub timestamp: u64,
    /// Lowercase hex HMAC-SHA1 of `value || timestamp`.
    pub signature: String,
}

/// Process-wide cookie signer.
///
/// Built once from configuration and shared behind an `Arc`.
#[derive(Clone)]
pub struct CookieSigner {
    secret: Option<Vec<u8>>,
}

impl fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieSigner")
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl CookieSigner {
    /// Create a signer. An absent or empty secret disables signing.
    pub fn new(secret: Option<&str>) -> Self {
        let secret = secret
            .filter(|s| !s.is_empty())
            .map(|s| s.as_bytes().to_vec());

        if secret.is_none() {
            tracing::warn!("No cookie secret configured; signed cookies will be refused");
        }

        Self { secret }
    }

    /// Whether a secret is available.
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    fn mac(&self, value: &[u8], timestamp: &str) -> Result<HmacSha1, CookieError> {
        let secret = self.secret.as_deref().ok_or(CookieError::NoSecret)?;
        // HMAC takes keys of any length.
        let mut mac = HmacSha1::new_from_slice(secret).map_err(|_| CookieError::NoSecret)?;
        mac.update(value);
        mac.update(timestamp.as_bytes());
        Ok(mac)
    }

    /// Sign `value` with the current time.
    pub fn sign(&self, value: &[u8]) -> Result<SignedValue, CookieError> {
        self.sign_at(value, unix_now())
    }

    /// Sign `value` as if it were `timestamp` seconds past the epoch.
    pub fn sign_at(&self, value: &[u8], timestamp: u64) -> Result<SignedValue, CookieError> {
        let mac = self.mac(value, &timestamp.to_string())?;
        Ok(SignedValue {
            timestamp,
            signature: hex::encode(mac.finalize().into_bytes()),
        })
    }

    /// Recompute the signature and compare. False on any mismatch,
    /// and always false without a secret.
    pub fn verify(&self, value: &[u8], timestamp: &str, signature: &str) -> bool {
        let lower_hex = signature
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !lower_hex {
            return false;
        }
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        match self.mac(value, timestamp) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }

    /// Produce the cookie wire value for `value`.
    pub fn encode(&self, value: &str) -> Result<String, CookieError> {
        self.encode_at(value, unix_now())
    }

    /// Like [`encode`](Self::encode) with an explicit signing time.
    pub fn encode_at(&self, value: &str, timestamp: u64) -> Result<String, CookieError> {
        let payload = STANDARD.encode(value);
        let signed = self.sign_at(payload.as_bytes(), timestamp)?;
        Ok(format!("{}|{}|{}", payload, signed.timestamp, signed.signature))
    }

    /// Verify and unwrap a cookie wire value.
    pub fn decode(&self, cookie: &str) -> Result<String, CookieError> {
        self.decode_at(cookie, unix_now())
    }

    /// Like [`decode`](Self::decode) evaluated at `now`.
    pub fn decode_at(&self, cookie: &str, now: u64) -> Result<String, CookieError> {
        if !self.is_configured() {
            return Err(CookieError::NoSecret);
        }

        let mut parts = cookie.splitn(3, '|');
        let (Some(payload), Some(timestamp), Some(signature)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(CookieError::Malformed);
        };

        if !self.verify(payload.as_bytes(), timestamp, signature) {
            return Err(CookieError::BadSignature);
        }

        let signed_at: u64 = timestamp.parse().map_err(|_| CookieError::Malformed)?;
        let age_secs = now.saturating_sub(signed_at);
        if age_secs > MAX_COOKIE_AGE_SECS {
            return Err(CookieError::Expired { age_secs });
        }

        let raw = STANDARD.decode(payload).map_err(|_| CookieError::Encoding)?;
        String::from_utf8(raw).map_err(|_| CookieError::Encoding)
    }
}
