//! Signed bearer tokens carrying subject and role claims.
//!
//! Tokens are three base64url segments (`header.claims.signature`) signed
//! with HMAC-SHA256 over the first two. Validation is stateless: it needs
//! only the signing secret and the clock, no server-side session store.
//!
//! Expiry boundary: a token checked at exactly its `exp` timestamp is still
//! valid; validation fails only once `exp` is strictly in the past.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const HEADER_JSON: &[u8] = br#"{"alg":"HS256","typ":"JWT"}"#;

/// Claims embedded in every issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — the username.
    pub sub: String,
    /// Role name assigned at signup.
    pub role: String,
    /// Absolute expiry as a UNIX timestamp.
    pub exp: i64,
}

/// Issues and validates signed, expiring bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    secret: Vec<u8>,
    ttl_minutes: i64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_minutes,
        }
    }

    /// Issue a token for `subject` with `role`, expiring after the
    /// configured lifetime.
    pub fn issue(&self, subject: &str, role: &str) -> anyhow::Result<String> {
        let exp = Utc::now().timestamp() + self.ttl_minutes * 60;
        self.issue_with_expiry(subject, role, exp)
    }

    fn issue_with_expiry(&self, subject: &str, role: &str, exp: i64) -> anyhow::Result<String> {
        let claims = Claims {
            sub: subject.to_string(),
            role: role.to_string(),
            exp,
        };
        let header_b64 = URL_SAFE_NO_PAD.encode(HEADER_JSON);
        let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{}.{}", header_b64, claims_b64);
        let sig_b64 = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes()));
        Ok(format!("{}.{}", signing_input, sig_b64))
    }

    /// Validate a token: signature, structure, and expiry.
    ///
    /// Returns `None` for malformed tokens, bad signatures, and expired
    /// tokens alike. The caller maps `None` to an authorization failure.
    pub fn validate(&self, token: &str) -> Option<Claims> {
        self.validate_at(token, Utc::now().timestamp())
    }

    fn validate_at(&self, token: &str, now: i64) -> Option<Claims> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return None;
        }

        let signing_input = format!("{}.{}", parts[0], parts[1]);
        let sig = URL_SAFE_NO_PAD.decode(parts[2]).ok()?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        // verify_slice is constant-time
        mac.verify_slice(&sig).ok()?;

        let claims_json = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
        let claims: Claims = serde_json::from_slice(&claims_json).ok()?;

        if claims.exp < now {
            return None;
        }
        Some(claims)
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}
