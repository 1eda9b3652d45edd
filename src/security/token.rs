//! Stateless signed bearer tokens.
//!
//! # Format
//! ```text
//! base64url(header) "." base64url(claims) "." base64url(HMAC-SHA256(secret, header "." claims))
//! ```
//!
//! # Design Decisions
//! - No server-side token state; revocation means rotating the secret
//! - Every verification failure is reported as the same `InvalidToken`
//! - Signature comparison runs in constant time
//! - Expiry is checked against the verifier's clock, no skew allowance

use std::fmt;
use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::security::clock::Clock;

type HmacSha256 = Hmac<Sha256>;

/// Upper bound on an encoded token; longer input is never decoded.
pub const MAX_TOKEN_LEN: usize = 8 * 1024;

/// Upper bound on the encoded claims segment produced by `issue`.
pub const MAX_CLAIMS_SEGMENT_LEN: usize = 6 * 1024;

const BEARER_PREFIX: &str = "Bearer ";
const ALGORITHM: &str = "HS256";

/// Claim names owned by the token service itself.
const RESERVED_CLAIMS: [&str; 2] = ["username", "exp"];

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl Default for TokenHeader {
    fn default() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Claims carried by a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity of the bearer.
    pub username: String,

    /// Expiry in epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    /// Any additional claims.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            exp: None,
            extra: Map::new(),
        }
    }

    /// Add an extra claim. Names reserved by the service are ignored.
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if !RESERVED_CLAIMS.contains(&name.as_str()) {
            self.extra.insert(name, value.into());
        }
        self
    }
}

/// The single outcome for any token that fails verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid token")]
pub struct InvalidToken;

/// Errors raised while issuing a token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("claims exceed {MAX_CLAIMS_SEGMENT_LEN} encoded bytes")]
    ClaimsTooLarge,

    #[error("failed to encode claims: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("signing key rejected")]
    Key,
}

/// Issues and verifies tokens with one secret.
#[derive(Clone)]
pub struct TokenService {
    secret: Arc<[u8]>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenService {
    pub fn new(secret: impl AsRef<[u8]>, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: Arc::from(secret.as_ref()),
            clock,
        }
    }

    /// Issue a token for `claims`, setting `exp = now + ttl_secs` when a TTL is given.
    pub fn issue(&self, claims: &Claims, ttl_secs: Option<u64>) -> Result<String, TokenError> {
        let mut claims = claims.clone();
        if let Some(ttl) = ttl_secs {
            claims.exp = Some(self.clock.now_secs().saturating_add(ttl));
        }

        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&TokenHeader::default())?);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        if payload.len() > MAX_CLAIMS_SEGMENT_LEN {
            return Err(TokenError::ClaimsTooLarge);
        }

        let signature = self.sign(&header, &payload).ok_or(TokenError::Key)?;
        Ok(format!("{header}.{payload}.{signature}"))
    }

    /// Verify a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, InvalidToken> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(InvalidToken);
        }

        let segments: Vec<&str> = token.split('.').collect();
        let [header, payload, signature] = segments.as_slice() else {
            return Err(InvalidToken);
        };

        let expected = self.sign(header, payload).ok_or(InvalidToken)?;
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return Err(InvalidToken);
        }

        let header: TokenHeader = decode_segment(header)?;
        if header.alg != ALGORITHM {
            return Err(InvalidToken);
        }

        let claims: Claims = decode_segment(payload)?;
        if let Some(exp) = claims.exp {
            if exp <= self.clock.now_secs() {
                return Err(InvalidToken);
            }
        }

        Ok(claims)
    }

    fn sign(&self, header: &str, payload: &str) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        Some(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, InvalidToken> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|_| InvalidToken)?;
    serde_json::from_slice(&bytes).map_err(|_| InvalidToken)
}

/// Read a bearer credential from the `Authorization` header.
///
/// `None` means no credential was supplied; it says nothing about validity.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?.trim();
    (!token.is_empty()).then_some(token)
}
