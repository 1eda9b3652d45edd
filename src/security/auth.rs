//! Authentication strategies.
//!
//! Two strategies sit behind the `Authenticator` trait and are chosen by
//! `auth.strategy`:
//! - `token`: login issues a signed bearer token; requests present it
//! - `legacy`: every request carries the raw username and password
//!
//! The legacy strategy has no expiry and no signature. It is kept isolated so
//! it can be removed without touching handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;
use crate::security::clock::Clock;
use crate::security::token::{extract_token, Claims, TokenError, TokenService};

pub const USERNAME_HEADER: &str = "x-username";
pub const PASSWORD_HEADER: &str = "x-password";

/// Which authentication flow is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStrategy {
    #[default]
    Token,
    Legacy,
}

/// A credential as presented by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    None,
    Bearer(&'a str),
    Password { username: &'a str, password: &'a str },
}

impl<'a> Credential<'a> {
    /// Pull a credential from headers, then from query parameters.
    ///
    /// A bearer header wins; username and password count only when both are present.
    pub fn from_request(headers: &'a HeaderMap, query: &'a HashMap<String, String>) -> Self {
        if let Some(token) = extract_token(headers) {
            return Credential::Bearer(token);
        }

        let header = move |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let username = header(USERNAME_HEADER).or_else(|| query.get("username").map(String::as_str));
        let password = header(PASSWORD_HEADER).or_else(|| query.get("password").map(String::as_str));

        match (username, password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Credential::Password { username, password }
            }
            _ => Credential::None,
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, Credential::None)
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
}

/// Why authentication failed. Both map to 401; only `Missing` permits guest reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("no credential supplied")]
    Missing,
    #[error("invalid credential")]
    Invalid,
}

/// What a successful login hands back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub username: String,
    pub token: Option<String>,
    /// Token expiry in epoch seconds.
    pub expires_at: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// One verification interface over both strategies.
pub trait Authenticator: Send + Sync {
    fn strategy(&self) -> AuthStrategy;

    /// Authenticate a request credential.
    fn authenticate(&self, credential: &Credential<'_>) -> Result<Identity, AuthFailure>;

    /// Check login credentials.
    fn login(&self, username: &str, password: &str) -> Result<LoginGrant, LoginError>;
}

/// The single configured account.
#[derive(Clone)]
struct Account {
    username: String,
    password: String,
}

impl Account {
    fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        !self.username.is_empty() && bool::from(user_ok & pass_ok)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Signed bearer tokens issued at login.
#[derive(Debug)]
pub struct TokenAuthenticator {
    account: Account,
    tokens: TokenService,
    ttl_secs: Option<u64>,
    clock: Arc<dyn Clock>,
}

impl TokenAuthenticator {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            account: Account {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            tokens: TokenService::new(config.token_secret.as_bytes(), clock.clone()),
            ttl_secs: config.token_ttl_secs,
            clock,
        }
    }
}

impl Authenticator for TokenAuthenticator {
    fn strategy(&self) -> AuthStrategy {
        AuthStrategy::Token
    }

    fn authenticate(&self, credential: &Credential<'_>) -> Result<Identity, AuthFailure> {
        let token = match credential {
            Credential::None => return Err(AuthFailure::Missing),
            Credential::Password { .. } => return Err(AuthFailure::Invalid),
            Credential::Bearer(token) => token,
        };

        let claims = self.tokens.verify(token).map_err(|_| AuthFailure::Invalid)?;
        if claims.username != self.account.username {
            return Err(AuthFailure::Invalid);
        }
        Ok(Identity {
            username: claims.username,
        })
    }

    fn login(&self, username: &str, password: &str) -> Result<LoginGrant, LoginError> {
        if !self.account.matches(username, password) {
            return Err(LoginError::InvalidCredentials);
        }

        // Issued-at keeps successive tokens distinct.
        let claims = Claims::new(username).with_claim("iat", self.clock.now_secs());
        let token = self.tokens.issue(&claims, self.ttl_secs)?;
        Ok(LoginGrant {
            username: username.to_string(),
            token: Some(token),
            expires_at: self
                .ttl_secs
                .map(|ttl| self.clock.now_secs().saturating_add(ttl)),
        })
    }
}

/// Raw username/password on every request.
#[derive(Debug)]
pub struct LegacyAuthenticator {
    account: Account,
}

impl LegacyAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            account: Account {
                username: config.username.clone(),
                password: config.password.clone(),
            },
        }
    }
}

impl Authenticator for LegacyAuthenticator {
    fn strategy(&self) -> AuthStrategy {
        AuthStrategy::Legacy
    }

    fn authenticate(&self, credential: &Credential<'_>) -> Result<Identity, AuthFailure> {
        match credential {
            Credential::None => Err(AuthFailure::Missing),
            Credential::Bearer(_) => Err(AuthFailure::Invalid),
            Credential::Password { username, password } => {
                if self.account.matches(username, password) {
                    Ok(Identity {
                        username: username.to_string(),
                    })
                } else {
                    Err(AuthFailure::Invalid)
                }
            }
        }
    }

    fn login(&self, username: &str, password: &str) -> Result<LoginGrant, LoginError> {
        if !self.account.matches(username, password) {
            return Err(LoginError::InvalidCredentials);
        }
        Ok(LoginGrant {
            username: username.to_string(),
            token: None,
            expires_at: None,
        })
    }
}

/// Build the authenticator selected by configuration.
pub fn authenticator_from_config(config: &AuthConfig, clock: Arc<dyn Clock>) -> Arc<dyn Authenticator> {
    match config.strategy {
        AuthStrategy::Token => Arc::new(TokenAuthenticator::new(config, clock)),
        AuthStrategy::Legacy => Arc::new(LegacyAuthenticator::new(config)),
    }
}
