//! OAuth2 token acquisition via signed JWT assertions.
//!
//! Implements the service-account grant: sign a short-lived RS256
//! assertion with the key's private key, exchange it at the key's token
//! endpoint, and cache the resulting bearer token until shortly before
//! it expires.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::auth::ServiceAccountKey;
use crate::error::{RelayError, Result};

/// Scope requested for issued tokens.
const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// JWT-bearer grant type (RFC 7523).
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each assertion.
const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Timeout for the token-endpoint request.
const TOKEN_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Source of bearer tokens for warehouse requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns a currently valid access token.
    async fn access_token(&self) -> Result<String>;
}

/// A fixed token, for tests and for hosts that manage tokens themselves.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    /// Creates a source that always returns the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Token source backed by a service-account key.
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    http: Client,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

impl ServiceAccountTokenSource {
    /// Creates a token source for the given key.
    pub fn new(key: ServiceAccountKey) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(TOKEN_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| RelayError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            key,
            http,
            cached: Mutex::new(None),
        })
    }

    /// Builds and signs the JWT assertion for a token request.
    fn build_assertion(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| RelayError::internal(format!("System clock before epoch: {e}")))?
            .as_secs();

        let claims = Claims {
            iss: &self.key.client_email,
            scope: BIGQUERY_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| {
                RelayError::authentication(format!(
                    "Service account private key is not a usable RSA key: {e}"
                ))
            })?;

        jsonwebtoken::encode(&header, &claims, &encoding_key)
            .map_err(|e| RelayError::authentication(format!("Failed to sign assertion: {e}")))
    }

    /// Exchanges a signed assertion for an access token.
    async fn fetch_token(&self) -> Result<CachedToken> {
        let assertion = self.build_assertion()?;

        debug!(token_uri = %self.key.token_uri, "Requesting access token");

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::timeout("Token endpoint did not respond in time")
                } else if e.is_connect() {
                    RelayError::transport(format!(
                        "Failed to connect to token endpoint: {e}"
                    ))
                } else {
                    RelayError::transport(format!("Token request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::transport(format!("Failed to read token response: {e}")))?;

        if !status.is_success() {
            return Err(Self::parse_token_error(status, &body));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            RelayError::authentication(format!("Unexpected token response: {e}"))
        })?;

        let lifetime = token.expires_in.saturating_sub(EXPIRY_MARGIN_SECS).max(1);

        Ok(CachedToken {
            token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        })
    }

    /// Maps a token-endpoint error response to a relay error.
    fn parse_token_error(status: reqwest::StatusCode, body: &str) -> RelayError {
        if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(body) {
            if !err.error.is_empty() {
                return RelayError::authentication(format!(
                    "Token request rejected ({}): {}. Verify the service account key.",
                    err.error, err.error_description
                ));
            }
        }

        if status.is_client_error() {
            RelayError::authentication(format!(
                "Token request rejected ({status}). Verify the service account key."
            ))
        } else {
            RelayError::transport(format!("Token endpoint error ({status}): {body}"))
        }
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<String> {
        {
            let cached = self
                .cached
                .lock()
                .map_err(|_| RelayError::internal("Token cache lock poisoned"))?;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Instant::now() {
                    return Ok(token.token.clone());
                }
            }
        }

        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();

        let mut cached = self
            .cached
            .lock()
            .map_err(|_| RelayError::internal("Token cache lock poisoned"))?;
        *cached = Some(fresh);

        Ok(token)
    }
}

impl std::fmt::Debug for ServiceAccountTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenSource")
            .field("client_email", &self.key.client_email)
            .field("token_uri", &self.key.token_uri)
            .finish()
    }
}
