//! Credential refresh providers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::header::{COOKIE, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::{RelayError, Result};

/// Cookie carrying the long-lived session token.
pub const SESSION_COOKIE: &str = "__Secure-next-auth.session-token";

/// A freshly issued credential and how long it stays valid.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub value: String,
    pub ttl: Duration,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Source of short-lived backend credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtain a new credential. Failures are [`RelayError::Auth`].
    async fn refresh(&self) -> Result<Credential>;
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    expires: String,
    #[serde(default, rename = "accessToken")]
    access_token: String,
}

/// Exchanges a session token for an access token at the session endpoint.
pub struct SessionTokenProvider {
    client: Client,
    session_url: String,
    session_token: SecretString,
    user_agent: String,
    timeout: Duration,
}

impl SessionTokenProvider {
    pub fn new(
        client: Client,
        session_url: impl Into<String>,
        session_token: SecretString,
        user_agent: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            session_url: session_url.into(),
            session_token,
            user_agent: user_agent.into(),
            timeout,
        }
    }
}

impl std::fmt::Debug for SessionTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokenProvider")
            .field("session_url", &self.session_url)
            .field("session_token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for SessionTokenProvider {
    async fn refresh(&self) -> Result<Credential> {
        debug!(url = %self.session_url, "Refreshing access token");

        let response = self
            .client
            .get(&self.session_url)
            .header(USER_AGENT, &self.user_agent)
            .header(
                COOKIE,
                format!("{SESSION_COOKIE}={}", self.session_token.expose_secret()),
            )
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RelayError::auth(format!("failed to perform request: {e}")))?;

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| RelayError::auth(format!("failed to decode response: {e}")))?;

        credential_from_session(session, Utc::now())
    }
}

fn credential_from_session(session: SessionResponse, now: DateTime<Utc>) -> Result<Credential> {
    match session.error.as_str() {
        "" => {}
        "RefreshAccessTokenError" => return Err(RelayError::auth("session token has expired")),
        other => return Err(RelayError::auth(other)),
    }
    if session.access_token.is_empty() {
        return Err(RelayError::auth("unauthorized"));
    }

    let expires = DateTime::parse_from_rfc3339(&session.expires)
        .map_err(|e| RelayError::auth(format!("failed to parse expiry time: {e}")))?;
    let ttl = (expires.with_timezone(&Utc) - now)
        .to_std()
        .ok()
        .filter(|ttl| !ttl.is_zero())
        .ok_or_else(|| RelayError::auth("access token is already expired"))?;

    Ok(Credential {
        value: session.access_token,
        ttl,
    })
}
