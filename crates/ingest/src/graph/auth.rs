//! Graph OAuth2 client-credentials authentication
//!
//! Exchanges an app registration's credentials for a bearer token. There is
//! no interactive flow and no token cache: the ingestion loop runs on a
//! five-minute interval, so each cycle simply requests a fresh token.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use chrono::{DateTime, Utc};

use super::api::TokenResponse;
use crate::config::GraphCredentials;

/// Authentication failure.
///
/// `Rejected` means the token endpoint answered and said no (bad secret,
/// unknown tenant); `Transport` covers network and protocol failures.
/// Both abort the cycle; the next timer tick retries.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token endpoint rejected credentials: {0}")]
    Rejected(String),
    #[error("token request failed: {0}")]
    Transport(String),
}

/// A bearer token with its expiry
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub bearer: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token is still usable (with a 60 second buffer)
    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now() + chrono::Duration::seconds(60)
    }
}

/// OAuth2 token acquisition for the Graph API
pub struct GraphAuth {
    credentials: GraphCredentials,
}

impl GraphAuth {
    const SCOPE: &'static str = "https://graph.microsoft.com/.default";

    pub fn new(credentials: GraphCredentials) -> Self {
        Self { credentials }
    }

    fn token_url(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.credentials.tenant_id
        )
    }

    /// Request a fresh access token via the client-credentials grant.
    pub fn acquire_token(&self) -> Result<AccessToken, AuthError> {
        let response = ureq::post(&self.token_url()).send_form([
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", Self::SCOPE),
            ("grant_type", "client_credentials"),
        ]);

        let token: TokenResponse = match response {
            Ok(mut resp) => resp
                .body_mut()
                .read_json()
                .map_err(|e| AuthError::Transport(format!("Failed to parse token response: {e}")))?,
            Err(ureq::Error::StatusCode(code)) => {
                return Err(AuthError::Rejected(format!(
                    "token endpoint returned HTTP {code}"
                )));
            }
            Err(e) => return Err(AuthError::Transport(e.to_string())),
        };

        let expires_in = token.expires_in.unwrap_or(3600);
        Ok(AccessToken {
            bearer: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in as i64),
        })
    }
}
