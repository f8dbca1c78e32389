//! Graph API HTTP client
//!
//! Provides delta-query message listing, attachment listing, and attachment
//! download. Uses synchronous HTTP (ureq) to be executor-agnostic.

use log::{debug, warn};
use std::time::Duration;

use super::api::{AttachmentListResponse, DeltaResponse};
use super::normalize::normalize_message;
use super::{AttachmentMeta, AuthError, DeltaPage, GraphAuth, MailSource, SenderFilter};
use crate::models::{DeltaCursor, MessageId};

/// Fetch failure during message or attachment retrieval.
///
/// `CursorExpired` maps the provider's HTTP 410 on a stale delta token;
/// the caller clears the persisted cursor and restarts with a full sync.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("delta cursor expired or invalid")]
    CursorExpired,
    #[error("no access token; authenticate first")]
    NotAuthenticated,
    #[error("graph request failed: {0}")]
    Http(String),
    #[error("failed to parse graph response: {0}")]
    Parse(String),
}

/// Graph API client for fetching messages and attachments
pub struct GraphClient {
    auth: GraphAuth,
    token: Option<super::AccessToken>,
}

impl GraphClient {
    /// Graph API base URL
    const BASE_URL: &'static str = "https://graph.microsoft.com/v1.0";

    /// Retry schedule for attachment downloads
    const DOWNLOAD_RETRIES: u32 = 3;

    /// Create a new Graph client
    pub fn new(auth: GraphAuth) -> Self {
        Self { auth, token: None }
    }

    fn bearer(&self) -> Result<&str, FetchError> {
        self.token
            .as_ref()
            .map(|t| t.bearer.as_str())
            .ok_or(FetchError::NotAuthenticated)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let bearer = self.bearer()?;
        let response = ureq::get(url)
            .header("Authorization", &format!("Bearer {}", bearer))
            .call();

        match response {
            Ok(mut resp) => resp
                .body_mut()
                .read_json()
                .map_err(|e| FetchError::Parse(e.to_string())),
            Err(ureq::Error::StatusCode(410)) => Err(FetchError::CursorExpired),
            Err(e) => Err(FetchError::Http(e.to_string())),
        }
    }

    /// Fetch a single delta page
    fn fetch_delta_page(&self, url: &str) -> Result<DeltaResponse, FetchError> {
        self.get_json(url)
    }

    /// Download attachment bytes once, without retry
    fn download_once(
        &self,
        message_id: &MessageId,
        attachment_id: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let bearer = self.bearer()?;
        let url = format!(
            "{}/me/messages/{}/attachments/{}/$value",
            Self::BASE_URL,
            message_id.as_str(),
            attachment_id
        );

        let response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", bearer))
            .call();

        match response {
            Ok(mut resp) => resp
                .body_mut()
                .read_to_vec()
                .map_err(|e| FetchError::Http(format!("Failed to read attachment body: {e}"))),
            Err(e) => Err(FetchError::Http(e.to_string())),
        }
    }
}

impl MailSource for GraphClient {
    fn authenticate(&mut self) -> Result<(), AuthError> {
        let token = self.auth.acquire_token()?;
        debug!("Acquired Graph access token, expires at {}", token.expires_at);
        self.token = Some(token);
        Ok(())
    }

    /// Fetch all new messages since `cursor`.
    ///
    /// Follows `@odata.nextLink` pages until a `@odata.deltaLink` appears or
    /// no next link remains, accumulating every page into one result set.
    /// Any page failure fails the whole call so the caller's cursor is never
    /// partially advanced.
    fn fetch_new_messages(
        &self,
        cursor: Option<&DeltaCursor>,
        filter: &SenderFilter,
    ) -> Result<DeltaPage, FetchError> {
        let mut url = match cursor {
            Some(cursor) => cursor.as_str().to_string(),
            None => format!("{}/me/messages/delta", Self::BASE_URL),
        };

        let mut messages = Vec::new();
        let mut new_cursor = None;

        loop {
            let page = self.fetch_delta_page(&url)?;

            for entry in page.value {
                // Tombstones mark deletions; nothing to ingest
                if entry.removed.is_some() {
                    continue;
                }
                let message = normalize_message(entry);
                if filter.matches(&message.from.email) {
                    messages.push(message);
                }
            }

            if let Some(delta_link) = page.delta_link {
                new_cursor = Some(DeltaCursor::new(delta_link));
                break;
            }
            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        debug!("Delta sweep returned {} messages", messages.len());
        Ok(DeltaPage {
            messages,
            cursor: new_cursor,
        })
    }

    fn list_attachments(&self, message_id: &MessageId) -> Result<Vec<AttachmentMeta>, FetchError> {
        let url = format!(
            "{}/me/messages/{}/attachments",
            Self::BASE_URL,
            message_id.as_str()
        );

        let listing: AttachmentListResponse = self.get_json(&url)?;
        Ok(listing
            .value
            .into_iter()
            .map(|entry| AttachmentMeta {
                id: entry.id,
                name: entry.name.unwrap_or_else(|| "unknown".to_string()),
                content_type: entry.content_type,
                size: entry.size,
            })
            .collect())
    }

    /// Download attachment content with exponential backoff retry.
    fn download_attachment(
        &self,
        message_id: &MessageId,
        attachment_id: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(200);

        for attempt in 0..Self::DOWNLOAD_RETRIES {
            match self.download_once(message_id, attachment_id) {
                Ok(bytes) => return Ok(bytes),
                Err(e @ FetchError::NotAuthenticated) => return Err(e),
                Err(e) => {
                    warn!(
                        "Attachment download attempt {} failed for {}: {}",
                        attempt + 1,
                        attachment_id,
                        e
                    );
                    last_error = Some(e);
                    if attempt < Self::DOWNLOAD_RETRIES - 1 {
                        let jitter = Duration::from_millis(rand_jitter());
                        std::thread::sleep(delay + jitter);
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_error.unwrap())
    }
}

/// Generate a random jitter value (0-100ms)
fn rand_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish() % 100
}
