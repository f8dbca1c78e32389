//! Microsoft Graph API integration
//!
//! This module provides:
//! - OAuth2 client-credentials authentication
//! - Graph API client with cursor-based delta sync
//! - Response normalization to domain models

mod auth;
mod client;
mod normalize;

pub use auth::{AccessToken, AuthError, GraphAuth};
pub use client::{FetchError, GraphClient};
pub use normalize::normalize_message;

use crate::models::{DeltaCursor, Message, MessageId};

/// One complete delta sweep: every new message plus the cursor to resume
/// from next time.
///
/// `cursor` is `None` only when the provider ended the sweep without
/// issuing a delta link; callers keep their previous cursor in that case.
#[derive(Debug, Clone)]
pub struct DeltaPage {
    pub messages: Vec<Message>,
    pub cursor: Option<DeltaCursor>,
}

/// Case-insensitive substring filter over sender addresses.
///
/// An empty filter accepts every sender.
#[derive(Debug, Clone, Default)]
pub struct SenderFilter {
    groups: Vec<String>,
}

impl SenderFilter {
    pub fn new(groups: Vec<String>) -> Self {
        Self {
            groups: groups.into_iter().map(|g| g.to_lowercase()).collect(),
        }
    }

    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn matches(&self, sender_address: &str) -> bool {
        if self.groups.is_empty() {
            return true;
        }
        let sender = sender_address.to_lowercase();
        self.groups.iter().any(|g| sender.contains(g))
    }
}

/// Source of mail for the ingestion loop.
///
/// `GraphClient` is the production implementation; tests drive the loop
/// against an in-memory mailbox.
pub trait MailSource: Send {
    /// Exchange configured credentials for a fresh access token.
    ///
    /// Called once per cycle; tokens are not refreshed mid-cycle.
    fn authenticate(&mut self) -> Result<(), AuthError>;

    /// Fetch messages added since `cursor` (full sync when `None`),
    /// following pagination to exhaustion. Tombstoned entries are dropped
    /// and the sender filter applied before returning.
    fn fetch_new_messages(
        &self,
        cursor: Option<&DeltaCursor>,
        filter: &SenderFilter,
    ) -> Result<DeltaPage, FetchError>;

    /// List attachment metadata for a message.
    fn list_attachments(&self, message_id: &MessageId) -> Result<Vec<AttachmentMeta>, FetchError>;

    /// Download one attachment's raw bytes.
    fn download_attachment(
        &self,
        message_id: &MessageId,
        attachment_id: &str,
    ) -> Result<Vec<u8>, FetchError>;
}

/// Attachment metadata as listed by the provider
#[derive(Debug, Clone)]
pub struct AttachmentMeta {
    pub id: String,
    pub name: String,
    pub content_type: Option<String>,
    pub size: Option<u64>,
}

/// Graph API response types
pub mod api {
    use serde::Deserialize;

    /// Response from the OAuth2 token endpoint
    #[derive(Debug, Deserialize)]
    pub struct TokenResponse {
        pub access_token: String,
        pub expires_in: Option<u64>,
        #[allow(dead_code)]
        pub token_type: Option<String>,
    }

    /// One page of a delta query
    #[derive(Debug, Deserialize)]
    pub struct DeltaResponse {
        #[serde(default)]
        pub value: Vec<DeltaMessage>,
        #[serde(rename = "@odata.nextLink")]
        pub next_link: Option<String>,
        #[serde(rename = "@odata.deltaLink")]
        pub delta_link: Option<String>,
    }

    /// A message entry in a delta page
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DeltaMessage {
        pub id: String,
        pub subject: Option<String>,
        pub from: Option<Recipient>,
        pub received_date_time: Option<String>,
        pub has_attachments: Option<bool>,
        pub body_preview: Option<String>,
        /// Present on tombstones for deleted messages
        #[serde(rename = "@removed")]
        pub removed: Option<serde_json::Value>,
    }

    /// Sender or recipient wrapper
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Recipient {
        pub email_address: Option<EmailAddressPayload>,
    }

    /// Raw address payload
    #[derive(Debug, Deserialize)]
    pub struct EmailAddressPayload {
        pub name: Option<String>,
        pub address: Option<String>,
    }

    /// Response from the attachment list endpoint
    #[derive(Debug, Deserialize)]
    pub struct AttachmentListResponse {
        #[serde(default)]
        pub value: Vec<AttachmentEntry>,
    }

    /// One attachment as listed by the provider
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AttachmentEntry {
        pub id: String,
        pub name: Option<String>,
        pub content_type: Option<String>,
        pub size: Option<u64>,
    }
}
