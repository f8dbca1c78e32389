//! Attachment queue payload

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EmailAddress, Message};

/// Email context carried alongside every queued attachment.
///
/// Workers process attachments long after the originating cycle finished, so
/// the record must be self-contained: everything a downstream pipeline needs
/// about the email travels with the attachment bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailContext {
    pub message_id: String,
    pub subject: String,
    pub sender_name: Option<String>,
    pub sender_address: String,
    pub body_preview: String,
    pub received_at: DateTime<Utc>,
}

impl EmailContext {
    pub fn from_message(message: &Message) -> Self {
        Self {
            message_id: message.id.as_str().to_string(),
            subject: message.subject.clone(),
            sender_name: message.from.name.clone(),
            sender_address: message.from.email.clone(),
            body_preview: message.body_preview.clone(),
            received_at: message.received_at,
        }
    }

    pub fn sender(&self) -> EmailAddress {
        match &self.sender_name {
            Some(name) => EmailAddress::with_name(name, &self.sender_address),
            None => EmailAddress::new(&self.sender_address),
        }
    }
}

/// A single attachment staged for processing.
///
/// `task_id` is generated per enqueue attempt, not per logical attachment:
/// re-enqueueing the same attachment yields a fresh id so result artifacts
/// from different attempts never collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub task_id: String,
    pub email: EmailContext,
    pub attachment_id: String,
    pub filename: String,
    #[serde(with = "content_base64")]
    pub content: Vec<u8>,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

impl AttachmentRecord {
    /// Build a record from a downloaded attachment.
    ///
    /// The MIME type is inferred from the filename extension, falling back
    /// to `application/octet-stream` when unknown.
    pub fn new(
        email: EmailContext,
        attachment_id: impl Into<String>,
        filename: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        let attachment_id = attachment_id.into();
        let filename = filename.into();
        let mime_type = mime_guess::from_path(&filename)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let size = content.len() as u64;
        let task_id = Self::task_id_for(&email.message_id, &attachment_id);

        Self {
            task_id,
            email,
            attachment_id,
            filename,
            content,
            mime_type,
            size,
            created_at: Utc::now(),
        }
    }

    /// Generate a task id: `{msg8}_{att8}_{uuid8}`.
    ///
    /// The uuid suffix keeps retried enqueues distinct.
    pub fn task_id_for(message_id: &str, attachment_id: &str) -> String {
        let msg = &message_id[..message_id.len().min(8)];
        let att = &attachment_id[..attachment_id.len().min(8)];
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        format!("{}_{}_{}", msg, att, &uuid[..8])
    }

    /// Lowercase extension of the original filename, including the dot
    /// (empty string when there is none).
    pub fn extension(&self) -> String {
        match self.filename.rfind('.') {
            Some(idx) => self.filename[idx..].to_lowercase(),
            None => String::new(),
        }
    }

    /// Collision-free filename for saving: `YYYY-MM-DD_{task8}_{original}`.
    pub fn unique_filename(&self) -> String {
        let date = self.created_at.format("%Y-%m-%d");
        let task = &self.task_id[..self.task_id.len().min(8)];
        format!("{}_{}_{}", date, task, self.filename)
    }

    /// Serialize to the queue wire format (JSON, content as base64).
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize attachment record")
    }

    /// Deserialize from the queue wire format.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse attachment record")
    }

    /// Short identifier for log lines
    pub fn describe(&self) -> String {
        format!("{} ({}, {} bytes)", self.filename, self.task_id, self.size)
    }
}

/// Base64 encoding for attachment bytes in the JSON wire format.
///
/// Must round-trip losslessly for arbitrary binary content.
mod content_base64 {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
