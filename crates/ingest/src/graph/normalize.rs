//! Graph API response normalization
//!
//! Converts Graph delta entries to Courier domain models.

use chrono::{DateTime, Utc};

use super::api::DeltaMessage;
use crate::models::{EmailAddress, Message, MessageId};

/// Normalize a Graph delta entry to a Courier Message.
///
/// Missing fields get conservative defaults: "No Subject", an unknown
/// sender, and `has_attachments = false` (which means the message is
/// skipped rather than probed).
pub fn normalize_message(entry: DeltaMessage) -> Message {
    let from = entry
        .from
        .and_then(|r| r.email_address)
        .map(|payload| match payload.name {
            Some(name) if !name.is_empty() => {
                EmailAddress::with_name(name, payload.address.unwrap_or_default())
            }
            _ => EmailAddress::new(payload.address.unwrap_or_default()),
        })
        .unwrap_or_else(|| EmailAddress::new("unknown@unknown"));

    let received_at = entry
        .received_date_time
        .as_deref()
        .and_then(parse_graph_timestamp)
        .unwrap_or_else(Utc::now);

    Message {
        id: MessageId::new(entry.id),
        subject: entry
            .subject
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "No Subject".to_string()),
        from,
        received_at,
        has_attachments: entry.has_attachments.unwrap_or(false),
        body_preview: entry.body_preview.unwrap_or_default(),
    }
}

/// Parse a Graph ISO-8601 timestamp (always UTC, e.g. "2024-03-01T12:30:00Z")
fn parse_graph_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
