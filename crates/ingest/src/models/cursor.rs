//! Delta cursor for incremental mailbox sync

use serde::{Deserialize, Serialize};

/// Opaque provider-issued token marking the last synchronized position.
///
/// For Microsoft Graph this is the full `@odata.deltaLink` URL returned at
/// the end of a delta sweep. Resubmitting it fetches only changes since that
/// position. The value is treated as opaque: Courier never inspects it, only
/// persists and replays it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeltaCursor(String);

impl DeltaCursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeltaCursor {
    fn from(s: String) -> Self {
        Self(s)
    }
}
