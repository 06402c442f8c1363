//! Persisted document types.

use std::collections::BTreeMap;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// The whole persisted document.
///
/// Unknown top-level keys are kept in `extra` so collections written by other
/// tools (the admin dashboard, older bot versions) survive a rewrite.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
    #[serde(default)]
    pub banned_users: BTreeMap<String, BanEntry>,
    #[serde(default)]
    pub message_queue: Vec<QueuedMessage>,
    #[serde(default)]
    pub file_id_cache: BTreeMap<String, String>,
    #[serde(default)]
    pub broadcast_results: Option<BroadcastRecord>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Profile fields supplied by the bot when a user is seen.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub activity: UserActivity,
}

impl UserRecord {
    /// Human-readable name for logs and admin listings.
    pub fn display_name(&self) -> String {
        match (&self.username, &self.first_name) {
            (Some(username), _) => format!("@{username}"),
            (None, Some(first)) => match &self.last_name {
                Some(last) => format!("{first} {last}"),
                None => first.clone(),
            },
            (None, None) => self.id.clone(),
        }
    }
}

/// Recent downloads and uploads, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    #[serde(default)]
    pub downloads: Vec<ActivityEntry>,
    #[serde(default)]
    pub uploads: Vec<ActivityEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub font_name: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BanEntry {
    pub reason: String,
    pub date: DateTime<Utc>,
}

/// Result of a ban request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanOutcome {
    Banned,
    /// The user was already banned; the existing entry is untouched.
    AlreadyBanned,
    /// Empty user id; nothing was written.
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub chat_id: String,
    pub text: String,
    #[serde(default)]
    pub is_broadcast: bool,
    pub timestamp: DateTime<Utc>,
}

/// Progress checkpoint of the current or last broadcast.
///
/// `completed_at == None` means the broadcast is in flight, or was interrupted
/// by a restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRecord {
    pub message: String,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub errors: Vec<BroadcastError>,
}

impl BroadcastRecord {
    pub fn attempted(&self) -> usize {
        self.sent + self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastError {
    pub user_id: String,
    pub error: String,
}

/// Outcome of one broadcast delivery, as reported to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed(String),
}
