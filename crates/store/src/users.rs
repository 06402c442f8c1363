//! User records and per-user activity.

use {chrono::Utc, tracing::warn};

use crate::{
    Result,
    document::{Change, DocumentStore},
    types::{ActivityEntry, UserActivity, UserProfile, UserRecord},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActivityKind {
    Download,
    Upload,
}

impl DocumentStore {
    /// Insert a new user or refresh an existing one.
    ///
    /// `first_seen` is only set on insertion; `last_seen` is bumped on every
    /// call. Returns `None` without writing when the id is empty.
    pub async fn add_or_update_user(&self, profile: UserProfile) -> Result<Option<UserRecord>> {
        let id = profile.id.trim().to_string();
        if id.is_empty() {
            warn!("add_or_update_user called without a user id");
            return Ok(None);
        }

        self.mutate("add_or_update_user", |doc| {
            let now = Utc::now();
            let record = doc
                .users
                .entry(id.clone())
                .and_modify(|user| {
                    user.username = profile.username.clone();
                    user.first_name = profile.first_name.clone();
                    user.last_name = profile.last_name.clone();
                    if profile.language_code.is_some() {
                        user.language_code = profile.language_code.clone();
                    }
                    user.is_bot = profile.is_bot;
                    user.last_seen = now;
                })
                .or_insert_with(|| UserRecord {
                    id: id.clone(),
                    username: profile.username.clone(),
                    first_name: profile.first_name.clone(),
                    last_name: profile.last_name.clone(),
                    language_code: profile.language_code.clone(),
                    is_bot: profile.is_bot,
                    first_seen: now,
                    last_seen: now,
                    activity: UserActivity::default(),
                });
            Change::Commit(Some(record.clone()))
        })
        .await
    }

    pub fn find_user(&self, user_id: &str) -> Option<UserRecord> {
        self.read(|doc| doc.users.get(user_id).cloned())
    }

    pub fn all_users(&self) -> Vec<UserRecord> {
        self.read(|doc| doc.users.values().cloned().collect())
    }

    pub fn user_count(&self) -> usize {
        self.read(|doc| doc.users.len())
    }

    pub fn user_activity(&self, user_id: &str) -> UserActivity {
        self.read(|doc| {
            doc.users
                .get(user_id)
                .map(|u| u.activity.clone())
                .unwrap_or_default()
        })
    }

    /// Record a font download. Returns `false` for unknown users.
    pub async fn log_download(&self, user_id: &str, font_name: &str) -> Result<bool> {
        self.log_activity(user_id, font_name, ActivityKind::Download)
            .await
    }

    /// Record a font upload. Returns `false` for unknown users.
    pub async fn log_upload(&self, user_id: &str, font_name: &str) -> Result<bool> {
        self.log_activity(user_id, font_name, ActivityKind::Upload)
            .await
    }

    async fn log_activity(&self, user_id: &str, font_name: &str, kind: ActivityKind) -> Result<bool> {
        let user_id = user_id.trim();
        if user_id.is_empty() || font_name.trim().is_empty() {
            warn!(user_id, ?kind, "activity without user id or font name ignored");
            return Ok(false);
        }

        let cap = self.limits().activity_cap;
        let logged = self
            .mutate("log_activity", |doc| {
                let Some(user) = doc.users.get_mut(user_id) else {
                    return Change::Unchanged(false);
                };
                let list = match kind {
                    ActivityKind::Download => &mut user.activity.downloads,
                    ActivityKind::Upload => &mut user.activity.uploads,
                };
                list.insert(0, ActivityEntry {
                    font_name: font_name.to_string(),
                    at: Utc::now(),
                });
                list.truncate(cap);
                user.last_seen = Utc::now();
                Change::Commit(true)
            })
            .await?;

        if !logged {
            warn!(user_id, ?kind, "activity for unknown user ignored");
        }
        Ok(logged)
    }
}
