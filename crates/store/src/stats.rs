//! Aggregates for the admin dashboard.

use std::collections::HashMap;

use {
    chrono::{Duration, Utc},
    serde::Serialize,
};

use crate::document::DocumentStore;

/// Source of the font count. The store does not own font metadata.
pub trait FontCatalog: Send + Sync {
    fn font_count(&self) -> usize;
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_users: usize,
    pub active_users_24h: usize,
    pub new_users_24h: usize,
    pub banned_users: usize,
    pub bot_accounts: usize,
    /// Downloads still held in the per-user activity lists.
    pub recorded_downloads: usize,
    pub recorded_uploads: usize,
    pub queued_messages: usize,
    pub cached_file_ids: usize,
    pub total_fonts: usize,
    pub broadcast_in_flight: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FontPopularity {
    pub font_name: String,
    pub downloads: usize,
}

impl DocumentStore {
    pub fn stats(&self, catalog: &dyn FontCatalog) -> StoreStats {
        let day_ago = Utc::now() - Duration::hours(24);
        let mut stats = self.read(|doc| StoreStats {
            total_users: doc.users.len(),
            active_users_24h: doc.users.values().filter(|u| u.last_seen >= day_ago).count(),
            new_users_24h: doc.users.values().filter(|u| u.first_seen >= day_ago).count(),
            banned_users: doc.banned_users.len(),
            bot_accounts: doc.users.values().filter(|u| u.is_bot).count(),
            recorded_downloads: doc.users.values().map(|u| u.activity.downloads.len()).sum(),
            recorded_uploads: doc.users.values().map(|u| u.activity.uploads.len()).sum(),
            queued_messages: doc.message_queue.len(),
            cached_file_ids: doc.file_id_cache.len(),
            total_fonts: 0,
            broadcast_in_flight: doc
                .broadcast_results
                .as_ref()
                .is_some_and(|r| !r.is_complete()),
        });
        stats.total_fonts = catalog.font_count();
        stats
    }

    /// Most downloaded fonts across the recorded activity lists.
    pub fn top_fonts(&self, limit: usize) -> Vec<FontPopularity> {
        let counts = self.read(|doc| {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for entry in doc.users.values().flat_map(|u| &u.activity.downloads) {
                *counts.entry(entry.font_name.clone()).or_default() += 1;
            }
            counts
        });
        let mut ranked: Vec<_> = counts
            .into_iter()
            .map(|(font_name, downloads)| FontPopularity {
                font_name,
                downloads,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.downloads
                .cmp(&a.downloads)
                .then_with(|| a.font_name.cmp(&b.font_name))
        });
        ranked.truncate(limit);
        ranked
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{StoreLimits, types::UserProfile},
        tempfile::TempDir,
    };

    struct FixedCatalog(usize);

    impl FontCatalog for FixedCatalog {
        fn font_count(&self) -> usize {
            self.0
        }
    }

    #[tokio::test]
    async fn stats_aggregate_all_collections() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::open(tmp.path().join("db.json"), StoreLimits::default())
            .await
            .unwrap();

        store.add_or_update_user(UserProfile::new("1")).await.unwrap();
        store.add_or_update_user(UserProfile::new("2")).await.unwrap();
        let mut bot = UserProfile::new("3");
        bot.is_bot = true;
        store.add_or_update_user(bot).await.unwrap();
        store.ban_user("2", "spam").await.unwrap();
        store.log_download("1", "Inter").await.unwrap();
        store.log_upload("1", "MyFont").await.unwrap();
        store.cache_file_id("Inter", "file").await.unwrap();
        store.enqueue_message("1", "hi", false).await.unwrap();
        store.start_broadcast_log("news", 1).await.unwrap();

        let stats = store.stats(&FixedCatalog(120));
        assert_eq!(stats, StoreStats {
            total_users: 3,
            active_users_24h: 3,
            new_users_24h: 3,
            banned_users: 1,
            bot_accounts: 1,
            recorded_downloads: 1,
            recorded_uploads: 1,
            queued_messages: 1,
            cached_file_ids: 1,
            total_fonts: 120,
            broadcast_in_flight: true,
        });
    }

    #[tokio::test]
    async fn top_fonts_ranks_by_downloads() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::open(tmp.path().join("db.json"), StoreLimits::default())
            .await
            .unwrap();
        for id in ["1", "2"] {
            store.add_or_update_user(UserProfile::new(id)).await.unwrap();
        }
        store.log_download("1", "Roboto").await.unwrap();
        store.log_download("2", "Roboto").await.unwrap();
        store.log_download("2", "Arial").await.unwrap();
        store.log_download("1", "Lato").await.unwrap();

        let top = store.top_fonts(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0], FontPopularity {
            font_name: "Roboto".into(),
            downloads: 2,
        });
        assert_eq!(top[1].font_name, "Arial");
    }
}
