//! Font name → Telegram file id cache. Lets the bot resend an already
//! uploaded font without uploading the file again.

use tracing::{debug, warn};

use crate::{
    Result,
    document::{Change, DocumentStore},
};

impl DocumentStore {
    pub fn cached_file_id(&self, font_name: &str) -> Option<String> {
        self.read(|doc| doc.file_id_cache.get(font_name).cloned())
    }

    pub async fn cache_file_id(&self, font_name: &str, file_id: &str) -> Result<()> {
        if font_name.is_empty() || file_id.is_empty() {
            warn!(font_name, "cache_file_id called with empty font name or file id");
            return Ok(());
        }
        self.mutate("cache_file_id", |doc| {
            if doc.file_id_cache.get(font_name).map(String::as_str) == Some(file_id) {
                return Change::Unchanged(());
            }
            doc.file_id_cache
                .insert(font_name.to_string(), file_id.to_string());
            Change::Commit(())
        })
        .await?;
        debug!(font_name, "file id cached");
        Ok(())
    }

    /// Drop a cached file id, e.g. after Telegram rejected it as stale.
    pub async fn evict_file_id(&self, font_name: &str) -> Result<bool> {
        self.mutate("evict_file_id", |doc| {
            match doc.file_id_cache.remove(font_name) {
                Some(_) => Change::Commit(true),
                None => Change::Unchanged(false),
            }
        })
        .await
    }
}
