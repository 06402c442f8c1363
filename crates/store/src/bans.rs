use {
    chrono::Utc,
    tracing::{info, warn},
};

use crate::{
    Result,
    document::{Change, DocumentStore},
    types::{BanEntry, BanOutcome},
};

impl DocumentStore {
    /// Ban a user. Banning twice keeps the original entry and date.
    pub async fn ban_user(&self, user_id: &str, reason: &str) -> Result<BanOutcome> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            warn!("ban_user called without a user id");
            return Ok(BanOutcome::Invalid);
        }

        let outcome = self
            .mutate("ban_user", |doc| {
                if doc.banned_users.contains_key(user_id) {
                    return Change::Unchanged(BanOutcome::AlreadyBanned);
                }
                doc.banned_users.insert(user_id.to_string(), BanEntry {
                    reason: reason.to_string(),
                    date: Utc::now(),
                });
                Change::Commit(BanOutcome::Banned)
            })
            .await?;

        match outcome {
            BanOutcome::Banned => info!(user_id, reason, "user banned"),
            BanOutcome::AlreadyBanned => info!(user_id, "user already banned"),
            BanOutcome::Invalid => {},
        }
        Ok(outcome)
    }

    /// Lift a ban. Returns `false` when the user was not banned.
    pub async fn unban_user(&self, user_id: &str) -> Result<bool> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            warn!("unban_user called without a user id");
            return Ok(false);
        }

        let removed = self
            .mutate("unban_user", |doc| match doc.banned_users.remove(user_id) {
                Some(_) => Change::Commit(true),
                None => Change::Unchanged(false),
            })
            .await?;
        if removed {
            info!(user_id, "user unbanned");
        }
        Ok(removed)
    }

    pub fn is_banned(&self, user_id: &str) -> bool {
        self.read(|doc| doc.banned_users.contains_key(user_id))
    }

    pub fn ban_entry(&self, user_id: &str) -> Option<BanEntry> {
        self.read(|doc| doc.banned_users.get(user_id).cloned())
    }

    /// All bans, oldest first.
    pub fn ban_list(&self) -> Vec<(String, BanEntry)> {
        let mut bans: Vec<_> = self.read(|doc| {
            doc.banned_users
                .iter()
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect()
        });
        bans.sort_by(|a, b| a.1.date.cmp(&b.1.date).then_with(|| a.0.cmp(&b.0)));
        bans
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        crate::{BanOutcome, DocumentStore, StoreLimits},
        tempfile::TempDir,
    };

    async fn store(dir: &TempDir) -> DocumentStore {
        DocumentStore::open(dir.path().join("db.json"), StoreLimits::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn ban_twice_keeps_original_entry() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;

        assert_eq!(
            store.ban_user("42", "spam").await.unwrap(),
            BanOutcome::Banned
        );
        let original = store.ban_entry("42").unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(
            store.ban_user("42", "different reason").await.unwrap(),
            BanOutcome::AlreadyBanned
        );

        let after = store.ban_entry("42").unwrap();
        assert_eq!(after, original);
        assert_eq!(store.ban_list().len(), 1);
    }

    #[tokio::test]
    async fn unban_removes_entry() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;

        store.ban_user("1", "flood").await.unwrap();
        assert!(store.is_banned("1"));
        assert!(store.unban_user("1").await.unwrap());
        assert!(!store.is_banned("1"));
        assert!(!store.unban_user("1").await.unwrap());
    }

    #[tokio::test]
    async fn empty_id_is_rejected_without_writing() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;

        assert_eq!(store.ban_user("", "x").await.unwrap(), BanOutcome::Invalid);
        assert!(store.ban_list().is_empty());
    }

    #[tokio::test]
    async fn ban_list_is_ordered_by_date() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;

        store.ban_user("b", "first").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.ban_user("a", "second").await.unwrap();

        let ids: Vec<_> = store.ban_list().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn missing_user_reads_default_to_falsy() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        assert!(!store.is_banned("nobody"));
        assert!(store.ban_entry("nobody").is_none());
    }
}
