//! Durable broadcast progress.
//!
//! Only one broadcast is tracked at a time. Each delivery outcome is written
//! on its own, so after a crash `sent + failed` equals the number of
//! recipients actually attempted.

use {
    chrono::Utc,
    tracing::{debug, info, warn},
};

use crate::{
    Result,
    document::{Change, DocumentStore},
    types::{BroadcastError, BroadcastRecord, DeliveryOutcome, UserRecord},
};

impl DocumentStore {
    /// Users a broadcast should reach: everyone except banned users, bot
    /// accounts and the ids in `excluded`.
    pub fn broadcast_recipients(&self, excluded: &[String]) -> Vec<UserRecord> {
        self.read(|doc| {
            doc.users
                .values()
                .filter(|u| !u.is_bot)
                .filter(|u| !doc.banned_users.contains_key(&u.id))
                .filter(|u| !excluded.iter().any(|id| id == &u.id))
                .cloned()
                .collect()
        })
    }

    /// Start tracking a new broadcast, replacing any previous record.
    pub async fn start_broadcast_log(&self, message: &str, total: usize) -> Result<BroadcastRecord> {
        let record = BroadcastRecord {
            message: message.to_string(),
            total,
            sent: 0,
            failed: 0,
            started_at: Utc::now(),
            completed_at: None,
            errors: Vec::new(),
        };
        let replaced = self
            .mutate("start_broadcast_log", |doc| {
                let previous = doc.broadcast_results.replace(record.clone());
                Change::Commit(previous)
            })
            .await?;

        if let Some(previous) = replaced
            && !previous.is_complete()
        {
            warn!(
                previous_sent = previous.sent,
                previous_failed = previous.failed,
                previous_total = previous.total,
                "replacing an unfinished broadcast record"
            );
        }
        info!(total, "broadcast started");
        Ok(record)
    }

    /// Record one delivery outcome. Returns `false` when no broadcast is
    /// being tracked.
    pub async fn log_broadcast_result(
        &self,
        user_id: &str,
        outcome: DeliveryOutcome,
    ) -> Result<bool> {
        let limits = self.limits();
        let logged = self
            .mutate("log_broadcast_result", |doc| {
                let Some(record) = doc.broadcast_results.as_mut() else {
                    return Change::Unchanged(false);
                };
                match &outcome {
                    DeliveryOutcome::Sent => record.sent += 1,
                    DeliveryOutcome::Failed(error) => {
                        record.failed += 1;
                        if record.errors.len() < limits.broadcast_error_cap {
                            record.errors.push(BroadcastError {
                                user_id: user_id.to_string(),
                                error: error.chars().take(limits.error_max_len).collect(),
                            });
                        }
                    },
                }
                Change::Commit(true)
            })
            .await?;

        if !logged {
            warn!(user_id, "broadcast result logged with no broadcast in progress");
        }
        Ok(logged)
    }

    /// Close the current broadcast record.
    pub async fn end_broadcast_log(&self) -> Result<Option<BroadcastRecord>> {
        let record = self
            .mutate("end_broadcast_log", |doc| match doc.broadcast_results.as_mut() {
                Some(record) if record.completed_at.is_none() => {
                    record.completed_at = Some(Utc::now());
                    Change::Commit(Some(record.clone()))
                },
                Some(record) => Change::Unchanged(Some(record.clone())),
                None => Change::Unchanged(None),
            })
            .await?;

        match &record {
            Some(r) => info!(
                total = r.total,
                sent = r.sent,
                failed = r.failed,
                "broadcast finished"
            ),
            None => debug!("end_broadcast_log with no broadcast record"),
        }
        Ok(record)
    }

    pub fn broadcast_status(&self) -> Option<BroadcastRecord> {
        self.read(|doc| doc.broadcast_results.clone())
    }

    /// An open record left behind by a broadcast that never finished.
    pub fn interrupted_broadcast(&self) -> Option<BroadcastRecord> {
        self.broadcast_status().filter(|r| !r.is_complete())
    }
}
