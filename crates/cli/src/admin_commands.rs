//! Admin commands that work on the store file directly.
//!
//! Run them while the bot is stopped: the running process keeps its own copy
//! of the document and rewrites the whole file on its next change.

use std::{fmt::Write as _, sync::Arc};

use {
    anyhow::{Result, bail},
    fontbot_outbox::QueueWorker,
    fontbot_store::{BanOutcome, BroadcastRecord, DocumentStore},
    serde_json::json,
};

use crate::app::AppContext;

const TOP_FONTS: usize = 10;

pub async fn send(ctx: &AppContext, to: &str, message: &str) -> Result<()> {
    let store = ctx.open_store().await?;
    let report = store.enqueue_message(to, message, false).await?;
    if !report.queued {
        bail!("nothing queued: chat id and message must not be empty");
    }
    println!("Queued message for {to}.");
    if report.truncated {
        println!(
            "Text was truncated to {} characters.",
            ctx.config.queue.max_text_len
        );
    }
    if report.dropped > 0 {
        println!(
            "Queue was full: {} oldest message(s) dropped.",
            report.dropped
        );
    }
    Ok(())
}

pub async fn broadcast(ctx: &AppContext, message: &str) -> Result<()> {
    let Some(admin) = ctx.admin_chat_id() else {
        bail!("broadcasts are reported to the admin; set telegram.admin_id or FONTBOT_ADMIN_ID");
    };
    let store = ctx.open_store().await?;
    let recipients = store
        .broadcast_recipients(&ctx.broadcast_excluded(None))
        .len();
    let report = store.enqueue_message(&admin, message, true).await?;
    if !report.queued {
        bail!("nothing queued: message must not be empty");
    }
    println!("Broadcast queued for {recipients} recipient(s); it runs on the next drain.");
    Ok(())
}

/// Deliver everything queued now, without starting the worker loop.
pub async fn drain(ctx: &AppContext) -> Result<()> {
    let store = ctx.open_store().await?;
    if store.queue_len() == 0 {
        println!("Queue is empty.");
        return Ok(());
    }
    let transport = Arc::new(ctx.connect_telegram().await?);
    let bot_id = transport.bot_id();
    let worker = QueueWorker::new(store, transport, ctx.throttle(), ctx.worker_config(Some(bot_id)));
    let report = worker.tick().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn status(ctx: &AppContext) -> Result<()> {
    let store = ctx.open_store().await?;
    print!("{}", format_status(&store, ctx));
    Ok(())
}

fn format_status(store: &DocumentStore, ctx: &AppContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Store:   {}", store.path().display());
    let _ = writeln!(
        out,
        "Queue:   {} / {} message(s)",
        store.queue_len(),
        ctx.config.queue.capacity
    );
    for message in store.queued_messages() {
        let kind = if message.is_broadcast {
            "broadcast"
        } else {
            "message"
        };
        let _ = writeln!(
            out,
            "  {} {kind} to {}: {}",
            message.timestamp.format("%Y-%m-%d %H:%M:%S"),
            message.chat_id,
            preview(&message.text, 48)
        );
    }
    match store.broadcast_status() {
        Some(record) => {
            let _ = writeln!(out, "{}", describe_broadcast(&record));
        },
        None => {
            let _ = writeln!(out, "Broadcast: none yet");
        },
    }
    out
}

fn describe_broadcast(record: &BroadcastRecord) -> String {
    let state = match record.completed_at {
        Some(done) => format!("completed {}", done.format("%Y-%m-%d %H:%M:%S")),
        None => "not completed (running or interrupted)".to_string(),
    };
    let mut out = format!(
        "Broadcast: {state}\n  started {}, {} of {} attempted, {} sent, {} failed",
        record.started_at.format("%Y-%m-%d %H:%M:%S"),
        record.attempted(),
        record.total,
        record.sent,
        record.failed
    );
    for error in &record.errors {
        let _ = write!(out, "\n  {}: {}", error.user_id, error.error);
    }
    out
}

fn preview(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > max_chars || line.len() < text.len() {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}

pub async fn stats(ctx: &AppContext, as_json: bool) -> Result<()> {
    let store = ctx.open_store().await?;
    let catalog = ctx.catalog();
    let stats = store.stats(&catalog);
    let top = store.top_fonts(TOP_FONTS);

    if as_json {
        let body = json!({ "stats": stats, "topFonts": top });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("Users:           {}", stats.total_users);
    println!("  active (24h):  {}", stats.active_users_24h);
    println!("  new (24h):     {}", stats.new_users_24h);
    println!("  banned:        {}", stats.banned_users);
    println!("  bots:          {}", stats.bot_accounts);
    println!("Fonts:           {}", stats.total_fonts);
    println!("Cached file ids: {}", stats.cached_file_ids);
    println!(
        "Activity:        {} download(s), {} upload(s) recorded",
        stats.recorded_downloads, stats.recorded_uploads
    );
    println!("Queued:          {}", stats.queued_messages);
    if stats.broadcast_in_flight {
        println!("A broadcast is in flight or was interrupted.");
    }
    if !top.is_empty() {
        println!("Top fonts:");
        for (rank, font) in top.iter().enumerate() {
            println!("  {:>2}. {} ({})", rank + 1, font.font_name, font.downloads);
        }
    }
    Ok(())
}

pub async fn ban(ctx: &AppContext, user_id: &str, reason: &str) -> Result<()> {
    let store = ctx.open_store().await?;
    match store.ban_user(user_id, reason).await? {
        BanOutcome::Banned => println!("Banned {user_id}."),
        BanOutcome::AlreadyBanned => println!("{user_id} is already banned."),
        BanOutcome::Invalid => bail!("user id must not be empty"),
    }
    Ok(())
}

pub async fn unban(ctx: &AppContext, user_id: &str) -> Result<()> {
    let store = ctx.open_store().await?;
    if store.unban_user(user_id).await? {
        println!("Unbanned {user_id}.");
    } else {
        println!("{user_id} was not banned.");
    }
    Ok(())
}

pub async fn bans(ctx: &AppContext) -> Result<()> {
    let store = ctx.open_store().await?;
    let bans = store.ban_list();
    if bans.is_empty() {
        println!("No banned users.");
        return Ok(());
    }
    for (user_id, entry) in bans {
        let name = store
            .find_user(&user_id)
            .map(|u| u.display_name())
            .unwrap_or_default();
        println!(
            "{user_id:<14} {}  {name:<20} {}",
            entry.date.format("%Y-%m-%d"),
            entry.reason
        );
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        fontbot_config::FontbotConfig,
        fontbot_store::{DeliveryOutcome, UserProfile},
        tempfile::TempDir,
    };

    fn context(dir: &TempDir) -> AppContext {
        let mut config = FontbotConfig::default();
        config.telegram.admin_id = Some(1);
        AppContext::from_config(config, Some(dir.path()))
    }

    #[test]
    fn preview_cuts_long_and_multiline_text() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdefghijkl", 5), "abcde…");
        assert_eq!(preview("first\nsecond", 20), "first…");
    }

    #[tokio::test]
    async fn status_lists_queue_and_broadcast() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);

        send(&ctx, "77", "your font is ready").await.unwrap();
        broadcast(&ctx, "new fonts this week").await.unwrap();

        let store = ctx.open_store().await.unwrap();
        store.start_broadcast_log("earlier", 2).await.unwrap();
        store
            .log_broadcast_result("5", DeliveryOutcome::Failed("blocked".into()))
            .await
            .unwrap();

        let text = format_status(&store, &ctx);
        assert!(text.contains("Queue:   2 / 1000"));
        assert!(text.contains("message to 77: your font is ready"));
        assert!(text.contains("broadcast to 1: new fonts this week"));
        assert!(text.contains("not completed"));
        assert!(text.contains("1 of 2 attempted"));
        assert!(text.contains("5: blocked"));
    }

    #[tokio::test]
    async fn ban_and_unban_round_trip() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        ctx.open_store()
            .await
            .unwrap()
            .add_or_update_user(UserProfile::new("99"))
            .await
            .unwrap();

        ban(&ctx, "99", "spam").await.unwrap();
        ban(&ctx, "99", "again").await.unwrap();
        assert!(ban(&ctx, "", "x").await.is_err());

        let store = ctx.open_store().await.unwrap();
        assert_eq!(store.ban_entry("99").unwrap().reason, "spam");

        unban(&ctx, "99").await.unwrap();
        assert!(!ctx.open_store().await.unwrap().is_banned("99"));
    }

    #[tokio::test]
    async fn broadcast_requires_admin() {
        let tmp = TempDir::new().unwrap();
        let ctx = AppContext::from_config(FontbotConfig::default(), Some(tmp.path()));
        assert!(broadcast(&ctx, "hello").await.is_err());
        assert_eq!(ctx.open_store().await.unwrap().queue_len(), 0);
    }
}
