mod admin_commands;
mod app;
mod catalog;
mod config_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Result, bail},
    clap::{Parser, Subcommand},
    fontbot_outbox::QueueWorker,
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::app::AppContext;

#[derive(Parser)]
#[command(name = "fontbot", version, about = "Fontbot: Telegram font bot queue worker and admin tools")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (overrides default ~/.config/fontbot/).
    #[arg(long, global = true, env = "FONTBOT_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
    /// Custom data directory holding db.json (ignored when store.path is set).
    #[arg(long, global = true, env = "FONTBOT_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the queue worker until Ctrl-C (default when no subcommand is given).
    Run,
    /// Queue a message for one chat.
    Send {
        #[arg(long)]
        to: String,
        #[arg(short, long)]
        message: String,
    },
    /// Queue a broadcast to every user who is not banned.
    Broadcast {
        #[arg(short, long)]
        message: String,
    },
    /// Deliver everything queued right now.
    Drain,
    /// Show the queue and the last broadcast.
    Status,
    /// Show user and font statistics.
    Stats {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Ban a user.
    Ban {
        user_id: String,
        #[arg(long, default_value = "banned by admin")]
        reason: String,
    },
    /// Lift a ban.
    Unban { user_id: String },
    /// List banned users.
    Bans,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let ctx = AppContext::load(cli.config_dir.as_deref(), cli.data_dir.as_deref());

    match cli.command {
        None | Some(Commands::Run) => run(&ctx).await,
        Some(Commands::Send { to, message }) => admin_commands::send(&ctx, &to, &message).await,
        Some(Commands::Broadcast { message }) => admin_commands::broadcast(&ctx, &message).await,
        Some(Commands::Drain) => admin_commands::drain(&ctx).await,
        Some(Commands::Status) => admin_commands::status(&ctx).await,
        Some(Commands::Stats { json }) => admin_commands::stats(&ctx, json).await,
        Some(Commands::Ban { user_id, reason }) => {
            admin_commands::ban(&ctx, &user_id, &reason).await
        },
        Some(Commands::Unban { user_id }) => admin_commands::unban(&ctx, &user_id).await,
        Some(Commands::Bans) => admin_commands::bans(&ctx).await,
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, cli.config_dir.as_deref(), &ctx.store_path)
        },
    }
}

/// Open the store, connect to Telegram and drain the queue until Ctrl-C.
async fn run(ctx: &AppContext) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "fontbot starting");

    let validation = fontbot_config::validate_config(&ctx.config);
    for d in &validation.diagnostics {
        match d.severity {
            fontbot_config::Severity::Error => error!(path = %d.path, "{}", d.message),
            fontbot_config::Severity::Warning => warn!(path = %d.path, "{}", d.message),
            fontbot_config::Severity::Info => {},
        }
    }
    if validation.has_errors() {
        bail!("configuration has errors; run `fontbot config check` for details");
    }

    let store = ctx.open_store().await?;
    info!(
        store = %store.path().display(),
        users = store.user_count(),
        queued = store.queue_len(),
        "store opened"
    );

    let _metrics = fontbot_metrics::init_metrics(ctx.metrics_config()?)?;

    let transport = Arc::new(ctx.connect_telegram().await?);
    let worker = QueueWorker::new(
        Arc::clone(&store),
        transport.clone(),
        ctx.throttle(),
        ctx.worker_config(Some(transport.bot_id())),
    );
    worker.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    worker.stop().await;

    if let Some(record) = store.interrupted_broadcast() {
        warn!(
            sent = record.sent,
            failed = record.failed,
            total = record.total,
            "stopped during a broadcast; it will not be resumed"
        );
    }
    Ok(())
}
