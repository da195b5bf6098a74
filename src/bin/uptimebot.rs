use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use uptimebot::bot;
use uptimebot::config::{BotConfig, DEFAULT_INTERVAL_SECS, SettingsLayout};
use uptimebot::monitor::{MonitorContext, Supervisor};
use uptimebot::notifications::format::{EMPTY_REGISTRY_HINT, NO_ACTIVE_SERVER_HINT, ReportFormat};
use uptimebot::notifications::senders::telegram::TelegramSender;
use uptimebot::notifications::{Notification, NotificationService};
use uptimebot::probe::executor::SshExecutor;
use uptimebot::probe::{Probe, ProbeSettings};
use uptimebot::registry::Registry;
use uptimebot::registry::store::{LegacyStore, MultiServerStore, SettingsStore, migrate};
use uptimebot::state::AppState;
use uptimebot::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a single-server settings file into the multi-server layout
    Migrate {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "uptimebot.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

fn open_store(config: &BotConfig) -> Box<dyn SettingsStore> {
    match config.settings_layout {
        SettingsLayout::Multi => Box::new(MultiServerStore::new(
            &config.settings_file,
            config.default_interval_secs,
        )),
        SettingsLayout::Legacy => Box::new(LegacyStore::new(
            &config.settings_file,
            config.default_interval_secs,
        )),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    if let Some(Commands::Migrate { from, to }) = args.command {
        let moved = migrate(
            &LegacyStore::new(&from, DEFAULT_INTERVAL_SECS),
            &MultiServerStore::new(&to, DEFAULT_INTERVAL_SECS),
        )?;
        println!("Migrated {moved} server(s) from {from} to {to}.");
        return Ok(());
    }

    let config = BotConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!("Starting uptimebot, version: {}", VERSION);

    let registry = match Registry::open(open_store(&config), config.default_interval_secs) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Failed to open settings file {}: {}", config.settings_file, e);
            return Err(e.into());
        }
    };

    let executor = Arc::new(SshExecutor::new(
        &config.ssh_username,
        &config.private_key_path,
        Duration::from_secs(config.connect_timeout_secs),
    ));
    let probe = Arc::new(Probe::new(
        executor,
        ProbeSettings {
            volume: config.monitored_volume.clone(),
            output_dir: config.output_dir.clone(),
            cleanup_threshold_gib: config.cleanup_threshold_gib,
        },
    ));
    let notifier = NotificationService::new(Arc::new(TelegramSender::new(
        &config.telegram_token,
        config.telegram_chat_id,
    )));

    let ctx = Arc::new(MonitorContext {
        registry: registry.clone(),
        probe,
        notifier: notifier.clone(),
        format: ReportFormat {
            volume: config.monitored_volume.clone(),
            output_dir: config.output_dir.clone(),
            disk_warn_percent: config.disk_warn_percent,
        },
    });
    let supervisor = Arc::new(Supervisor::new(ctx));

    match config.settings_layout {
        SettingsLayout::Multi => {
            if supervisor.start_all().await == 0 {
                notifier
                    .dispatch(Notification::routine(EMPTY_REGISTRY_HINT))
                    .await;
            }
        }
        SettingsLayout::Legacy => match registry.active().await {
            Some(target) => {
                supervisor.start(&target.host).await;
            }
            None => {
                warn!("No active server configured.");
                notifier
                    .dispatch(Notification::routine(NO_ACTIVE_SERVER_HINT))
                    .await;
            }
        },
    }

    let state = Arc::new(AppState::new(supervisor.clone()));
    let bot = Bot::new(&config.telegram_token);
    bot::run(bot, state, ChatId(config.telegram_chat_id), config.settings_layout).await;

    info!("Shutting down.");
    supervisor.shutdown().await;
    Ok(())
}
