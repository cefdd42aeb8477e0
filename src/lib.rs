pub mod models;
pub mod services;
pub mod bot;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

use bot::telegram::TelegramClient;
use bot::Dispatcher;
use services::access_ledger::AccessLedger;
use services::config_store::{AppConfig, ConfigStore};
use services::grammar::{GrammarReviewer, LanguageToolClient};
use services::payment::MpesaClient;

static PROCESS_START: OnceLock<Instant> = OnceLock::new();
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "sagebot_";
const LOGS_TO_KEEP: usize = 30;

fn startup_elapsed_ms() -> u128 {
    PROCESS_START
        .get()
        .map(|t| t.elapsed().as_millis())
        .unwrap_or(0)
}

fn env_flag(key: &str) -> bool {
    matches!(
        std::env::var(key).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE")
    )
}

/// Initialize logging system with timestamped log files
pub fn init_logging() {
    let disable_file_log = env_flag("SAGEBOT_DISABLE_FILE_LOG");
    let disable_cleanup = env_flag("SAGEBOT_DISABLE_LOG_CLEANUP");

    // Configure subscriber filter as early as possible (so fallback logging is consistent).
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if disable_file_log {
        init_console_only_logging(env_filter);
        info!("File logging disabled via SAGEBOT_DISABLE_FILE_LOG");
        return;
    }

    let logs_dir = match std::env::var("SAGEBOT_LOG_DIR") {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => get_logs_dir(),
    };

    if let Err(e) = fs::create_dir_all(&logs_dir) {
        eprintln!("Failed to create logs directory: {}", e);
        init_console_only_logging(env_filter);
        info!("Falling back to console-only logging (log dir not writable)");
        return;
    }

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_filename = format!("{}{}.log", LOG_FILE_PREFIX, timestamp);

    // One file per process run; writes go through a background worker.
    let file_appender = rolling::never(&logs_dir, &log_filename);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(file_guard);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    // A bot runs headless, so the console layer stays on in release builds too.
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    info!("=== SageBot Started ===");
    info!("Log file: {}/{}", logs_dir.display(), log_filename);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if !disable_cleanup {
        std::thread::spawn(move || {
            cleanup_old_logs(&logs_dir, LOGS_TO_KEEP);
        });
    }
}

/// Get the logs directory path
fn get_logs_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("logs")
    }

    #[cfg(not(debug_assertions))]
    {
        if let Some(data_dir) = dirs::data_local_dir() {
            return data_dir.join("sagebot").join("logs");
        }
        PathBuf::from("logs")
    }
}

fn cleanup_old_logs(logs_dir: &Path, keep: usize) {
    let mut entries: Vec<_> = match fs::read_dir(logs_dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).collect(),
        Err(_) => return,
    };

    entries.retain(|e| {
        let name = e.file_name().to_string_lossy().to_string();
        name.starts_with(LOG_FILE_PREFIX) && name.ends_with(".log")
    });

    if entries.len() <= keep {
        return;
    }

    entries.sort_by_key(|e| {
        e.metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });

    let remove_count = entries.len().saturating_sub(keep);
    for entry in entries.into_iter().take(remove_count) {
        let _ = fs::remove_file(entry.path());
    }
}

fn init_console_only_logging(env_filter: EnvFilter) {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}

/// Load `config.json` (plus environment overrides) from the default config dir.
pub fn load_config() -> anyhow::Result<(AppConfig, ConfigStore)> {
    let dir = ConfigStore::default_config_dir().unwrap_or_else(|| PathBuf::from("."));
    let store = ConfigStore::new(dir);
    if let Err(e) = store.sync_file() {
        tracing::warn!(error = %e, "config.sync_failed");
    }
    let config = store.load_effective().map_err(anyhow::Error::msg)?;
    Ok((config, store))
}

pub fn grammar_reviewer(config: &AppConfig) -> GrammarReviewer {
    if config.grammar.use_service {
        GrammarReviewer::new(Some(LanguageToolClient::new(
            &config.grammar.service_url,
            &config.grammar.language,
        )))
    } else {
        GrammarReviewer::offline()
    }
}

/// Start the bot and poll until interrupted.
pub async fn run() -> anyhow::Result<()> {
    PROCESS_START.get_or_init(Instant::now);

    let logging_t0 = Instant::now();
    init_logging();
    info!(startup_ms = startup_elapsed_ms(), logging_ms = logging_t0.elapsed().as_millis(), "logging.initialized");

    let (config, store) = load_config()?;
    if config.bot_token.trim().is_empty() {
        anyhow::bail!(
            "bot token not configured: set SAGEBOT_BOT_TOKEN or botToken in {}",
            store.config_file().display()
        );
    }
    if config.admin_user_id == 0 {
        tracing::warn!("config.admin_not_set");
    }

    fs::create_dir_all(&config.paths.downloads_dir)?;
    fs::create_dir_all(&config.paths.reports_dir)?;
    fs::create_dir_all(&config.paths.callback_inbox_dir)?;

    let ledger = AccessLedger::with_system_clock(&config.paths.ledger_file, config.admin_user_id);
    let grammar = grammar_reviewer(&config);
    let transport = TelegramClient::new(&config.bot_token);
    let gateway = MpesaClient::new(config.payment.clone());

    info!(
        startup_ms = startup_elapsed_ms(),
        config = %store.config_file().display(),
        grammar_service = config.grammar.use_service,
        "bot.initialized"
    );

    let mut dispatcher = Dispatcher::new(transport, gateway, config, ledger, grammar);
    dispatcher.run().await?;

    info!("=== SageBot Exited ===");
    Ok(())
}
