// Configuration Storage Service
// Handles config file read/write, version backup and environment overrides

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::grammar::LANGUAGETOOL_DEFAULT_URL;

pub const MPESA_SANDBOX_URL: &str = "https://sandbox.safaricom.co.ke";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub admin_user_id: i64,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub grammar: GrammarConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathsConfig {
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,
    #[serde(default = "default_corpus_file")]
    pub corpus_file: PathBuf,
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    /// Daraja callback bodies dropped here as `*.json` are applied by the bot.
    #[serde(default = "default_callback_inbox_dir")]
    pub callback_inbox_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            ledger_file: default_ledger_file(),
            corpus_file: default_corpus_file(),
            downloads_dir: default_downloads_dir(),
            reports_dir: default_reports_dir(),
            callback_inbox_dir: default_callback_inbox_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionConfig {
    #[serde(default = "default_top_n")]
    pub plagiarism_top_n: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            plagiarism_top_n: default_top_n(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarConfig {
    #[serde(default = "default_true")]
    pub use_service: bool,
    #[serde(default = "default_languagetool_url")]
    pub service_url: String,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            use_service: true,
            service_url: default_languagetool_url(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfig {
    #[serde(default = "default_mpesa_url")]
    pub base_url: String,
    #[serde(default)]
    pub consumer_key: String,
    #[serde(default)]
    pub consumer_secret: String,
    #[serde(default = "default_shortcode")]
    pub shortcode: String,
    #[serde(default)]
    pub passkey: String,
    #[serde(default)]
    pub callback_url: String,
    #[serde(default = "default_amount")]
    pub amount: u32,
    #[serde(default = "default_access_days")]
    pub access_days: u32,
    #[serde(default = "default_account_reference")]
    pub account_reference: String,
    #[serde(default = "default_transaction_desc")]
    pub transaction_desc: String,
    #[serde(default = "default_pending_ttl_minutes")]
    pub pending_ttl_minutes: u32,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            base_url: default_mpesa_url(),
            consumer_key: String::new(),
            consumer_secret: String::new(),
            shortcode: default_shortcode(),
            passkey: String::new(),
            callback_url: String::new(),
            amount: default_amount(),
            access_days: default_access_days(),
            account_reference: default_account_reference(),
            transaction_desc: default_transaction_desc(),
            pending_ttl_minutes: default_pending_ttl_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfig {
    #[serde(default = "default_highlights")]
    pub highlights: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            highlights: default_highlights(),
        }
    }
}

fn default_ledger_file() -> PathBuf { PathBuf::from("paid_users.json") }
fn default_corpus_file() -> PathBuf { PathBuf::from("plagiarism_database.csv") }
fn default_downloads_dir() -> PathBuf { PathBuf::from("downloads") }
fn default_reports_dir() -> PathBuf { PathBuf::from("reports") }
fn default_callback_inbox_dir() -> PathBuf { PathBuf::from("callbacks") }
fn default_top_n() -> usize { 3 }
fn default_true() -> bool { true }
fn default_languagetool_url() -> String { LANGUAGETOOL_DEFAULT_URL.to_string() }
fn default_language() -> String { "en-US".to_string() }
fn default_mpesa_url() -> String { MPESA_SANDBOX_URL.to_string() }
fn default_shortcode() -> String { "174379".to_string() }
fn default_amount() -> u32 { 200 }
fn default_access_days() -> u32 { 30 }
fn default_account_reference() -> String { "SageBot Subscription".to_string() }
fn default_transaction_desc() -> String { "SageBot 30-day Access Payment".to_string() }
fn default_pending_ttl_minutes() -> u32 { 30 }
fn default_highlights() -> Vec<String> { vec!["AI".to_string(), "plagiarized".to_string()] }

impl AppConfig {
    /// Overlay secrets and deployment settings from the environment.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_value("SAGEBOT_BOT_TOKEN") {
            self.bot_token = v;
        }
        if let Some(id) = env_value("SAGEBOT_ADMIN_ID").and_then(|v| v.parse().ok()) {
            self.admin_user_id = id;
        }
        if let Some(v) = env_value("MPESA_CONSUMER_KEY") {
            self.payment.consumer_key = v;
        }
        if let Some(v) = env_value("MPESA_CONSUMER_SECRET") {
            self.payment.consumer_secret = v;
        }
        if let Some(v) = env_value("MPESA_PASSKEY") {
            self.payment.passkey = v;
        }
        if let Some(v) = env_value("MPESA_SHORTCODE") {
            self.payment.shortcode = v;
        }
        if let Some(v) = env_value("MPESA_CALLBACK_URL") {
            self.payment.callback_url = v;
        }
        if let Some(v) = env_value("LANGUAGETOOL_URL") {
            self.grammar.service_url = v;
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

const BACKUPS_TO_KEEP: usize = 10;

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// `SAGEBOT_CONFIG_DIR`, else `<config dir>/sagebot`.
    pub fn default_config_dir() -> Option<PathBuf> {
        if let Some(dir) = env_value("SAGEBOT_CONFIG_DIR") {
            return Some(PathBuf::from(dir));
        }
        dirs::config_dir().map(|p| p.join("sagebot"))
    }

    pub fn config_file(&self) -> &PathBuf {
        &self.config_file
    }

    fn backup_dir(&self) -> PathBuf {
        self.config_dir.join("backups")
    }

    fn read_file_value(&self) -> Result<Option<Value>, String> {
        if !self.config_file.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| format!("Failed to read config: {}", e))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// File settings only, without environment overrides. A missing file gives defaults.
    pub fn load(&self) -> Result<AppConfig, String> {
        match self.read_file_value()? {
            Some(value) => serde_json::from_value(value).map_err(|e| format!("Failed to parse config: {}", e)),
            None => Ok(AppConfig::default()),
        }
    }

    pub fn load_effective(&self) -> Result<AppConfig, String> {
        let mut config = self.load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Write the file-level config back when the file is missing or lacks
    /// keys that now have defaults. Returns whether the file was written.
    pub fn sync_file(&self) -> Result<bool, String> {
        let on_disk = self.read_file_value()?;
        let config = self.load()?;
        let complete = serde_json::to_value(&config)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        if on_disk.as_ref() == Some(&complete) {
            return Ok(false);
        }
        self.save(&config)?;
        info!(path = %self.config_file.display(), created = on_disk.is_none(), "config.file_synced");
        Ok(true)
    }

    /// Pretty-print `config` to disk, copying any existing file into `backups/` first.
    pub fn save(&self, config: &AppConfig) -> Result<(), String> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| format!("Failed to create config dir: {}", e))?;

        if self.config_file.exists() {
            self.backup_current()?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        fs::write(&self.config_file, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }

    fn backup_current(&self) -> Result<(), String> {
        let backup_dir = self.backup_dir();
        fs::create_dir_all(&backup_dir)
            .map_err(|e| format!("Failed to create backup dir: {}", e))?;

        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
        fs::copy(&self.config_file, backup_dir.join(format!("config_{}.json", stamp)))
            .map_err(|e| format!("Failed to create backup: {}", e))?;

        prune_backups(&backup_dir, BACKUPS_TO_KEEP)
    }
}

/// Keep the newest `keep` backups. Names embed the timestamp, so lexical order is age order.
fn prune_backups(backup_dir: &Path, keep: usize) -> Result<(), String> {
    let mut names: Vec<PathBuf> = fs::read_dir(backup_dir)
        .map_err(|e| format!("Failed to read backup dir: {}", e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
        .collect();

    if names.len() <= keep {
        return Ok(());
    }
    names.sort();
    let excess = names.len() - keep;
    for path in names.into_iter().take(excess) {
        let _ = fs::remove_file(path);
    }
    Ok(())
}
