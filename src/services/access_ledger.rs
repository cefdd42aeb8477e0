// Access Ledger
// Persisted user id -> subscription expiry map, rewritten atomically on every change

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

pub const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to write ledger: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to replace ledger file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Source of the current time in epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        chrono::Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

/// An entry that is still active, as listed by `/users`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEntry {
    pub user_id: String,
    pub expires_at: f64,
    pub days_remaining: u64,
}

pub struct AccessLedger {
    path: PathBuf,
    admin_id: i64,
    entries: BTreeMap<String, f64>,
    clock: Arc<dyn Clock>,
}

impl AccessLedger {
    /// Load the ledger at `path`. A missing file starts empty; a corrupt one
    /// is logged and also starts empty.
    pub fn open(path: impl Into<PathBuf>, admin_id: i64, clock: Arc<dyn Clock>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        info!(path = %path.display(), entries = entries.len(), "ledger.loaded");
        Self { path, admin_id, entries, clock }
    }

    pub fn with_system_clock(path: impl Into<PathBuf>, admin_id: i64) -> Self {
        Self::open(path, admin_id, Arc::new(SystemClock))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn admin_id(&self) -> i64 {
        self.admin_id
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        user_id == self.admin_id
    }

    /// True iff the stored expiry is strictly in the future, or the user is the administrator.
    pub fn has_access(&self, user_id: i64) -> bool {
        if self.is_admin(user_id) {
            return true;
        }
        self.entries
            .get(&user_id.to_string())
            .map_or(false, |&expiry| expiry > self.clock.now())
    }

    pub fn expiry(&self, user_id: i64) -> Option<f64> {
        self.entries.get(&user_id.to_string()).copied()
    }

    /// Set expiry to now + `days` and persist.
    pub fn grant(&mut self, user_id: i64, days: u32) -> Result<f64, LedgerError> {
        let expiry = self.clock.now() + f64::from(days) * SECONDS_PER_DAY;
        let mut next = self.entries.clone();
        next.insert(user_id.to_string(), expiry);
        self.commit(next)?;
        info!(user_id, days, expiry, "ledger.granted");
        Ok(expiry)
    }

    /// Remove the entry and persist; absent users are a no-op. Returns
    /// whether an entry was removed.
    pub fn revoke(&mut self, user_id: i64) -> Result<bool, LedgerError> {
        let mut next = self.entries.clone();
        if next.remove(&user_id.to_string()).is_none() {
            return Ok(false);
        }
        self.commit(next)?;
        info!(user_id, "ledger.revoked");
        Ok(true)
    }

    /// Entries whose expiry is still in the future, soonest first.
    pub fn active_entries(&self) -> Vec<ActiveEntry> {
        let now = self.clock.now();
        let mut active: Vec<ActiveEntry> = self
            .entries
            .iter()
            .filter(|(_, &expiry)| expiry > now)
            .map(|(user_id, &expiry)| ActiveEntry {
                user_id: user_id.clone(),
                expires_at: expiry,
                days_remaining: ((expiry - now) / SECONDS_PER_DAY) as u64,
            })
            .collect();
        active.sort_by(|a, b| a.expires_at.partial_cmp(&b.expires_at).unwrap_or(std::cmp::Ordering::Equal));
        active
    }

    pub fn entries(&self) -> &BTreeMap<String, f64> {
        &self.entries
    }

    /// Memory only changes once `next` is on disk.
    fn commit(&mut self, next: BTreeMap<String, f64>) -> Result<(), LedgerError> {
        self.write_entries(&next)?;
        self.entries = next;
        Ok(())
    }

    /// Rewrite the whole file through a temp file in the same directory.
    fn write_entries(&self, entries: &BTreeMap<String, f64>) -> Result<(), LedgerError> {
        let parent_dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent_dir)?;

        let temp_file = NamedTempFile::new_in(parent_dir)?;
        {
            let mut writer = BufWriter::new(&temp_file);
            serde_json::to_writer(&mut writer, entries)?;
            writer.flush()?;
        }
        temp_file.persist(&self.path)?;
        Ok(())
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, f64> {
    if !path.exists() {
        return BTreeMap::new();
    }

    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));

    match parsed {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ledger.unreadable_starting_empty");
            BTreeMap::new()
        }
    }
}
