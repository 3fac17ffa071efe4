// =============================================================================
// Service Settings — bind address, journal location, caller keyring
// =============================================================================
//
// Loaded once at startup from a JSON file (default `ledger_settings.json`,
// overridable with `LEDGER_SETTINGS`). Every field carries a serde default so
// an older or partial file still loads. Environment variables override the
// file:
//
//   LEDGER_BIND_ADDR     listen address
//   LEDGER_JOURNAL_PATH  journal file
//   LEDGER_KEYS          "identity=secret,identity=secret"
//
// Secrets are never logged; only the number of keyring entries is.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_SETTINGS_PATH: &str = "ledger_settings.json";

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_journal_path() -> String {
    "data/treasury.journal".to_string()
}

fn default_max_clock_skew_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_journal_path")]
    pub journal_path: String,

    /// Largest accepted distance between a request timestamp and server time.
    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: u64,

    /// Identity -> HMAC secret.
    #[serde(default)]
    pub keys: HashMap<String, String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            journal_path: default_journal_path(),
            max_clock_skew_secs: default_max_clock_skew_secs(),
            keys: HashMap::new(),
        }
    }
}

/// Parse `"id=secret,id=secret"`. Blank entries are skipped.
pub fn parse_keyring(raw: &str) -> Result<HashMap<String, String>> {
    let mut keys = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((identity, secret)) = pair.split_once('=') else {
            bail!("keyring entry without '=': {pair:?}");
        };
        let (identity, secret) = (identity.trim(), secret.trim());
        if identity.is_empty() || secret.is_empty() {
            bail!("keyring entry with empty identity or secret");
        }
        keys.insert(identity.to_string(), secret.to_string());
    }
    Ok(keys)
}

impl ServiceSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;

        let settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse settings from {}", path.display()))?;

        info!(
            path = %path.display(),
            bind_addr = %settings.bind_addr,
            journal_path = %settings.journal_path,
            keys = settings.keys.len(),
            "service settings loaded"
        );

        Ok(settings)
    }

    /// Atomic write: `.tmp` sibling, then rename.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise settings to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp settings to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp settings to {}", path.display()))?;

        info!(path = %path.display(), "service settings saved (atomic)");
        Ok(())
    }

    /// Apply `LEDGER_*` overrides from `lookup` (normally `std::env::var`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("LEDGER_BIND_ADDR").filter(|v| !v.trim().is_empty()) {
            self.bind_addr = addr.trim().to_string();
        }
        if let Some(path) = lookup("LEDGER_JOURNAL_PATH").filter(|v| !v.trim().is_empty()) {
            self.journal_path = path.trim().to_string();
        }
        if let Some(raw) = lookup("LEDGER_KEYS") {
            let keys = parse_keyring(&raw).context("invalid LEDGER_KEYS")?;
            self.keys.extend(keys);
        }
        Ok(())
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }
}
