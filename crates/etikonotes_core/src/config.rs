//! Configuration loading from environment variables.

use crate::constants::{DEFAULT_COMPACT_THRESHOLD, DEFAULT_TITLE_DEBOUNCE_MS};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for etikonotes.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub db_path: String,
    pub title_debounce_ms: u64,
    pub compact_threshold: usize,
    pub auto_backup: bool,
}

/// Expand tilde (~) in paths to the user's home directory
fn expand_tilde(path: String, home: Option<PathBuf>) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path
}

fn resolve_home_dir<F>(lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(home) = non_blank("HOME") {
        return Some(PathBuf::from(home));
    }

    if let Some(profile) = non_blank("USERPROFILE") {
        return Some(PathBuf::from(profile));
    }

    if let (Some(drive), Some(path)) = (non_blank("HOMEDRIVE"), non_blank("HOMEPATH")) {
        return Some(PathBuf::from(format!("{}{}", drive, path)));
    }

    std::env::current_dir().ok()
}

/// Parse a boolean-like environment flag value.
///
/// # Supported Values
/// - Truthy: `1`, `true`, `yes`, `on`
/// - Falsy: `0`, `false`, `no`, `off`, empty string
///
/// Matching is case-insensitive and ignores surrounding whitespace.
///
/// # Returns
/// `Some(bool)` when the value is recognized, otherwise `None`.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Returns
    /// A populated [`Config`] with defaults applied when env vars are missing.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Arguments
    /// - `lookup`: Returns the raw value for a variable name, if set.
    ///
    /// # Returns
    /// A populated [`Config`]; unparsable numeric values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = resolve_home_dir(&lookup);
        Self {
            db_path: lookup("DB_PATH")
                .map(|path| expand_tilde(path, home.clone()))
                .unwrap_or_else(|| {
                    let home = home.clone().unwrap_or_else(|| PathBuf::from("."));
                    let cache_dir = home.join(".cache").join("etikonotes");
                    cache_dir.join("db").to_string_lossy().to_string()
                }),
            title_debounce_ms: lookup("TITLE_DEBOUNCE_MS")
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(DEFAULT_TITLE_DEBOUNCE_MS),
            compact_threshold: lookup("COMPACT_THRESHOLD")
                .and_then(|value| value.trim().parse().ok())
                .filter(|threshold: &usize| *threshold > 0)
                .unwrap_or(DEFAULT_COMPACT_THRESHOLD),
            // Backups stay opt-in.
            auto_backup: lookup("AUTO_BACKUP")
                .and_then(|value| parse_env_flag(&value))
                .unwrap_or(false),
        }
    }

    /// Debounce window for derived-title writes.
    pub fn title_debounce(&self) -> Duration {
        Duration::from_millis(self.title_debounce_ms)
    }
}
