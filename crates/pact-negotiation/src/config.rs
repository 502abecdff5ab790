// config.rs — Project layout and settings.
//
// PactConfig says where state lives: the document store, the goal event
// log, and the settings file. `for_project()` puts everything under a
// `.pact/` directory in the project root. Settings come from
// `.pact/config.toml`; every field has a default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::names::Directory;

/// Longest approval window a project may configure: one year.
pub const MAX_APPROVAL_WINDOW_HOURS: i64 = 24 * 365;

/// Longest pause between deadline sweeps: one day.
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Where a project keeps its state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PactConfig {
    pub project_root: PathBuf,

    /// Root of the JSON document store (one subdir per collection).
    pub store_dir: PathBuf,

    /// Append-only goal event log.
    pub events_log: PathBuf,

    /// Path to `config.toml`.
    pub settings_file: PathBuf,
}

impl PactConfig {
    /// Standard `.pact/` layout for a project.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref().to_path_buf();
        let pact_dir = root.join(".pact");
        Self {
            project_root: root,
            store_dir: pact_dir.join("store"),
            events_log: pact_dir.join("events.jsonl"),
            settings_file: pact_dir.join("config.toml"),
        }
    }

    pub fn load_settings(&self) -> Settings {
        Settings::load_or_default(&self.settings_file)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub negotiation: NegotiationSettings,

    /// Display names by user id.
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NegotiationSettings {
    /// How long a giver has to answer before the goal approves itself.
    #[serde(default = "default_approval_window_hours")]
    pub approval_window_hours: i64,

    /// Seconds between deadline sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_approval_window_hours() -> i64 {
    72
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            approval_window_hours: default_approval_window_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings: Settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings, falling back to defaults if the file is missing or
    /// unusable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(ConfigError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Self::default()
            }
            Err(e) => {
                tracing::warn!("using default settings: {}", e);
                Self::default()
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let hours = self.negotiation.approval_window_hours;
        if !(1..=MAX_APPROVAL_WINDOW_HOURS).contains(&hours) {
            return Err(ConfigError::Invalid(format!(
                "approval_window_hours must be between 1 and {}, got {}",
                MAX_APPROVAL_WINDOW_HOURS, hours
            )));
        }
        let secs = self.negotiation.sweep_interval_secs;
        if !(1..=MAX_SWEEP_INTERVAL_SECS).contains(&secs) {
            return Err(ConfigError::Invalid(format!(
                "sweep_interval_secs must be between 1 and {}, got {}",
                MAX_SWEEP_INTERVAL_SECS, secs
            )));
        }
        Ok(())
    }

    /// Clamped to the valid range, so hand-built settings cannot overflow
    /// deadline arithmetic.
    pub fn approval_window(&self) -> chrono::Duration {
        let hours = self
            .negotiation
            .approval_window_hours
            .clamp(1, MAX_APPROVAL_WINDOW_HOURS);
        chrono::Duration::hours(hours)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        let secs = self
            .negotiation
            .sweep_interval_secs
            .clamp(1, MAX_SWEEP_INTERVAL_SECS);
        std::time::Duration::from_secs(secs)
    }

    pub fn directory(&self) -> Directory {
        Directory::from(&self.users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::{display_name, UNKNOWN_NAME};
    use tempfile::tempdir;

    #[test]
    fn for_project_uses_pact_dir() {
        let config = PactConfig::for_project("/tmp/project");
        assert_eq!(config.store_dir, PathBuf::from("/tmp/project/.pact/store"));
        assert_eq!(
            config.events_log,
            PathBuf::from("/tmp/project/.pact/events.jsonl")
        );
        assert_eq!(
            config.settings_file,
            PathBuf::from("/tmp/project/.pact/config.toml")
        );
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load_or_default(&dir.path().join("config.toml"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.approval_window(), chrono::Duration::hours(72));
        assert_eq!(settings.sweep_interval(), std::time::Duration::from_secs(60));
    }

    #[tokio::test]
    async fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[negotiation]
approval_window_hours = 24

[users]
alice = "Alice"
"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.negotiation.approval_window_hours, 24);
        assert_eq!(settings.negotiation.sweep_interval_secs, 60);

        let directory = settings.directory();
        assert_eq!(display_name(&directory, "alice").await, "Alice");
        assert_eq!(display_name(&directory, "bob").await, UNKNOWN_NAME);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[negotiation]\nsweep_interval_secs = 0\n").unwrap();

        assert!(matches!(Settings::load(&path), Err(ConfigError::Invalid(_))));
        assert_eq!(Settings::load_or_default(&path), Settings::default());
    }

    #[test]
    fn oversized_windows_are_rejected_not_overflowed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!("[negotiation]\napproval_window_hours = {}\n", i64::MAX),
        )
        .unwrap();

        assert!(matches!(Settings::load(&path), Err(ConfigError::Invalid(_))));
        let settings = Settings::load_or_default(&path);
        assert_eq!(settings.approval_window(), chrono::Duration::hours(72));

        let mut settings = Settings::default();
        settings.negotiation.approval_window_hours = i64::MAX;
        settings.negotiation.sweep_interval_secs = u64::MAX;
        assert_eq!(
            settings.approval_window(),
            chrono::Duration::hours(MAX_APPROVAL_WINDOW_HOURS)
        );
        assert_eq!(
            settings.sweep_interval(),
            std::time::Duration::from_secs(MAX_SWEEP_INTERVAL_SECS)
        );
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[negotiation\n").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse { .. })));
    }
}
