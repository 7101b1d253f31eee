//! Worker settings, loaded from the platform config directory

use std::fs;
use std::path::{Path, PathBuf};

use log::{LevelFilter, warn};
use serde::{Deserialize, Serialize};

use crate::texture::DEFAULT_POOL_SIZE;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pagestrip";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Number of GPU texture slots multiplexed across rendered pages.
    #[serde(default = "default_slot_pool_size")]
    pub slot_pool_size: u32,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log destination; defaults next to the process's working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_slot_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            slot_pool_size: default_slot_pool_size(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

impl Settings {
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(SETTINGS_FILENAME))
    }

    /// Load from the default location; absent or unreadable files fall
    /// back to defaults so a broken config never takes the worker down.
    #[must_use]
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Self::default(),
        }
    }

    #[must_use]
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => match serde_yaml::from_str(&text) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("cannot parse {}: {e}, using defaults", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                warn!("cannot read {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Slot pool size with the lower bound the allocator requires.
    #[must_use]
    pub fn pool_size(&self) -> u32 {
        self.slot_pool_size.max(1)
    }

    #[must_use]
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let settings = Settings::load_from(Path::new("/no/such/config.yaml"));
        assert_eq!(settings.slot_pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(settings.level_filter(), LevelFilter::Info);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "slot_pool_size: 4").expect("write");

        let settings = Settings::load_from(file.path());
        assert_eq!(settings.slot_pool_size, 4);
        assert_eq!(settings.version, CURRENT_VERSION);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn unparsable_yaml_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "slot_pool_size: [not a number").expect("write");

        let settings = Settings::load_from(file.path());
        assert_eq!(settings.slot_pool_size, DEFAULT_POOL_SIZE);
    }

    #[test]
    fn zero_pool_size_is_clamped() {
        let settings = Settings {
            slot_pool_size: 0,
            ..Settings::default()
        };
        assert_eq!(settings.pool_size(), 1);
    }

    #[test]
    fn level_filter_parses_known_levels() {
        let mut settings = Settings::default();
        settings.log_level = "debug".to_string();
        assert_eq!(settings.level_filter(), LevelFilter::Debug);

        settings.log_level = "nonsense".to_string();
        assert_eq!(settings.level_filter(), LevelFilter::Info);
    }
}
