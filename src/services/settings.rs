//! Settings persistence

use crate::{
    config::Settings,
    error::{BgComposeError, Result},
};
use std::path::{Path, PathBuf};

/// Storage for [`Settings`]
pub trait SettingsStore: Send + Sync {
    /// Load settings, falling back to defaults when nothing usable is stored
    fn load(&self) -> Settings;

    /// Persist settings
    ///
    /// # Errors
    /// - Storage-specific write or serialization failures
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// Settings stored as pretty-printed JSON in a single file
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    /// Store backed by an explicit file
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/bgcompose/settings.json`, if the platform has a config dir
    #[must_use]
    pub fn default_location() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bgcompose").join("settings.json"))
    }

    /// Store at [`Self::default_location`]
    ///
    /// # Errors
    /// - `InvalidConfig` if the platform has no user configuration directory
    pub fn from_default_location() -> Result<Self> {
        Self::default_location().map(Self::new).ok_or_else(|| {
            BgComposeError::invalid_config("No user configuration directory available")
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the stored settings without falling back
    ///
    /// # Errors
    /// - `Io` if the file cannot be read
    /// - `Serialization` if it is not valid settings JSON
    /// - `InvalidConfig` if a stored value is out of range
    pub fn try_load(&self) -> Result<Settings> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| BgComposeError::file_io_error("read settings file", &self.path, &e))?;
        let settings: Settings = serde_json::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Settings {
        if !self.path.exists() {
            log::debug!(
                "No settings file at {}, using defaults",
                self.path.display()
            );
            return Settings::default();
        }

        match self.try_load() {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!(
                    "Ignoring unusable settings file {}: {}",
                    self.path.display(),
                    e
                );
                Settings::default()
            },
        }
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BgComposeError::file_io_error("create settings directory", parent, &e)
            })?;
        }

        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, json)
            .map_err(|e| BgComposeError::file_io_error("write settings file", &self.path, &e))?;

        log::debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::BackgroundMode, types::Rgb};
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = tempdir().unwrap();
        let store = JsonSettingsStore::new(temp_dir.path().join("absent.json"));
        assert_eq!(store.load(), Settings::default());
        assert!(matches!(store.try_load(), Err(BgComposeError::Io(_))));
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = tempdir().unwrap();
        let store = JsonSettingsStore::new(temp_dir.path().join("nested/settings.json"));

        let settings = Settings::builder()
            .threshold(0.35)
            .feather_pixels(3)
            .auto_crop_output(true)
            .background(BackgroundMode::Color {
                color: Rgb::new(1, 2, 3),
            })
            .build()
            .unwrap();

        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"auto_crop_output\": true"));
    }

    #[test]
    fn test_corrupt_or_invalid_file_yields_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("settings.json");
        let store = JsonSettingsStore::new(&path);

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(store.load(), Settings::default());
        assert!(matches!(
            store.try_load(),
            Err(BgComposeError::Serialization(_))
        ));

        std::fs::write(&path, r#"{"threshold": 7.0}"#).unwrap();
        assert_eq!(store.load(), Settings::default());
        assert!(matches!(
            store.try_load(),
            Err(BgComposeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_location_shape() {
        if let Some(path) = JsonSettingsStore::default_location() {
            assert!(path.ends_with("bgcompose/settings.json"));
        }
    }
}
