use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendererSettings {
    /// Uniform-buffer binding slot of the sprite pipeline's `drawInfo` block.
    pub draw_info_binding: u32,
    /// Binding slot for the canvas-size block of translated programs.
    pub canvas_block_binding: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            draw_info_binding: 0,
            canvas_block_binding: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslatorSettings {
    pub flip_fragment_coord: bool,
    pub unify_uniform_blocks: bool,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            flip_fragment_coord: true,
            unify_uniform_blocks: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// `env_logger` filter string, e.g. `"sprite_gl=debug"`. Empty defers to
    /// `RUST_LOG`, then `info`.
    pub filter: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub renderer: RendererSettings,
    pub translator: TranslatorSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Deserialization Error: {0}")]
    Serde(#[from] toml::de::Error),

    #[error("Serialization Error: {0}")]
    SerdeSer(#[from] toml::ser::Error),

    #[error("Configuration Directory Not Found")]
    ConfigDirNotFound,
}

impl Settings {
    /// Retrieves the path to the user settings file.
    pub fn user_settings_path() -> Result<PathBuf, SettingsError> {
        let config_dir = config_dir().ok_or(SettingsError::ConfigDirNotFound)?;
        Ok(config_dir.join("sprite_gl").join("settings.toml"))
    }

    /// Loads settings from a specified file path.
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Saves settings to a specified file path, ensuring the directory exists.
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Loads `path` if it exists, otherwise falls back to defaults. A file
    /// that exists but does not parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            log::info!("No settings at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.renderer.draw_info_binding = 3;
        settings.translator.flip_fragment_coord = false;
        settings.logging.filter = String::from("sprite_gl=trace");
        settings.save_to_file(&path).unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[renderer]\ndraw_info_binding = 2\n").unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded.renderer.draw_info_binding, 2);
        assert_eq!(loaded.renderer.canvas_block_binding, 1);
        assert_eq!(loaded.translator, TranslatorSettings::default());
        assert_eq!(loaded.logging.filter, "");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let loaded = Settings::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "renderer = 5").unwrap();
        let result = Settings::load_or_default(&path);
        assert!(matches!(result, Err(SettingsError::Serde(_))));
    }
}
