use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use lco_types::settings::Settings;

/// Returns the overlay home directory. `LCO_HOME` overrides the default
/// `~/.laplace-chat-overlay/`.
pub fn lco_home() -> PathBuf {
    if let Some(home) = std::env::var_os("LCO_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".laplace-chat-overlay")
}

/// Returns the path to the settings file (~/.laplace-chat-overlay/settings.toml)
pub fn settings_path() -> PathBuf {
    lco_home().join("settings.toml")
}

/// Load settings from `path`, writing defaults if the file doesn't exist.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let default = Settings::default();
        save_settings(path, &default)?;
        return Ok(default);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let settings: Settings = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse settings at {}", path.display()))?;
    Ok(settings)
}

/// Save settings to disk. Writes a sibling temp file and renames it over
/// the target so a watching process never reads a half-written file.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    let toml_str = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, toml_str)
        .with_context(|| format!("Failed to write settings to {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_dir_name() {
        if std::env::var_os("LCO_HOME").is_none() {
            assert!(lco_home().to_string_lossy().contains(".laplace-chat-overlay"));
        }
    }

    #[test]
    fn load_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
    }

    #[test]
    fn default_settings_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut settings = Settings::default();
        settings.custom_css = ".event.message .username { color: pink; }\n".into();
        settings.server_port = 9797;
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "opacity = 40\nserverPort = \"9000\"\n").unwrap();
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.opacity, 40);
        assert_eq!(settings.server_port, 9000);
        assert_eq!(settings.server_host, "localhost");
    }
}
