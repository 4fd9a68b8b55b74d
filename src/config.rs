//! CLI configuration file
//!
//! `~/.edgeprov/config.toml`, or `~/.edgeprov/config.<profile>.toml` when a
//! profile is selected. Command-line flags and environment variables take
//! precedence over anything read here.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EdgeError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:9517/v1";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub reservation: Option<String>,
    pub image: Option<String>,
    pub public_key: Option<PathBuf>,
    pub wait_timeout_secs: Option<u64>,
}

impl Config {
    /// Load the profile's file, or an empty config if it does not exist
    pub fn load(profile: Option<&str>) -> Result<Self> {
        Self::load_from(&Self::config_path(profile)?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| EdgeError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| EdgeError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path(profile: Option<&str>) -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| EdgeError::Config("cannot find home directory".to_string()))?;
        let filename = match profile {
            Some(p) => format!("config.{}.toml", p),
            None => "config.toml".to_string(),
        };
        Ok(home.join(".edgeprov").join(filename))
    }

    /// API URL to use when no flag or variable overrides it
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.api_url(), DEFAULT_API_URL);
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles").join("config.toml");
        let config = Config {
            api_url: Some("https://testbed.example.org/v1".into()),
            reservation: Some("4f0c2d8e".into()),
            wait_timeout_secs: Some(600),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "api_url = [").unwrap();
        assert!(matches!(Config::load_from(&path), Err(EdgeError::Config(_))));
    }

    #[test]
    fn test_profile_path() {
        let path = Config::config_path(Some("chi")).unwrap();
        assert!(path.ends_with(".edgeprov/config.chi.toml"));
    }
}
