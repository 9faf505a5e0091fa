//! Configuration file support.
//!
//! Point-of-sale deployments keep their signing preferences in a TOML
//! file; everything here is optional, since all entry points also
//! accept explicit parameters.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::constants::MAX_READERS;
use crate::domain::mime::AttachmentEncoding;
use crate::infra::error::{CardError, CardResult};

/// Signing preferences persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfiguration {
    /// Reader slot used when the caller does not pick one.
    pub default_slot: usize,

    /// Transfer encoding for mail attachments:
    /// "none", "quoted-printable" or "base64".
    pub attachment_encoding: String,

    /// Base64 line length for message bodies.
    pub base64_line_length: usize,

    /// Whether to log the full APDU exchange at debug level.
    pub verbose: bool,
}

impl Default for SigningConfiguration {
    fn default() -> Self {
        Self {
            default_slot: 0,
            attachment_encoding: "base64".to_string(),
            base64_line_length: 64,
            verbose: false,
        }
    }
}

impl SigningConfiguration {
    /// The parsed attachment encoding.
    pub fn encoding(&self) -> CardResult<AttachmentEncoding> {
        self.attachment_encoding.parse()
    }
}

/// Loads and stores [`SigningConfiguration`] files.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    #[must_use]
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration, writing the defaults first when the
    /// file does not exist yet.
    pub fn load_or_create_default(&self) -> CardResult<SigningConfiguration> {
        if self.config_path.exists() {
            self.load()
        } else {
            log::info!(
                "configuration file not found, creating default: {}",
                self.config_path.display()
            );
            let config = SigningConfiguration::default();
            self.save(&config)?;
            Ok(config)
        }
    }

    pub fn load(&self) -> CardResult<SigningConfiguration> {
        let content = fs::read_to_string(&self.config_path).map_err(|e| {
            CardError::Configuration(format!(
                "failed to read config file {}: {e}",
                self.config_path.display()
            ))
        })?;
        let config: SigningConfiguration = toml::from_str(&content)
            .map_err(|e| CardError::Configuration(format!("failed to parse config file: {e}")))?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn save(&self, config: &SigningConfiguration) -> CardResult<()> {
        Self::validate(config)?;
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CardError::Configuration(format!(
                    "failed to create config directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let content = toml::to_string_pretty(config)
            .map_err(|e| CardError::Configuration(format!("failed to serialize config: {e}")))?;
        fs::write(&self.config_path, content).map_err(|e| {
            CardError::Configuration(format!(
                "failed to write config file {}: {e}",
                self.config_path.display()
            ))
        })
    }

    fn validate(config: &SigningConfiguration) -> CardResult<()> {
        if config.default_slot >= MAX_READERS {
            return Err(CardError::Configuration(format!(
                "default_slot {} out of range",
                config.default_slot
            )));
        }
        config.encoding()?;
        if !(4..=76).contains(&config.base64_line_length) {
            return Err(CardError::Configuration(format!(
                "base64_line_length {} outside 4..=76",
                config.base64_line_length
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_configuration_valid() {
        let config = SigningConfiguration::default();
        assert!(ConfigManager::validate(&config).is_ok());
        assert_eq!(config.encoding().unwrap(), AttachmentEncoding::Base64);
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.toml"));

        let created = manager.load_or_create_default().unwrap();
        assert!(manager.config_path().exists());
        let loaded = manager.load().unwrap();
        assert_eq!(created.default_slot, loaded.default_slot);
        assert_eq!(created.attachment_encoding, loaded.attachment_encoding);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = SigningConfiguration::default();
        config.default_slot = MAX_READERS;
        assert!(ConfigManager::validate(&config).is_err());

        let mut config = SigningConfiguration::default();
        config.attachment_encoding = "uuencode".to_string();
        assert!(ConfigManager::validate(&config).is_err());

        let mut config = SigningConfiguration::default();
        config.base64_line_length = 2;
        assert!(ConfigManager::validate(&config).is_err());
    }
}
