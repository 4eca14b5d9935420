//! Node configuration file

use crate::{NodeError, NodeResult};
use dpos_consensus::DposConfig;
use dpos_core::SigningKey;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where consensus entities are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Rocksdb,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Synthetic chain and masternode set used when running standalone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    /// Number of blocks in the synthetic chain
    pub chain_height: u64,
    /// Registered masternodes, all of them team members
    pub masternodes: usize,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            chain_height: 10,
            masternodes: 4,
        }
    }
}

/// Top-level node configuration (TOML)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub storage: StorageBackend,
    /// Hex-encoded operator secret key
    pub operator_key: Option<String>,
    pub logging: LoggingConfig,
    pub devnet: DevnetConfig,
    pub consensus: DposConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            storage: StorageBackend::Rocksdb,
            operator_key: None,
            logging: LoggingConfig::default(),
            devnet: DevnetConfig::default(),
            consensus: DposConfig::with_team_size(4),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> NodeResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> NodeResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> NodeResult<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> NodeResult<()> {
        self.consensus.validate()?;

        if self.devnet.masternodes == 0 || self.devnet.masternodes > u8::MAX as usize {
            return Err(NodeError::Config(format!(
                "Devnet masternode count must be between 1 and {}",
                u8::MAX
            )));
        }

        if self.devnet.chain_height == 0 {
            return Err(NodeError::Config(
                "Devnet chain height must be greater than 0".to_string(),
            ));
        }

        self.operator_signing_key()?;
        Ok(())
    }

    /// Decoded operator key, if configured
    pub fn operator_signing_key(&self) -> NodeResult<Option<SigningKey>> {
        let Some(encoded) = &self.operator_key else {
            return Ok(None);
        };

        let bytes = hex::decode(encoded.trim_start_matches("0x"))
            .map_err(|e| NodeError::Config(format!("Invalid operator key: {}", e)))?;
        Ok(Some(SigningKey::from_bytes(&bytes)?))
    }

    /// Directory of the consensus database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("dpos")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.consensus.team_size, 4);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = NodeConfig::from_toml(
            r#"
            data_dir = "/tmp/dpos"
            storage = "memory"

            [logging]
            json = true

            [consensus]
            team_size = 7
            min_masternode_count = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/dpos"));
        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.consensus.team_size, 7);
        assert_eq!(config.consensus.quorum(), 5);
        assert_eq!(config.devnet, DevnetConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(NodeConfig::from_toml("[consensus]\nteam_size = 0\n").is_err());
        assert!(NodeConfig::from_toml("[devnet]\nmasternodes = 0\n").is_err());
        assert!(NodeConfig::from_toml("operator_key = \"zz\"\n").is_err());
        assert!(NodeConfig::from_toml("storage = \"sled\"\n").is_err());
    }

    #[test]
    fn test_operator_key_decoding() {
        let mut config = NodeConfig::default();
        assert!(config.operator_signing_key().unwrap().is_none());

        config.operator_key = Some(format!("0x{}", hex::encode([7u8; 32])));
        let key = config.operator_signing_key().unwrap().unwrap();
        assert_eq!(
            key.key_id(),
            SigningKey::from_bytes(&[7; 32]).unwrap().key_id()
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("node.toml");

        let mut config = NodeConfig::default();
        config.storage = StorageBackend::Memory;
        config.consensus.upgrade_height = 42;
        config.save(&path).unwrap();

        assert_eq!(NodeConfig::load(&path).unwrap(), config);
    }
}
