//! dPoS consensus configuration

use crate::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// dPoS consensus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DposConfig {
    /// Number of masternodes in a voting team
    pub team_size: usize,
    /// Votes needed for a quorum; 0 means `team_size * 2 / 3 + 1`
    pub min_quorum: usize,
    /// How many blocks back from the chain head a vote's tip may be
    pub team_lookback: u64,
    /// Delay after startup before the node may start voting (seconds)
    pub voter_warmup: u64,
    /// Event loop tick (milliseconds)
    pub tick_interval: u64,
    /// Period of vote reconciliation with peers (seconds)
    pub reconcile_interval: u64,
    /// How long relayed payloads stay available (seconds)
    pub relay_expiry: u64,
    /// Maximum accepted clock skew of heartbeat timestamps (seconds)
    pub heartbeat_max_future: u64,
    /// Minimum number of active masternodes for dPoS to run
    pub min_masternode_count: usize,
    /// Height at which dPoS activates
    pub upgrade_height: u64,
}

impl Default for DposConfig {
    fn default() -> Self {
        Self {
            team_size: 32,
            min_quorum: 0,
            team_lookback: 100,
            voter_warmup: 60,
            tick_interval: 500,
            reconcile_interval: 30,
            relay_expiry: 15 * 60,
            heartbeat_max_future: 5 * 60,
            min_masternode_count: 32,
            upgrade_height: 0,
        }
    }
}

impl DposConfig {
    /// Configuration for a team of `team_size` with default timings
    pub fn with_team_size(team_size: usize) -> Self {
        Self {
            team_size,
            min_masternode_count: team_size,
            ..Self::default()
        }
    }

    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConsensusResult<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConsensusError::Config(format!("Failed to read config file: {}", e)))?;

        let config: DposConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConsensusResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .map_err(|e| ConsensusError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConsensusResult<()> {
        if self.team_size == 0 {
            return Err(ConsensusError::Config(
                "Team size must be greater than 0".to_string(),
            ));
        }

        if self.min_quorum > self.team_size {
            return Err(ConsensusError::Config(format!(
                "Quorum {} exceeds team size {}",
                self.min_quorum, self.team_size
            )));
        }

        if self.tick_interval == 0 {
            return Err(ConsensusError::Config(
                "Tick interval must be greater than 0".to_string(),
            ));
        }

        if self.reconcile_interval == 0 {
            return Err(ConsensusError::Config(
                "Reconcile interval must be greater than 0".to_string(),
            ));
        }

        if self.relay_expiry == 0 {
            return Err(ConsensusError::Config(
                "Relay expiry must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Effective quorum threshold
    pub fn quorum(&self) -> usize {
        if self.min_quorum > 0 {
            self.min_quorum
        } else {
            self.team_size * 2 / 3 + 1
        }
    }

    pub fn voter_warmup_as_duration(&self) -> Duration {
        Duration::from_secs(self.voter_warmup)
    }

    pub fn tick_interval_as_duration(&self) -> Duration {
        Duration::from_millis(self.tick_interval)
    }

    pub fn reconcile_interval_as_duration(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval)
    }

    pub fn relay_expiry_as_duration(&self) -> Duration {
        Duration::from_secs(self.relay_expiry)
    }

    /// Heartbeat skew allowance in milliseconds
    pub fn heartbeat_max_future_ms(&self) -> i64 {
        self.heartbeat_max_future as i64 * 1000
    }

    /// Set voter warm-up in seconds
    pub fn with_voter_warmup(mut self, seconds: u64) -> Self {
        self.voter_warmup = seconds;
        self
    }

    /// Set upgrade height
    pub fn with_upgrade_height(mut self, height: u64) -> Self {
        self.upgrade_height = height;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = DposConfig::default();
        assert_eq!(config.team_size, 32);
        assert_eq!(config.quorum(), 22);
        assert_eq!(config.tick_interval_as_duration(), Duration::from_millis(500));
        assert_eq!(config.relay_expiry_as_duration(), Duration::from_secs(900));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_quorum() {
        assert_eq!(DposConfig::with_team_size(4).quorum(), 3);
        assert_eq!(DposConfig::with_team_size(3).quorum(), 3);
        assert_eq!(DposConfig::with_team_size(1).quorum(), 1);

        let mut config = DposConfig::with_team_size(10);
        config.min_quorum = 6;
        assert_eq!(config.quorum(), 6);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DposConfig::default();

        config.team_size = 0;
        assert!(config.validate().is_err());

        config.team_size = 4;
        config.min_quorum = 5;
        assert!(config.validate().is_err());

        config.min_quorum = 3;
        assert!(config.validate().is_ok());

        config.tick_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DposConfig = serde_json::from_str(r#"{"team_size": 4}"#).unwrap();
        assert_eq!(config.team_size, 4);
        assert_eq!(config.team_lookback, 100);
        assert_eq!(config.quorum(), 3);
    }

    #[test]
    fn test_file_operations() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("dpos.json");

        let config = DposConfig::with_team_size(4).with_voter_warmup(0);
        config.save_to_file(&file_path).unwrap();

        let loaded = DposConfig::load_from_file(&file_path).unwrap();
        assert_eq!(config, loaded);
    }
}
