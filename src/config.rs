//! Configuration management for ForkChain

use crate::error::{ChainError, Result};
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Highest meaningful difficulty: a SHA-256 hash has 64 hex digits.
pub const MAX_DIFFICULTY_LEVEL: u32 = 64;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChainConfig {
    pub difficulty: DifficultyConfig,
    pub ledger: LedgerConfig,
    pub genesis: GenesisConfig,
    pub mining: MiningConfig,
    pub mempool: MempoolConfig,
    pub forks: ForkConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DifficultyConfig {
    pub initial_level: u32,
    pub min_level: u32,
    pub max_level: u32,
    pub adjustment_interval: u64,
    #[serde(deserialize_with = "deserialize_duration")]
    pub target_block_time: Duration,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            initial_level: 4,
            min_level: 1,
            max_level: MAX_DIFFICULTY_LEVEL,
            adjustment_interval: 4,
            target_block_time: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    pub confirmation_depth: u64,
    pub block_reward: u64,
    pub balance_cache_size: usize,
    /// Apply sender debits of blocks that are not yet confirmed. Off by
    /// default, so a branch's balances come from confirmed blocks only.
    pub debit_unconfirmed: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            confirmation_depth: 2,
            block_reward: 50,
            balance_cache_size: 256,
            debit_unconfirmed: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenesisConfig {
    pub message: String,
    pub timestamp_ms: u64,
    pub miner_address: String,
    pub reward: u64,
    /// Published genesis nonce. When set it is only verified, never searched.
    pub nonce: Option<u64>,
    /// Upper bound on the genesis search when no nonce is pinned.
    #[serde(deserialize_with = "deserialize_duration")]
    pub mining_timeout: Duration,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            message: "Genesis Block".to_string(),
            timestamp_ms: 1_672_531_200_000,
            miner_address: "genesis".to_string(),
            reward: 50,
            nonce: None,
            mining_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MiningConfig {
    pub miner_address: String,
    pub max_block_transactions: usize,
    /// Nonce attempts between two polls of the cancellation signal.
    pub cancel_check_interval: u64,
    #[serde(deserialize_with = "deserialize_optional_duration")]
    pub max_duration: Option<Duration>,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            miner_address: "miner".to_string(),
            max_block_transactions: 100,
            cancel_check_interval: 4096,
            max_duration: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MempoolConfig {
    pub max_transactions: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForkConfig {
    /// Forks trailing the main chain by more than this many blocks are dropped.
    pub retention_depth: Option<u64>,
}

impl ChainConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ChainConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.difficulty;
        if d.adjustment_interval == 0 {
            return Err(ChainError::Config(
                "difficulty.adjustment_interval must be at least 1".to_string(),
            ));
        }
        if d.max_level > MAX_DIFFICULTY_LEVEL {
            return Err(ChainError::Config(format!(
                "difficulty.max_level must not exceed {}",
                MAX_DIFFICULTY_LEVEL
            )));
        }
        if d.min_level > d.initial_level || d.initial_level > d.max_level {
            return Err(ChainError::Config(format!(
                "difficulty levels must satisfy min <= initial <= max (got {} <= {} <= {})",
                d.min_level, d.initial_level, d.max_level
            )));
        }
        if self.mining.cancel_check_interval == 0 {
            return Err(ChainError::Config(
                "mining.cancel_check_interval must be at least 1".to_string(),
            ));
        }
        if self.mining.max_block_transactions == 0 {
            return Err(ChainError::Config(
                "mining.max_block_transactions must be at least 1".to_string(),
            ));
        }
        if self.ledger.balance_cache_size == 0 {
            return Err(ChainError::Config(
                "ledger.balance_cache_size must be at least 1".to_string(),
            ));
        }
        if self.mining.miner_address.is_empty() || self.genesis.miner_address.is_empty() {
            return Err(ChainError::Config(
                "miner addresses must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<ChainConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!("No config at {}, using defaults", path.display());
        let config = ChainConfig::default();
        config.validate()?;
        return Ok(config);
    }
    let config_str = fs::read_to_string(path)?;
    ChainConfig::from_toml_str(&config_str)
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_optional_duration<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}
