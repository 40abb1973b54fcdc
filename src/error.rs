//! Error types for ForkChain

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Invalid hash integrity: stored {stored}, recomputed {computed}")]
    InvalidHashIntegrity { stored: String, computed: String },

    #[error("Difficulty mismatch: expected level {expected}, block claims {claimed}")]
    DifficultyMismatch { expected: u32, claimed: u32 },

    #[error("Proof of work not met: hash {hash} lacks {level} leading zeros")]
    ProofOfWorkNotMet { hash: String, level: u32 },

    #[error("Double spend detected: {sender} needs {required} but only has {available}")]
    DoubleSpend {
        sender: String,
        required: u64,
        available: u64,
    },

    #[error("Orphan block {block} is still waiting for parent {parent}")]
    OrphanUnresolvable { block: String, parent: String },

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Invalid block reward: expected {expected}, block claims {claimed}")]
    InvalidReward { expected: u64, claimed: u64 },

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Mining cancelled")]
    MiningCancelled,

    #[error("Nonce space exhausted")]
    NonceSpaceExhausted,

    #[error("Mempool is full")]
    MempoolFull,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Node worker has stopped")]
    NodeStopped,

    #[error("Mining task failed: {0}")]
    MiningTask(String),
}

impl ChainError {
    /// True for the structural rejection kinds that permanently discard a block.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ChainError::InvalidHashIntegrity { .. }
                | ChainError::DifficultyMismatch { .. }
                | ChainError::ProofOfWorkNotMet { .. }
                | ChainError::DoubleSpend { .. }
                | ChainError::InvalidBlock(_)
                | ChainError::InvalidReward { .. }
                | ChainError::InvalidTransaction(_)
        )
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
