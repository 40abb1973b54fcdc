use crate::error::ChainError;

use super::block::{Block, Sha256Hash};
use super::difficulty::DifficultyOracle;
use super::state::LedgerValidator;

/// Everything a block is checked against. `ancestry` is `None` while the
/// parent is unknown, which defers the difficulty and ledger checks.
pub struct ValidationContext<'a> {
    pub ancestry: Option<&'a [Block]>,
    pub genesis_hash: Sha256Hash,
    pub block_reward: u64,
    pub oracle: &'a DifficultyOracle,
    pub ledger: &'a LedgerValidator,
}

pub fn verify_hash_integrity(block: &Block) -> Result<(), ChainError> {
    let computed = block.calculate_hash();
    if computed != block.hash {
        return Err(ChainError::InvalidHashIntegrity {
            stored: hex::encode(block.hash),
            computed: hex::encode(computed),
        });
    }
    Ok(())
}

pub fn verify_proof_of_work(block: &Block) -> Result<(), ChainError> {
    if !block.meets_difficulty(block.difficulty) {
        return Err(ChainError::ProofOfWorkNotMet {
            hash: block.hash_hex(),
            level: block.difficulty,
        });
    }
    Ok(())
}

/// The one validation routine shared by mined and received blocks.
pub fn validate_block(block: &Block, ctx: &ValidationContext<'_>) -> Result<(), ChainError> {
    verify_hash_integrity(block)?;

    if block.is_genesis() {
        if block.hash != ctx.genesis_hash {
            return Err(ChainError::InvalidBlock(format!(
                "Block {} claims the bootstrap parent but is not this network's genesis",
                block.hash_hex()
            )));
        }
        return verify_proof_of_work(block);
    }

    if block.block_reward != ctx.block_reward {
        return Err(ChainError::InvalidReward {
            expected: ctx.block_reward,
            claimed: block.block_reward,
        });
    }

    let expected = ctx.oracle.expected_level(ctx.ancestry, block);
    if expected != block.difficulty {
        return Err(ChainError::DifficultyMismatch {
            expected,
            claimed: block.difficulty,
        });
    }

    verify_proof_of_work(block)?;

    if let Some(ancestry) = ctx.ancestry {
        if let Some(parent) = ancestry.last() {
            if block.timestamp <= parent.timestamp {
                return Err(ChainError::InvalidBlock(format!(
                    "Block timestamp {} must be greater than parent timestamp {}",
                    block.timestamp, parent.timestamp
                )));
            }
        }
        ctx.ledger.validate_block(ancestry, block)?;
    }

    Ok(())
}
