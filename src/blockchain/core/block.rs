use crate::config::GenesisConfig;
use crate::error::ChainError;
use crate::transaction::types::encode_str;
use crate::transaction::{Address, Transaction};
use sha2::{Digest, Sha256};

pub type Sha256Hash = [u8; 32];

/// Parent marker carried by the genesis block.
pub const BOOTSTRAP_HASH: Sha256Hash = [0u8; 32];

/// Block payload: free-form text or an ordered list of transactions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BlockData {
    Text(String),
    Transactions(Vec<Transaction>),
}

impl BlockData {
    pub fn transactions(&self) -> &[Transaction] {
        match self {
            BlockData::Text(_) => &[],
            BlockData::Transactions(txs) => txs,
        }
    }

    /// Canonical, length-prefixed encoding used as the hash preimage.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            BlockData::Text(text) => {
                out.push(0);
                encode_str(out, text);
            }
            BlockData::Transactions(txs) => {
                out.push(1);
                out.extend_from_slice(&(txs.len() as u64).to_le_bytes());
                for tx in txs {
                    tx.encode_into(out);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub data: BlockData,
    pub previous_hash: Sha256Hash,
    /// Unix time in milliseconds.
    pub timestamp: u64,
    pub nonce: u64,
    /// Required number of leading zero hex digits, recorded at mining time.
    pub difficulty: u32,
    pub hash: Sha256Hash,
    pub miner_address: Address,
    pub block_reward: u64,
}

impl Block {
    /// Create an unmined block. Call `mine()` to perform PoW.
    pub fn new(
        data: BlockData,
        previous_hash: Sha256Hash,
        timestamp: u64,
        miner_address: impl Into<Address>,
        block_reward: u64,
    ) -> Self {
        let mut block = Block {
            data,
            previous_hash,
            timestamp,
            nonce: 0,
            difficulty: 0,
            hash: [0u8; 32],
            miner_address: miner_address.into(),
            block_reward,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The genesis block for a network. Equal configs yield equal blocks.
    ///
    /// A pinned `config.nonce` is checked against `level`; otherwise the nonce
    /// is searched from zero and `should_stop` is polled every
    /// `check_interval` attempts.
    pub fn genesis<F>(
        config: &GenesisConfig,
        level: u32,
        check_interval: u64,
        should_stop: F,
    ) -> Result<Self, ChainError>
    where
        F: FnMut() -> bool,
    {
        let mut block = Block::new(
            BlockData::Text(config.message.clone()),
            BOOTSTRAP_HASH,
            config.timestamp_ms,
            config.miner_address.clone(),
            config.reward,
        );
        match config.nonce {
            Some(nonce) => {
                block.nonce = nonce;
                block.difficulty = level;
                block.hash = block.calculate_hash();
                if !block.meets_difficulty(level) {
                    return Err(ChainError::ProofOfWorkNotMet {
                        hash: block.hash_hex(),
                        level,
                    });
                }
            }
            None => block.mine(level, check_interval, should_stop)?,
        }
        Ok(block)
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash == BOOTSTRAP_HASH
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.data.transactions()
    }

    /// Total fees carried by this block's transactions.
    pub fn total_fees(&self) -> u64 {
        self.transactions()
            .iter()
            .fold(0u64, |acc, tx| acc.saturating_add(tx.fee))
    }

    fn hash_prefix(&self) -> Sha256 {
        let mut preimage = Vec::new();
        self.data.encode_into(&mut preimage);
        let mut hasher = Sha256::new();
        hasher.update(&preimage);
        hasher.update(self.previous_hash);
        hasher.update(self.timestamp.to_le_bytes());
        hasher
    }

    /// `SHA256(encode(data) ‖ previous_hash ‖ timestamp ‖ nonce)`.
    pub fn calculate_hash(&self) -> Sha256Hash {
        let mut hasher = self.hash_prefix();
        hasher.update(self.nonce.to_le_bytes());
        hasher.finalize().into()
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn meets_difficulty(&self, level: u32) -> bool {
        leading_zero_digits(&self.hash) >= level
    }

    /// Proof-of-work search: from nonce 0, increment until the hash has
    /// `level` leading zero hex digits. `should_stop` is polled every
    /// `check_interval` attempts.
    pub fn mine<F>(&mut self, level: u32, check_interval: u64, mut should_stop: F) -> Result<(), ChainError>
    where
        F: FnMut() -> bool,
    {
        let prefix = self.hash_prefix();
        let check_interval = check_interval.max(1);
        let mut since_check = 0u64;

        self.difficulty = level;
        self.nonce = 0;
        loop {
            let mut hasher = prefix.clone();
            hasher.update(self.nonce.to_le_bytes());
            let hash: Sha256Hash = hasher.finalize().into();
            if leading_zero_digits(&hash) >= level {
                self.hash = hash;
                return Ok(());
            }

            since_check += 1;
            if since_check >= check_interval {
                since_check = 0;
                if should_stop() {
                    self.hash = self.calculate_hash();
                    return Err(ChainError::MiningCancelled);
                }
            }
            self.nonce = self
                .nonce
                .checked_add(1)
                .ok_or(ChainError::NonceSpaceExhausted)?;
        }
    }
}

/// Number of leading `0` characters in the hex rendering of `hash`.
pub fn leading_zero_digits(hash: &Sha256Hash) -> u32 {
    let mut count = 0;
    for byte in hash {
        if *byte == 0 {
            count += 2;
            continue;
        }
        if byte >> 4 == 0 {
            count += 1;
        }
        break;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn sample_block() -> Block {
        Block::new(
            BlockData::Transactions(vec![Transaction::new("alice", "bob", 3, 1)]),
            [7u8; 32],
            1_700_000_000_000,
            "miner",
            50,
        )
    }

    #[test]
    fn test_leading_zero_digits() {
        let mut hash = [0xffu8; 32];
        assert_eq!(leading_zero_digits(&hash), 0);
        hash[0] = 0x0f;
        assert_eq!(leading_zero_digits(&hash), 1);
        hash[0] = 0x00;
        hash[1] = 0x1f;
        assert_eq!(leading_zero_digits(&hash), 2);
        hash[1] = 0x00;
        hash[2] = 0x0a;
        assert_eq!(leading_zero_digits(&hash), 5);
        assert_eq!(leading_zero_digits(&[0u8; 32]), 64);
    }

    #[test]
    fn test_new_block_has_consistent_hash() {
        let block = sample_block();
        assert_eq!(block.hash, block.calculate_hash());
        assert_eq!(block.nonce, 0);
    }

    #[test]
    fn test_mining_produces_leading_zeros() {
        let mut block = sample_block();
        block.mine(2, 1_000, || false).unwrap();
        assert!(block.hash_hex().starts_with("00"));
        assert_eq!(block.difficulty, 2);
        assert_eq!(block.hash, block.calculate_hash());
        assert!(block.meets_difficulty(2));
    }

    #[test]
    fn test_hash_ignores_unhashed_fields() {
        let mut block = sample_block();
        let before = block.calculate_hash();
        block.miner_address = "someone-else".to_string();
        block.difficulty = 9;
        assert_eq!(before, block.calculate_hash());
    }

    #[test]
    fn test_invalid_when_mutated() {
        let mut block = sample_block();
        block.mine(1, 1_000, || false).unwrap();
        let old_hash = block.hash;

        if let BlockData::Transactions(txs) = &mut block.data {
            txs.push(Transaction::new("mallory", "mallory", 1, 0));
        }
        assert_ne!(old_hash, block.calculate_hash());
    }

    #[test]
    fn test_timestamp_and_nonce_are_committed() {
        let block = sample_block();
        let mut later = block.clone();
        later.timestamp += 1;
        assert_ne!(block.calculate_hash(), later.calculate_hash());

        let mut bumped = block.clone();
        bumped.nonce += 1;
        assert_ne!(block.calculate_hash(), bumped.calculate_hash());
    }

    #[test]
    fn test_mining_can_be_cancelled() {
        let mut block = sample_block();
        let polls = Cell::new(0);
        let result = block.mine(64, 8, || {
            polls.set(polls.get() + 1);
            polls.get() >= 3
        });
        assert_eq!(result, Err(ChainError::MiningCancelled));
        assert_eq!(polls.get(), 3);
        assert_eq!(block.hash, block.calculate_hash());
    }

    #[test]
    fn test_genesis_is_deterministic() {
        let config = GenesisConfig::default();
        let a = Block::genesis(&config, 1, 1_000, || false).unwrap();
        let b = Block::genesis(&config, 1, 1_000, || false).unwrap();
        assert_eq!(a, b);
        assert!(a.is_genesis());
        assert!(a.meets_difficulty(1));
    }

    #[test]
    fn test_genesis_search_can_be_cancelled() {
        let config = GenesisConfig::default();
        let result = Block::genesis(&config, 64, 16, || true);
        assert_eq!(result, Err(ChainError::MiningCancelled));
    }

    #[test]
    fn test_pinned_genesis_nonce_is_verified_not_searched() {
        let mut config = GenesisConfig::default();
        let mined = Block::genesis(&config, 2, 1_000, || false).unwrap();

        config.nonce = Some(mined.nonce);
        let pinned = Block::genesis(&config, 2, 1_000, || panic!("pinned nonce was searched")).unwrap();
        assert_eq!(pinned, mined);

        let bad_nonce = (0..)
            .find(|n| {
                let mut candidate = config.clone();
                candidate.nonce = Some(*n);
                let block = Block::genesis(&candidate, 0, 1, || false).unwrap();
                !block.meets_difficulty(1)
            })
            .unwrap();
        config.nonce = Some(bad_nonce);
        assert!(matches!(
            Block::genesis(&config, 1, 1_000, || false),
            Err(ChainError::ProofOfWorkNotMet { level: 1, .. })
        ));
    }
}
