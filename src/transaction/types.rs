/// Transaction types for ForkChain
use sha2::{Digest, Sha256};

/// Addresses are opaque account names; the engine carries no key material.
pub type Address = String;

/// A value transfer recorded in a block. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub receiver: Address,
    pub amount: u64,
    pub fee: u64,
}

impl Transaction {
    pub fn new(sender: impl Into<Address>, receiver: impl Into<Address>, amount: u64, fee: u64) -> Self {
        Transaction {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            fee,
        }
    }

    /// `amount + fee`, or `None` if the sum overflows.
    pub fn total_cost(&self) -> Option<u64> {
        self.amount.checked_add(self.fee)
    }

    /// Append the canonical encoding of this transaction to `out`.
    ///
    /// Strings are length-prefixed with a little-endian `u64`, integers are
    /// little-endian, so the encoding is reproducible across implementations.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        encode_str(out, &self.sender);
        encode_str(out, &self.receiver);
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.fee.to_le_bytes());
    }

    /// Calculate the hash of this transaction
    pub fn hash(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(64);
        self.encode_into(&mut buf);
        let mut hasher = Sha256::new();
        hasher.update("transfer".as_bytes());
        hasher.update(&buf);
        hasher.finalize().into()
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash())
    }
}

pub(crate) fn encode_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u64).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}
