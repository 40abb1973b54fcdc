/// Validation logic for transactions separated from type definitions
use crate::blockchain::LedgerState;
use crate::error::ChainError;
use crate::transaction::types::Transaction;

impl Transaction {
    /// Stateless checks: non-empty addresses and a representable total cost.
    pub fn validate_structure(&self) -> Result<(), ChainError> {
        if self.sender.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "Sender address cannot be empty".to_string(),
            ));
        }
        if self.receiver.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "Receiver address cannot be empty".to_string(),
            ));
        }
        if self.total_cost().is_none() {
            return Err(ChainError::InvalidTransaction(format!(
                "Amount {} plus fee {} overflows",
                self.amount, self.fee
            )));
        }
        Ok(())
    }

    /// Check this transaction against a running balance table and, if the
    /// sender can cover `amount + fee`, debit the sender in `state`.
    ///
    /// Only the debit is applied: receiver and fee credits wait for the
    /// containing block to reach confirmation depth.
    pub fn validate(&self, state: &mut LedgerState) -> Result<(), ChainError> {
        self.validate_structure()?;
        let required = self.total_cost().ok_or_else(|| {
            ChainError::InvalidTransaction("Total cost overflows".to_string())
        })?;

        let available = state.get_balance(&self.sender);
        if available < required {
            return Err(ChainError::DoubleSpend {
                sender: self.sender.clone(),
                required,
                available,
            });
        }
        state.debit(&self.sender, required);
        Ok(())
    }
}
