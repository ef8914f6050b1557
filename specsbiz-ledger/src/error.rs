use rust_decimal::Decimal;
use specsbiz_core::{CustomerId, RecordId};
use thiserror::Error;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid ledger state: {0}")]
    InvalidState(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),
    #[error("baki record {record_id} not found for customer {customer_id}")]
    RecordNotFound {
        customer_id: CustomerId,
        record_id: RecordId,
    },
    #[error("payment of {requested} exceeds outstanding balance {outstanding}")]
    Overpayment {
        requested: Decimal,
        outstanding: Decimal,
    },
}

impl LedgerError {
    /// True when the error was caused by caller input rather than the store.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::Validation(_)
                | LedgerError::CustomerNotFound(_)
                | LedgerError::RecordNotFound { .. }
                | LedgerError::Overpayment { .. }
        )
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}
