use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CustomerId, RecordId, SaleId};

/// Append-only sales journal record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesEntry {
    pub id: SaleId,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub total: Decimal,
    pub profit: Decimal,
    pub is_baki_payment: bool,
    pub baki_product_name: Option<String>,
    pub customer_id: Option<CustomerId>,
    pub record_id: Option<RecordId>,
    /// Idempotency key of the payment event that produced this entry.
    pub payment_key: Option<String>,
}

impl SalesEntry {
    /// Creates a new entry with a zero sequence number.
    pub fn new(total: Decimal, profit: Decimal) -> Self {
        Self {
            id: SaleId::new(),
            sequence: 0,
            timestamp: Utc::now(),
            total,
            profit,
            is_baki_payment: false,
            baki_product_name: None,
            customer_id: None,
            record_id: None,
            payment_key: None,
        }
    }

    /// Assign the monotonic sequence number used for ordering the journal.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }
}
