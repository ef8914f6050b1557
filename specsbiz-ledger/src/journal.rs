use rust_decimal::Decimal;
use specsbiz_core::{BakiRecord, SalesEntry};
use uuid::Uuid;

/// A single collection against a baki record.
#[derive(Clone, Debug, PartialEq)]
pub struct Payment {
    pub amount: Decimal,
    /// Idempotency key; resubmitting a key already in the journal applies nothing.
    pub key: String,
}

impl Payment {
    /// Payment with a freshly generated idempotency key.
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount,
            key: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

/// Outcome of a payment: the journal entry and the record state after it.
#[derive(Clone, Debug)]
pub struct PaymentReceipt {
    pub sale: SalesEntry,
    pub record: BakiRecord,
    /// True when the payment key had already been applied and nothing changed.
    pub replayed: bool,
}

/// Context required to derive the sales journal entry for a baki collection.
pub struct PaymentJournalContext<'a> {
    pub record: &'a BakiRecord,
    pub payment: &'a Payment,
}

impl<'a> PaymentJournalContext<'a> {
    pub fn new(record: &'a BakiRecord, payment: &'a Payment) -> Self {
        Self { record, payment }
    }
}

/// Build the journal entry for a collected payment.
///
/// Collections carry no profit: the margin belongs to the original credit sale.
/// The sequence is left at zero and assigned by the store on append.
pub fn entry_for_payment(ctx: PaymentJournalContext<'_>) -> SalesEntry {
    let mut entry = SalesEntry::new(ctx.payment.amount, Decimal::ZERO);
    entry.is_baki_payment = true;
    entry.baki_product_name = Some(ctx.record.product_name.clone());
    entry.customer_id = Some(ctx.record.customer_id);
    entry.record_id = Some(ctx.record.id);
    entry.payment_key = Some(ctx.payment.key.clone());
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use specsbiz_core::{BakiLineItem, CustomerId};

    #[test]
    fn payment_entry_is_marked_and_profitless() {
        let record = BakiRecord::open(
            CustomerId::new(),
            BakiLineItem::new("Lentils", dec!(2), dec!(240)),
        );
        let payment = Payment::new(dec!(100)).with_key("pay-1");
        let entry = entry_for_payment(PaymentJournalContext::new(&record, &payment));
        assert!(entry.is_baki_payment);
        assert_eq!(entry.total, dec!(100));
        assert_eq!(entry.profit, Decimal::ZERO);
        assert_eq!(entry.baki_product_name.as_deref(), Some("Lentils"));
        assert_eq!(entry.record_id, Some(record.id));
        assert_eq!(entry.payment_key.as_deref(), Some("pay-1"));
    }
}
