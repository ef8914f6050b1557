use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CustomerId, RecordId};

/// Settlement state of a baki record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BakiStatus {
    Pending,
    Paid,
}

impl BakiStatus {
    /// The only way a status is ever produced: paid once the payments cover the amount.
    pub fn derive(paid_amount: Decimal, amount: Decimal) -> Self {
        if paid_amount >= amount {
            BakiStatus::Paid
        } else {
            BakiStatus::Pending
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BakiStatus::Pending => "pending",
            BakiStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for BakiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BakiStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BakiStatus::Pending),
            "paid" => Ok(BakiStatus::Paid),
            other => Err(format!("unknown baki status: {other}")),
        }
    }
}

/// Goods taken on credit, as supplied by the operator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BakiLineItem {
    pub product_name: String,
    pub quantity: Decimal,
    pub amount: Decimal,
    pub promise_date: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl BakiLineItem {
    pub fn new(product_name: impl Into<String>, quantity: Decimal, amount: Decimal) -> Self {
        Self {
            product_name: product_name.into(),
            quantity,
            amount,
            promise_date: None,
            note: None,
        }
    }

    pub fn with_promise_date(mut self, promise_date: DateTime<Utc>) -> Self {
        self.promise_date = Some(promise_date);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_product_name(&self.product_name)?;
        validate_quantity(self.quantity)?;
        validate_amount(self.amount)
    }
}

/// Partial update applied to an existing record. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BakiAmendment {
    pub product_name: Option<String>,
    pub quantity: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub promise_date: Option<Option<DateTime<Utc>>>,
    pub note: Option<Option<String>>,
}

impl BakiAmendment {
    pub fn amount(amount: Decimal) -> Self {
        Self {
            amount: Some(amount),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.product_name.is_none()
            && self.quantity.is_none()
            && self.amount.is_none()
            && self.promise_date.is_none()
            && self.note.is_none()
    }
}

/// One line of credit owed by a customer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BakiRecord {
    pub id: RecordId,
    pub customer_id: CustomerId,
    pub product_name: String,
    pub quantity: Decimal,
    pub amount: Decimal,
    pub paid_amount: Decimal,
    pub status: BakiStatus,
    pub taken_date: DateTime<Utc>,
    pub promise_date: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl BakiRecord {
    /// Open a fresh, unpaid record for the supplied line item.
    pub fn open(customer_id: CustomerId, item: BakiLineItem) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::new(),
            customer_id,
            product_name: item.product_name.trim().to_string(),
            quantity: item.quantity,
            amount: item.amount,
            paid_amount: Decimal::ZERO,
            status: BakiStatus::derive(Decimal::ZERO, item.amount),
            taken_date: now,
            promise_date: item.promise_date,
            note: item.note,
            updated_at: now,
        }
    }

    /// Remaining unpaid balance.
    pub fn outstanding(&self) -> Decimal {
        self.amount - self.paid_amount
    }

    pub fn is_paid(&self) -> bool {
        self.status == BakiStatus::Paid
    }

    /// Record a collected payment. Callers are expected to have bounded `amount`
    /// by [`BakiRecord::outstanding`].
    pub fn apply_payment(&mut self, amount: Decimal) -> Result<(), String> {
        self.paid_amount = self
            .paid_amount
            .checked_add(amount)
            .ok_or_else(|| format!("paid amount {} + {amount} overflows", self.paid_amount))?;
        self.status = BakiStatus::derive(self.paid_amount, self.amount);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Apply an amendment and return the change in amount it caused.
    pub fn apply_amendment(&mut self, amendment: BakiAmendment) -> Result<Decimal, String> {
        if let Some(name) = &amendment.product_name {
            validate_product_name(name)?;
        }
        if let Some(quantity) = amendment.quantity {
            validate_quantity(quantity)?;
        }
        if let Some(amount) = amendment.amount {
            validate_amount(amount)?;
            if amount < self.paid_amount {
                return Err(format!(
                    "amount {amount} is below the {} already paid",
                    self.paid_amount
                ));
            }
        }

        let delta = match amendment.amount {
            Some(amount) => amount
                .checked_sub(self.amount)
                .ok_or_else(|| format!("amount change {} -> {amount} overflows", self.amount))?,
            None => Decimal::ZERO,
        };
        if let Some(name) = amendment.product_name {
            self.product_name = name.trim().to_string();
        }
        if let Some(quantity) = amendment.quantity {
            self.quantity = quantity;
        }
        if let Some(amount) = amendment.amount {
            self.amount = amount;
        }
        if let Some(promise_date) = amendment.promise_date {
            self.promise_date = promise_date;
        }
        if let Some(note) = amendment.note {
            self.note = note;
        }
        self.status = BakiStatus::derive(self.paid_amount, self.amount);
        self.updated_at = Utc::now();
        Ok(delta)
    }

    /// Check the record-level invariants, returning a description of the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.paid_amount < Decimal::ZERO {
            return Err(format!("paid amount {} is negative", self.paid_amount));
        }
        if self.paid_amount > self.amount {
            return Err(format!(
                "paid amount {} exceeds amount {}",
                self.paid_amount, self.amount
            ));
        }
        let expected = BakiStatus::derive(self.paid_amount, self.amount);
        if self.status != expected {
            return Err(format!("status {} should be {expected}", self.status));
        }
        Ok(())
    }
}

fn validate_product_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("product name is required".into());
    }
    Ok(())
}

fn validate_quantity(quantity: Decimal) -> Result<(), String> {
    if quantity <= Decimal::ZERO {
        return Err(format!("quantity must be positive, got {quantity}"));
    }
    Ok(())
}

fn validate_amount(amount: Decimal) -> Result<(), String> {
    if amount <= Decimal::ZERO {
        return Err(format!("amount must be positive, got {amount}"));
    }
    Ok(())
}
