use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CustomerId;

/// Caller-editable customer fields. The running balance is deliberately absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

impl CustomerProfile {
    pub fn new(first_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            ..Self::default()
        }
    }

    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = last_name.into();
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Reject profiles the ledger cannot store.
    pub fn validate(&self) -> Result<(), String> {
        if self.first_name.trim().is_empty() {
            return Err("customer first name is required".into());
        }
        Ok(())
    }

    fn normalized(self) -> Self {
        Self {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            address: self.address.trim().to_string(),
        }
    }
}

/// A person who may owe money, with the denormalized sum of their open balances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub address: String,
    /// Sum of `amount - paid_amount` over the customer's baki records.
    pub total_due: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Build a new customer from a profile. The balance always starts at zero.
    pub fn new(profile: CustomerProfile) -> Self {
        let now = Utc::now();
        let profile = profile.normalized();
        Self {
            id: CustomerId::new(),
            first_name: profile.first_name,
            last_name: profile.last_name,
            phone: profile.phone,
            address: profile.address,
            total_due: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the profile fields, leaving `total_due` alone.
    pub fn apply_profile(&mut self, profile: CustomerProfile) {
        let profile = profile.normalized();
        self.first_name = profile.first_name;
        self.last_name = profile.last_name;
        self.phone = profile.phone;
        self.address = profile.address;
        self.updated_at = Utc::now();
    }

    pub fn profile(&self) -> CustomerProfile {
        CustomerProfile {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
        }
    }

    pub fn display_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }

    /// Ordering key for customer listings: first name, case-insensitive.
    pub fn sort_key(&self) -> (String, CustomerId) {
        (self.first_name.to_lowercase(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_customer_starts_with_zero_balance() {
        let customer = Customer::new(CustomerProfile::new("  Rahim ").with_phone("0171"));
        assert_eq!(customer.total_due, Decimal::ZERO);
        assert_eq!(customer.first_name, "Rahim");
        assert_eq!(customer.display_name(), "Rahim");
    }

    #[test]
    fn blank_first_name_is_rejected() {
        assert!(CustomerProfile::new("   ").validate().is_err());
        assert!(CustomerProfile::new("Karim").validate().is_ok());
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let customer = Customer::new(CustomerProfile::new("Rahim").with_last_name("Uddin"));
        let json = serde_json::to_value(&customer).unwrap();
        assert!(json.get("totalDue").is_some());
        assert_eq!(json["lastName"], "Uddin");
    }
}
