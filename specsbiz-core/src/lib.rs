//! Core domain types shared by every SpecsBiz crate.

mod baki;
mod customer;
mod ids;
mod sales;

pub use baki::{BakiAmendment, BakiLineItem, BakiRecord, BakiStatus};
pub use customer::{Customer, CustomerProfile};
pub use ids::{CustomerId, RecordId, SaleId, TenantId};
pub use sales::SalesEntry;
