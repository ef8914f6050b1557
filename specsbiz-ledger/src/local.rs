use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use specsbiz_core::{BakiRecord, Customer, CustomerId, RecordId, SalesEntry, TenantId};
use tracing::{debug, warn};

use crate::store::{checked_balance, sort_customers, sort_records};
use crate::{LedgerError, LedgerResult, LedgerStore, LedgerWrite, SalesQuery};

/// Named string slots, the persistence model of browser local storage.
pub trait SlotStorage: Send + Sync {
    fn read(&self, slot: &str) -> LedgerResult<Option<String>>;
    fn write(&self, slot: &str, value: &str) -> LedgerResult<()>;
    fn remove(&self, slot: &str) -> LedgerResult<()>;
}

/// Slots held in process memory; lost when the process exits.
#[derive(Debug, Default)]
pub struct MemorySlots {
    slots: Mutex<HashMap<String, String>>,
}

impl MemorySlots {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotStorage for MemorySlots {
    fn read(&self, slot: &str) -> LedgerResult<Option<String>> {
        Ok(self.slots.lock().get(slot).cloned())
    }

    fn write(&self, slot: &str, value: &str) -> LedgerResult<()> {
        self.slots.lock().insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, slot: &str) -> LedgerResult<()> {
        self.slots.lock().remove(slot);
        Ok(())
    }
}

/// One JSON file per slot inside a directory.
#[derive(Clone, Debug)]
pub struct FileSlots {
    dir: PathBuf,
}

impl FileSlots {
    pub fn new(dir: impl Into<PathBuf>) -> LedgerResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{slot}.json"))
    }
}

impl SlotStorage for FileSlots {
    fn read(&self, slot: &str) -> LedgerResult<Option<String>> {
        let path = self.slot_path(slot);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, slot: &str, value: &str) -> LedgerResult<()> {
        let path = self.slot_path(slot);
        let tmp = self.dir.join(format!("{slot}.json.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, slot: &str) -> LedgerResult<()> {
        match fs::remove_file(self.slot_path(slot)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Customer document as laid out in the customers slot: the customer with its
/// baki records embedded.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCustomer {
    #[serde(flatten)]
    customer: Customer,
    #[serde(default)]
    baki_records: Vec<BakiRecord>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct LocalState {
    customers: Vec<StoredCustomer>,
    sales: Vec<SalesEntry>,
}

impl LocalState {
    fn customer_mut(&mut self, id: CustomerId) -> LedgerResult<&mut StoredCustomer> {
        self.customers
            .iter_mut()
            .find(|stored| stored.customer.id == id)
            .ok_or(LedgerError::CustomerNotFound(id))
    }

    fn apply(&mut self, write: &LedgerWrite) -> LedgerResult<()> {
        match write {
            LedgerWrite::PutCustomer(customer) => {
                match self
                    .customers
                    .iter_mut()
                    .find(|stored| stored.customer.id == customer.id)
                {
                    Some(stored) => {
                        let total_due = stored.customer.total_due;
                        stored.customer = customer.clone();
                        stored.customer.total_due = total_due;
                    }
                    None => self.customers.push(StoredCustomer {
                        customer: customer.clone(),
                        baki_records: Vec::new(),
                    }),
                }
            }
            LedgerWrite::DeleteCustomer(id) => {
                let before = self.customers.len();
                self.customers.retain(|stored| stored.customer.id != *id);
                if self.customers.len() == before {
                    return Err(LedgerError::CustomerNotFound(*id));
                }
            }
            LedgerWrite::PutRecord(record) => {
                let stored = self.customer_mut(record.customer_id)?;
                match stored.baki_records.iter_mut().find(|r| r.id == record.id) {
                    Some(existing) => *existing = record.clone(),
                    None => stored.baki_records.push(record.clone()),
                }
            }
            LedgerWrite::DeleteRecord {
                customer_id,
                record_id,
            } => {
                let stored = self.customer_mut(*customer_id)?;
                let before = stored.baki_records.len();
                stored.baki_records.retain(|r| r.id != *record_id);
                if stored.baki_records.len() == before {
                    return Err(LedgerError::RecordNotFound {
                        customer_id: *customer_id,
                        record_id: *record_id,
                    });
                }
            }
            LedgerWrite::AdjustTotalDue { customer_id, delta } => {
                let stored = self.customer_mut(*customer_id)?;
                stored.customer.total_due =
                    checked_balance(*customer_id, stored.customer.total_due, *delta)?;
                stored.customer.updated_at = chrono::Utc::now();
            }
            LedgerWrite::AppendSale(entry) => {
                if let Some(key) = &entry.payment_key {
                    if self.sales.iter().any(|s| s.payment_key.as_ref() == Some(key)) {
                        return Err(LedgerError::InvalidState(format!(
                            "payment key {key} already journaled"
                        )));
                    }
                }
                let next = self.sales.iter().map(|s| s.sequence).max().unwrap_or(0) + 1;
                self.sales.push(entry.clone().with_sequence(next));
            }
        }
        Ok(())
    }
}

/// Ledger store over [`SlotStorage`]: every commit reads the whole tenant state and
/// rewrites it whole.
///
/// Slot layout per tenant: `<tenant>.customers` holds a flat JSON array of customers
/// with embedded baki records, `<tenant>.sales` the sales journal array. A commit
/// first stages both documents in `<tenant>.wal` so an interrupted rewrite is rolled
/// forward on the next access.
pub struct LocalLedgerStore {
    tenant: TenantId,
    slots: Box<dyn SlotStorage>,
    guard: Mutex<()>,
}

impl LocalLedgerStore {
    pub fn new(slots: impl SlotStorage + 'static, tenant: TenantId) -> LedgerResult<Self> {
        let store = Self {
            tenant,
            slots: Box::new(slots),
            guard: Mutex::new(()),
        };
        {
            let _lock = store.guard.lock();
            store.recover()?;
        }
        Ok(store)
    }

    /// Store backed by JSON files in `dir`.
    pub fn open(dir: impl Into<PathBuf>, tenant: TenantId) -> LedgerResult<Self> {
        Self::new(FileSlots::new(dir)?, tenant)
    }

    /// Store that keeps its slots in memory only.
    pub fn in_memory(tenant: TenantId) -> Self {
        Self {
            tenant,
            slots: Box::new(MemorySlots::new()),
            guard: Mutex::new(()),
        }
    }

    fn customers_slot(&self) -> String {
        format!("{}.customers", self.tenant)
    }

    fn sales_slot(&self) -> String {
        format!("{}.sales", self.tenant)
    }

    fn wal_slot(&self) -> String {
        format!("{}.wal", self.tenant)
    }

    /// Roll a staged commit forward. Caller holds the guard.
    fn recover(&self) -> LedgerResult<()> {
        let Some(staged) = self.slots.read(&self.wal_slot())? else {
            return Ok(());
        };
        warn!(tenant = %self.tenant, "rolling forward interrupted local ledger commit");
        let state: LocalState = serde_json::from_str(&staged)?;
        self.persist(&state)?;
        self.slots.remove(&self.wal_slot())
    }

    fn persist(&self, state: &LocalState) -> LedgerResult<()> {
        self.slots
            .write(&self.customers_slot(), &serde_json::to_string(&state.customers)?)?;
        self.slots
            .write(&self.sales_slot(), &serde_json::to_string(&state.sales)?)?;
        Ok(())
    }

    /// Load the full tenant state. Caller holds the guard.
    fn load(&self) -> LedgerResult<LocalState> {
        self.recover()?;
        let customers = match self.slots.read(&self.customers_slot())? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        let sales = match self.slots.read(&self.sales_slot())? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        Ok(LocalState { customers, sales })
    }

    fn read_state(&self) -> LedgerResult<LocalState> {
        let _lock = self.guard.lock();
        self.load()
    }
}

impl LedgerStore for LocalLedgerStore {
    fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    fn customer(&self, id: CustomerId) -> LedgerResult<Option<Customer>> {
        Ok(self
            .read_state()?
            .customers
            .into_iter()
            .find(|stored| stored.customer.id == id)
            .map(|stored| stored.customer))
    }

    fn customers(&self) -> LedgerResult<Vec<Customer>> {
        let mut customers: Vec<Customer> = self
            .read_state()?
            .customers
            .into_iter()
            .map(|stored| stored.customer)
            .collect();
        sort_customers(&mut customers);
        Ok(customers)
    }

    fn record(
        &self,
        customer_id: CustomerId,
        record_id: RecordId,
    ) -> LedgerResult<Option<BakiRecord>> {
        Ok(self
            .read_state()?
            .customers
            .into_iter()
            .find(|stored| stored.customer.id == customer_id)
            .and_then(|stored| stored.baki_records.into_iter().find(|r| r.id == record_id)))
    }

    fn records(&self, customer_id: CustomerId) -> LedgerResult<Vec<BakiRecord>> {
        let mut records = self
            .read_state()?
            .customers
            .into_iter()
            .find(|stored| stored.customer.id == customer_id)
            .map(|stored| stored.baki_records)
            .unwrap_or_default();
        sort_records(&mut records);
        Ok(records)
    }

    fn sales(&self, query: SalesQuery) -> LedgerResult<Vec<SalesEntry>> {
        Ok(query.apply(self.read_state()?.sales))
    }

    fn sale_by_payment_key(&self, key: &str) -> LedgerResult<Option<SalesEntry>> {
        Ok(self
            .read_state()?
            .sales
            .into_iter()
            .find(|entry| entry.payment_key.as_deref() == Some(key)))
    }

    fn latest_sale_sequence(&self) -> LedgerResult<Option<u64>> {
        Ok(self.read_state()?.sales.iter().map(|s| s.sequence).max())
    }

    fn commit(&self, writes: &[LedgerWrite]) -> LedgerResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let _lock = self.guard.lock();
        let mut state = self.load()?;
        for write in writes {
            state.apply(write)?;
        }
        self.slots
            .write(&self.wal_slot(), &serde_json::to_string(&state)?)?;
        self.persist(&state)?;
        self.slots.remove(&self.wal_slot())?;
        debug!(
            tenant = %self.tenant,
            writes = writes.len(),
            kinds = ?writes.iter().map(LedgerWrite::kind).collect::<Vec<_>>(),
            "committed ledger batch to local slots"
        );
        Ok(())
    }
}
