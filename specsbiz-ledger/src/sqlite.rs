use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use specsbiz_core::{
    BakiRecord, BakiStatus, Customer, CustomerId, RecordId, SaleId, SalesEntry, TenantId,
};
use tracing::debug;

use crate::store::{checked_balance, sort_customers, sort_records};
use crate::{LedgerError, LedgerResult, LedgerStore, LedgerWrite, SalesQuery};

const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    tenant TEXT NOT NULL,
    customer_id TEXT NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    phone TEXT NOT NULL,
    address TEXT NOT NULL,
    total_due TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (tenant, customer_id)
);
CREATE TABLE IF NOT EXISTS baki_records (
    tenant TEXT NOT NULL,
    customer_id TEXT NOT NULL,
    record_id TEXT NOT NULL,
    product_name TEXT NOT NULL,
    quantity TEXT NOT NULL,
    amount TEXT NOT NULL,
    paid_amount TEXT NOT NULL,
    status TEXT NOT NULL,
    taken_date TEXT NOT NULL,
    promise_date TEXT,
    note TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (tenant, customer_id, record_id)
);
CREATE INDEX IF NOT EXISTS baki_idx_customer_taken
    ON baki_records(tenant, customer_id, taken_date);
CREATE TABLE IF NOT EXISTS sales_entries (
    tenant TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    entry_id TEXT NOT NULL UNIQUE,
    timestamp TEXT NOT NULL,
    total TEXT NOT NULL,
    profit TEXT NOT NULL,
    is_baki_payment INTEGER NOT NULL,
    baki_product_name TEXT,
    customer_id TEXT,
    record_id TEXT,
    payment_key TEXT,
    PRIMARY KEY (tenant, sequence)
);
CREATE UNIQUE INDEX IF NOT EXISTS sales_idx_payment_key
    ON sales_entries(tenant, payment_key) WHERE payment_key IS NOT NULL;
CREATE INDEX IF NOT EXISTS sales_idx_timestamp
    ON sales_entries(tenant, timestamp);
"#;

const CUSTOMER_COLUMNS: &str =
    "customer_id, first_name, last_name, phone, address, total_due, created_at, updated_at";
const RECORD_COLUMNS: &str = "customer_id, record_id, product_name, quantity, amount, paid_amount, \
     status, taken_date, promise_date, note, updated_at";
const SALE_COLUMNS: &str = "sequence, entry_id, timestamp, total, profit, is_baki_payment, \
     baki_product_name, customer_id, record_id, payment_key";

/// SQLite-backed ledger store; every commit runs in one immediate transaction.
#[derive(Clone, Debug)]
pub struct SqliteLedgerStore {
    path: PathBuf,
    tenant: TenantId,
}

impl SqliteLedgerStore {
    pub fn new(path: impl Into<PathBuf>, tenant: TenantId) -> LedgerResult<Self> {
        let store = Self {
            path: path.into(),
            tenant,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> LedgerResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Ok(conn)
    }

    fn tenant_key(&self) -> &str {
        self.tenant.as_str()
    }

    fn apply_write(&self, tx: &Connection, write: &LedgerWrite) -> LedgerResult<()> {
        let tenant = self.tenant_key();
        match write {
            LedgerWrite::PutCustomer(customer) => {
                tx.execute(
                    "INSERT INTO customers (
                        tenant, customer_id, first_name, last_name, phone, address,
                        total_due, created_at, updated_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(tenant, customer_id) DO UPDATE SET
                        first_name = excluded.first_name,
                        last_name = excluded.last_name,
                        phone = excluded.phone,
                        address = excluded.address,
                        updated_at = excluded.updated_at",
                    params![
                        tenant,
                        customer.id.to_string(),
                        customer.first_name,
                        customer.last_name,
                        customer.phone,
                        customer.address,
                        customer.total_due.to_string(),
                        format_time(&customer.created_at),
                        format_time(&customer.updated_at),
                    ],
                )?;
            }
            LedgerWrite::DeleteCustomer(customer_id) => {
                let id = customer_id.to_string();
                let removed = tx.execute(
                    "DELETE FROM customers WHERE tenant = ?1 AND customer_id = ?2",
                    params![tenant, id],
                )?;
                if removed == 0 {
                    return Err(LedgerError::CustomerNotFound(*customer_id));
                }
                tx.execute(
                    "DELETE FROM baki_records WHERE tenant = ?1 AND customer_id = ?2",
                    params![tenant, id],
                )?;
            }
            LedgerWrite::PutRecord(record) => {
                ensure_customer(tx, tenant, record.customer_id)?;
                tx.execute(
                    "INSERT INTO baki_records (
                        tenant, customer_id, record_id, product_name, quantity, amount,
                        paid_amount, status, taken_date, promise_date, note, updated_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                     ON CONFLICT(tenant, customer_id, record_id) DO UPDATE SET
                        product_name = excluded.product_name,
                        quantity = excluded.quantity,
                        amount = excluded.amount,
                        paid_amount = excluded.paid_amount,
                        status = excluded.status,
                        promise_date = excluded.promise_date,
                        note = excluded.note,
                        updated_at = excluded.updated_at",
                    params![
                        tenant,
                        record.customer_id.to_string(),
                        record.id.to_string(),
                        record.product_name,
                        record.quantity.to_string(),
                        record.amount.to_string(),
                        record.paid_amount.to_string(),
                        record.status.as_str(),
                        format_time(&record.taken_date),
                        record.promise_date.as_ref().map(format_time),
                        record.note,
                        format_time(&record.updated_at),
                    ],
                )?;
            }
            LedgerWrite::DeleteRecord {
                customer_id,
                record_id,
            } => {
                let removed = tx.execute(
                    "DELETE FROM baki_records
                     WHERE tenant = ?1 AND customer_id = ?2 AND record_id = ?3",
                    params![tenant, customer_id.to_string(), record_id.to_string()],
                )?;
                if removed == 0 {
                    return Err(LedgerError::RecordNotFound {
                        customer_id: *customer_id,
                        record_id: *record_id,
                    });
                }
            }
            LedgerWrite::AdjustTotalDue { customer_id, delta } => {
                let id = customer_id.to_string();
                let current: Option<String> = tx
                    .query_row(
                        "SELECT total_due FROM customers WHERE tenant = ?1 AND customer_id = ?2",
                        params![tenant, id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let current = current.ok_or(LedgerError::CustomerNotFound(*customer_id))?;
                let updated = checked_balance(*customer_id, parse_decimal(&current)?, *delta)?;
                tx.execute(
                    "UPDATE customers SET total_due = ?3, updated_at = ?4
                     WHERE tenant = ?1 AND customer_id = ?2",
                    params![tenant, id, updated.to_string(), format_time(&Utc::now())],
                )?;
            }
            LedgerWrite::AppendSale(entry) => {
                let next: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(sequence), 0) + 1 FROM sales_entries WHERE tenant = ?1",
                    params![tenant],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT INTO sales_entries (
                        tenant, sequence, entry_id, timestamp, total, profit, is_baki_payment,
                        baki_product_name, customer_id, record_id, payment_key
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        tenant,
                        next,
                        entry.id.to_string(),
                        format_time(&entry.timestamp),
                        entry.total.to_string(),
                        entry.profit.to_string(),
                        entry.is_baki_payment,
                        entry.baki_product_name,
                        entry.customer_id.map(|id| id.to_string()),
                        entry.record_id.map(|id| id.to_string()),
                        entry.payment_key,
                    ],
                )?;
            }
        }
        Ok(())
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    fn customer(&self, id: CustomerId) -> LedgerResult<Option<Customer>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE tenant = ?1 AND customer_id = ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![self.tenant_key(), id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_customer(row)?)),
            None => Ok(None),
        }
    }

    fn customers(&self) -> LedgerResult<Vec<Customer>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE tenant = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![self.tenant_key()])?;
        let mut customers = Vec::new();
        while let Some(row) = rows.next()? {
            customers.push(row_to_customer(row)?);
        }
        sort_customers(&mut customers);
        Ok(customers)
    }

    fn record(
        &self,
        customer_id: CustomerId,
        record_id: RecordId,
    ) -> LedgerResult<Option<BakiRecord>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM baki_records
             WHERE tenant = ?1 AND customer_id = ?2 AND record_id = ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![
            self.tenant_key(),
            customer_id.to_string(),
            record_id.to_string()
        ])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_record(row)?)),
            None => Ok(None),
        }
    }

    fn records(&self, customer_id: CustomerId) -> LedgerResult<Vec<BakiRecord>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM baki_records WHERE tenant = ?1 AND customer_id = ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![self.tenant_key(), customer_id.to_string()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row)?);
        }
        sort_records(&mut records);
        Ok(records)
    }

    fn sales(&self, query: SalesQuery) -> LedgerResult<Vec<SalesEntry>> {
        let conn = self.connect()?;
        let mut sql = format!(
            "SELECT {SALE_COLUMNS}
             FROM sales_entries
             WHERE tenant = ?1
               AND (?2 IS NULL OR customer_id = ?2)
               AND (?3 = 0 OR is_baki_payment = 1)
               AND (?4 IS NULL OR sequence >= ?4)
               AND (?5 IS NULL OR sequence <= ?5)
               AND (?6 IS NULL OR timestamp >= ?6)
               AND (?7 IS NULL OR timestamp <= ?7)"
        );
        sql.push_str(if query.ascending {
            " ORDER BY sequence ASC"
        } else {
            " ORDER BY sequence DESC"
        });
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?8");
        }

        let mut params: Vec<Value> = Vec::with_capacity(8);
        params.push(Value::from(self.tenant_key().to_string()));
        params.push(optional_text(query.customer.map(|id| id.to_string())));
        params.push(Value::Integer(i64::from(query.baki_payments_only)));
        params.push(optional_int(query.start_sequence));
        params.push(optional_int(query.end_sequence));
        params.push(optional_text(query.start_time.as_ref().map(format_time)));
        params.push(optional_text(query.end_time.as_ref().map(format_time)));
        if let Some(limit) = query.limit {
            params.push(Value::Integer(limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_sale(row)?);
        }
        Ok(entries)
    }

    fn sale_by_payment_key(&self, key: &str) -> LedgerResult<Option<SalesEntry>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM sales_entries WHERE tenant = ?1 AND payment_key = ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![self.tenant_key(), key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_sale(row)?)),
            None => Ok(None),
        }
    }

    fn latest_sale_sequence(&self) -> LedgerResult<Option<u64>> {
        let conn = self.connect()?;
        let seq: Option<Option<i64>> = conn
            .query_row(
                "SELECT MAX(sequence) FROM sales_entries WHERE tenant = ?1",
                params![self.tenant_key()],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?;
        Ok(seq.flatten().map(|value| value as u64))
    }

    fn commit(&self, writes: &[LedgerWrite]) -> LedgerResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for write in writes {
            self.apply_write(&tx, write)?;
        }
        tx.commit()?;
        debug!(
            tenant = %self.tenant,
            writes = writes.len(),
            kinds = ?writes.iter().map(LedgerWrite::kind).collect::<Vec<_>>(),
            "committed ledger batch to sqlite"
        );
        Ok(())
    }
}

fn ensure_customer(conn: &Connection, tenant: &str, customer_id: CustomerId) -> LedgerResult<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM customers WHERE tenant = ?1 AND customer_id = ?2",
            params![tenant, customer_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    exists
        .map(|_| ())
        .ok_or(LedgerError::CustomerNotFound(customer_id))
}

fn format_time(ts: &DateTime<Utc>) -> String {
    // Fixed-width UTC timestamps keep lexical and chronological order identical.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn optional_text(value: Option<String>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn optional_int(value: Option<u64>) -> Value {
    value
        .map(|v| Value::Integer(v as i64))
        .unwrap_or(Value::Null)
}

fn parse_time(value: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| LedgerError::Serialization(format!("invalid timestamp {value}: {err}")))
}

fn parse_decimal(value: &str) -> LedgerResult<Decimal> {
    Decimal::from_str(value)
        .map_err(|err| LedgerError::Serialization(format!("invalid decimal {value}: {err}")))
}

fn parse_id<T: FromStr<Err = String>>(value: &str) -> LedgerResult<T> {
    T::from_str(value).map_err(LedgerError::Serialization)
}

fn row_to_customer(row: &rusqlite::Row<'_>) -> LedgerResult<Customer> {
    let id: String = row.get(0)?;
    let total_due: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(Customer {
        id: parse_id(&id)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        phone: row.get(3)?,
        address: row.get(4)?,
        total_due: parse_decimal(&total_due)?,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
    })
}

fn row_to_record(row: &rusqlite::Row<'_>) -> LedgerResult<BakiRecord> {
    let customer_id: String = row.get(0)?;
    let record_id: String = row.get(1)?;
    let quantity: String = row.get(3)?;
    let amount: String = row.get(4)?;
    let paid_amount: String = row.get(5)?;
    let status: String = row.get(6)?;
    let taken_date: String = row.get(7)?;
    let promise_date: Option<String> = row.get(8)?;
    let updated_at: String = row.get(10)?;
    Ok(BakiRecord {
        id: parse_id(&record_id)?,
        customer_id: parse_id(&customer_id)?,
        product_name: row.get(2)?,
        quantity: parse_decimal(&quantity)?,
        amount: parse_decimal(&amount)?,
        paid_amount: parse_decimal(&paid_amount)?,
        status: BakiStatus::from_str(&status).map_err(LedgerError::Serialization)?,
        taken_date: parse_time(&taken_date)?,
        promise_date: promise_date.as_deref().map(parse_time).transpose()?,
        note: row.get(9)?,
        updated_at: parse_time(&updated_at)?,
    })
}

fn row_to_sale(row: &rusqlite::Row<'_>) -> LedgerResult<SalesEntry> {
    let sequence: i64 = row.get(0)?;
    let entry_id: String = row.get(1)?;
    let timestamp: String = row.get(2)?;
    let total: String = row.get(3)?;
    let profit: String = row.get(4)?;
    let customer_id: Option<String> = row.get(7)?;
    let record_id: Option<String> = row.get(8)?;
    Ok(SalesEntry {
        id: parse_id::<SaleId>(&entry_id)?,
        sequence: sequence as u64,
        timestamp: parse_time(&timestamp)?,
        total: parse_decimal(&total)?,
        profit: parse_decimal(&profit)?,
        is_baki_payment: row.get(5)?,
        baki_product_name: row.get(6)?,
        customer_id: customer_id.as_deref().map(parse_id).transpose()?,
        record_id: record_id.as_deref().map(parse_id).transpose()?,
        payment_key: row.get(9)?,
    })
}
