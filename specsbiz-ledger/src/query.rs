use chrono::{DateTime, Utc};
use specsbiz_core::{CustomerId, SalesEntry};

/// Filter describing which sales journal entries to load from storage.
#[derive(Clone, Debug, Default)]
pub struct SalesQuery {
    pub customer: Option<CustomerId>,
    pub baki_payments_only: bool,
    pub start_sequence: Option<u64>,
    pub end_sequence: Option<u64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub ascending: bool,
}

impl SalesQuery {
    pub fn with_customer(mut self, customer: CustomerId) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn baki_payments(mut self) -> Self {
        self.baki_payments_only = true;
        self
    }

    pub fn with_sequence_range(mut self, start: Option<u64>, end: Option<u64>) -> Self {
        self.start_sequence = start;
        self.end_sequence = end;
        self
    }

    pub fn with_time_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn ascending(mut self) -> Self {
        self.ascending = true;
        self
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    /// In-memory evaluation of every filter except ordering and limit.
    pub fn matches(&self, entry: &SalesEntry) -> bool {
        if let Some(customer) = self.customer {
            if entry.customer_id != Some(customer) {
                return false;
            }
        }
        if self.baki_payments_only && !entry.is_baki_payment {
            return false;
        }
        if self.start_sequence.is_some_and(|start| entry.sequence < start) {
            return false;
        }
        if self.end_sequence.is_some_and(|end| entry.sequence > end) {
            return false;
        }
        if self.start_time.is_some_and(|start| entry.timestamp < start) {
            return false;
        }
        if self.end_time.is_some_and(|end| entry.timestamp > end) {
            return false;
        }
        true
    }

    /// Filter, order by sequence and truncate an in-memory journal.
    pub(crate) fn apply(&self, entries: impl IntoIterator<Item = SalesEntry>) -> Vec<SalesEntry> {
        let mut selected: Vec<SalesEntry> =
            entries.into_iter().filter(|entry| self.matches(entry)).collect();
        if self.ascending {
            selected.sort_by_key(|entry| entry.sequence);
        } else {
            selected.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}
