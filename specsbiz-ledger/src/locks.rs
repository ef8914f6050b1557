use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use specsbiz_core::CustomerId;

/// Keyed single-writer locks: every mutation of a customer's ledger holds that
/// customer's lock from the authoritative read to the commit.
#[derive(Debug, Default)]
pub(crate) struct CustomerLocks {
    inner: Mutex<HashMap<CustomerId, Arc<Mutex<()>>>>,
}

impl CustomerLocks {
    /// Handle for the customer's lock; callers `lock()` it for the critical section.
    pub(crate) fn handle(&self, id: CustomerId) -> Arc<Mutex<()>> {
        self.inner.lock().entry(id).or_default().clone()
    }

    pub(crate) fn forget(&self, id: CustomerId) {
        self.inner.lock().remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_customer_shares_one_lock() {
        let locks = CustomerLocks::default();
        let id = CustomerId::new();
        let first = locks.handle(id);
        let second = locks.handle(id);
        assert!(Arc::ptr_eq(&first, &second));
        let _guard = first.lock();
        assert!(second.try_lock().is_none());
        assert!(locks.handle(CustomerId::new()).try_lock().is_some());
    }

    #[test]
    fn forgotten_customers_release_their_slot() {
        let locks = CustomerLocks::default();
        let id = CustomerId::new();
        locks.handle(id);
        locks.forget(id);
        assert_eq!(locks.len(), 0);
    }
}
