use serde::{Deserialize, Serialize};
use specsbiz_core::{BakiRecord, Customer, CustomerId, SalesEntry};
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Full customer list for the tenant, ordered by first name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomersEvent {
    pub customers: Vec<Customer>,
}

/// Full record list for one customer, newest taken date first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordsEvent {
    pub customer_id: CustomerId,
    pub records: Vec<BakiRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SaleEvent {
    pub sale: SalesEntry,
}

/// Live query results re-delivered after every committed ledger mutation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Event {
    CustomersChanged(CustomersEvent),
    RecordsChanged(RecordsEvent),
    SaleAppended(SaleEvent),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::CustomersChanged(_) => "customers_changed",
            Event::RecordsChanged(_) => "records_changed",
            Event::SaleAppended(_) => "sale_appended",
        }
    }
}

pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscribers; publishing is skipped entirely when zero.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

pub struct EventStream {
    receiver: broadcast::Receiver<Event>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Result<Event, RecvError> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Event, TryRecvError> {
        self.receiver.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specsbiz_core::CustomerProfile;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(4);
        let mut stream = bus.subscribe();
        let customer = Customer::new(CustomerProfile::new("Rahim"));
        bus.publish(Event::CustomersChanged(CustomersEvent {
            customers: vec![customer.clone()],
        }));
        match stream.recv().await.unwrap() {
            Event::CustomersChanged(event) => assert_eq!(event.customers[0].id, customer.id),
            other => panic!("unexpected event {}", other.kind()),
        }
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let bus = EventBus::new(1);
        assert_eq!(bus.receiver_count(), 0);
        bus.publish(Event::RecordsChanged(RecordsEvent {
            customer_id: CustomerId::new(),
            records: Vec::new(),
        }));
    }
}
