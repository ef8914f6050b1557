use std::sync::Arc;

use rust_decimal_macros::dec;
use specsbiz_core::{BakiLineItem, CustomerProfile, TenantId};
use specsbiz_events::Event;
use specsbiz_ledger::{LedgerEngine, LocalLedgerStore, Payment};

fn engine() -> LedgerEngine {
    LedgerEngine::new(Arc::new(LocalLedgerStore::in_memory(TenantId::default())))
}

#[tokio::test]
async fn mutations_redeliver_full_result_sets() {
    let engine = engine();
    let mut stream = engine.subscribe();

    let customer = engine
        .create_customer(CustomerProfile::new("Rahim"))
        .unwrap();
    match stream.recv().await.unwrap() {
        Event::CustomersChanged(event) => {
            assert_eq!(event.customers.len(), 1);
            assert_eq!(event.customers[0].id, customer.id);
        }
        other => panic!("unexpected event {}", other.kind()),
    }

    let record = engine
        .add_baki_record(customer.id, BakiLineItem::new("Oil", dec!(1), dec!(180)))
        .unwrap();
    match stream.recv().await.unwrap() {
        Event::CustomersChanged(event) => assert_eq!(event.customers[0].total_due, dec!(180)),
        other => panic!("unexpected event {}", other.kind()),
    }
    match stream.recv().await.unwrap() {
        Event::RecordsChanged(event) => {
            assert_eq!(event.customer_id, customer.id);
            assert_eq!(event.records[0].id, record.id);
        }
        other => panic!("unexpected event {}", other.kind()),
    }

    engine
        .pay_baki_record(customer.id, record.id, Payment::new(dec!(80)))
        .unwrap();
    let kinds: Vec<&str> = (0..3)
        .map(|_| stream.try_recv().unwrap().kind())
        .collect();
    assert_eq!(kinds, vec!["customers_changed", "records_changed", "sale_appended"]);
}

#[tokio::test]
async fn rejected_mutations_publish_nothing() {
    let engine = engine();
    let customer = engine
        .create_customer(CustomerProfile::new("Karim"))
        .unwrap();
    let mut stream = engine.subscribe();
    assert!(engine
        .add_baki_record(customer.id, BakiLineItem::new("Oil", dec!(1), dec!(0)))
        .is_err());
    assert!(stream.try_recv().is_err());
}
