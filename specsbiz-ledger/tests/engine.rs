use std::sync::Arc;
use std::thread;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use specsbiz_core::{BakiAmendment, BakiLineItem, BakiStatus, CustomerId, CustomerProfile, TenantId};
use specsbiz_ledger::{
    LedgerEngine, LedgerError, LedgerStore, LedgerWrite, LocalLedgerStore, Payment,
    ReconcileMode, SalesQuery, SqliteLedgerStore,
};
use tempfile::TempDir;

fn sqlite_engine() -> (TempDir, LedgerEngine) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteLedgerStore::new(dir.path().join("ledger.db"), TenantId::default()).unwrap();
    (dir, LedgerEngine::new(Arc::new(store)))
}

fn local_engine() -> (TempDir, LedgerEngine) {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalLedgerStore::open(dir.path().join("slots"), TenantId::default()).unwrap();
    (dir, LedgerEngine::new(Arc::new(store)))
}

fn new_customer(engine: &LedgerEngine, name: &str) -> CustomerId {
    engine
        .create_customer(CustomerProfile::new(name))
        .unwrap()
        .id
}

fn total_due(engine: &LedgerEngine, customer: CustomerId) -> Decimal {
    engine.customer(customer).unwrap().unwrap().total_due
}

fn item(amount: Decimal) -> BakiLineItem {
    BakiLineItem::new("Rice", dec!(5), amount)
}

/// Every scenario runs against both store implementations.
macro_rules! engine_suite {
    ($suite:ident, $make:ident) => {
        mod $suite {
            use super::*;

            #[test]
            fn rahim_pays_off_in_two_instalments() {
                let (_dir, engine) = $make();
                let rahim = new_customer(&engine, "Rahim");
                assert_eq!(total_due(&engine, rahim), Decimal::ZERO);

                let record = engine.add_baki_record(rahim, item(dec!(1000))).unwrap();
                assert_eq!(total_due(&engine, rahim), dec!(1000));
                assert_eq!(record.status, BakiStatus::Pending);

                let first = engine
                    .pay_baki_record(rahim, record.id, Payment::new(dec!(400)))
                    .unwrap();
                assert_eq!(first.record.paid_amount, dec!(400));
                assert_eq!(first.record.status, BakiStatus::Pending);
                assert_eq!(total_due(&engine, rahim), dec!(600));
                let sales = engine.sales(SalesQuery::default()).unwrap();
                assert_eq!(sales.len(), 1);
                assert_eq!(sales[0].total, dec!(400));
                assert!(sales[0].is_baki_payment);
                assert_eq!(sales[0].profit, Decimal::ZERO);
                assert_eq!(sales[0].baki_product_name.as_deref(), Some("Rice"));

                let second = engine
                    .pay_baki_record(rahim, record.id, Payment::new(dec!(600)))
                    .unwrap();
                assert_eq!(second.record.paid_amount, dec!(1000));
                assert_eq!(second.record.status, BakiStatus::Paid);
                assert_eq!(total_due(&engine, rahim), Decimal::ZERO);
                assert_eq!(second.sale.sequence, 2);
            }

            #[test]
            fn amendment_shifts_balance_by_difference() {
                let (_dir, engine) = $make();
                let customer = new_customer(&engine, "Karim");
                let record = engine.add_baki_record(customer, item(dec!(1000))).unwrap();
                let amended = engine
                    .amend_baki_record(customer, record.id, BakiAmendment::amount(dec!(1200)))
                    .unwrap();
                assert_eq!(amended.amount, dec!(1200));
                assert_eq!(total_due(&engine, customer), dec!(1200));
            }

            #[test]
            fn amendment_below_paid_amount_is_rejected() {
                let (_dir, engine) = $make();
                let customer = new_customer(&engine, "Karim");
                let record = engine.add_baki_record(customer, item(dec!(500))).unwrap();
                engine
                    .pay_baki_record(customer, record.id, Payment::new(dec!(300)))
                    .unwrap();
                let err = engine
                    .amend_baki_record(customer, record.id, BakiAmendment::amount(dec!(200)))
                    .unwrap_err();
                assert!(matches!(err, LedgerError::Validation(_)));
                assert_eq!(total_due(&engine, customer), dec!(200));
            }

            #[test]
            fn deletion_removes_only_the_remaining_balance() {
                let (_dir, engine) = $make();
                let customer = new_customer(&engine, "Salma");
                let keep = engine.add_baki_record(customer, item(dec!(250))).unwrap();
                let record = engine.add_baki_record(customer, item(dec!(500))).unwrap();
                engine
                    .pay_baki_record(customer, record.id, Payment::new(dec!(200)))
                    .unwrap();
                assert_eq!(total_due(&engine, customer), dec!(550));

                let removed = engine.delete_baki_record(customer, record.id).unwrap();
                assert_eq!(removed.outstanding(), dec!(300));
                assert_eq!(total_due(&engine, customer), dec!(250));
                let remaining = engine.records(customer).unwrap();
                assert_eq!(remaining.len(), 1);
                assert_eq!(remaining[0].id, keep.id);
            }

            #[test]
            fn non_positive_amounts_are_rejected() {
                let (_dir, engine) = $make();
                let customer = new_customer(&engine, "Nadia");
                let err = engine.add_baki_record(customer, item(dec!(0))).unwrap_err();
                assert!(matches!(err, LedgerError::Validation(_)));
                let err = engine
                    .add_baki_record(customer, BakiLineItem::new("  ", dec!(1), dec!(10)))
                    .unwrap_err();
                assert!(matches!(err, LedgerError::Validation(_)));
                assert!(engine.records(customer).unwrap().is_empty());
                assert_eq!(total_due(&engine, customer), Decimal::ZERO);
            }

            #[test]
            fn balance_overflow_is_rejected_without_side_effects() {
                let (_dir, engine) = $make();
                let customer = new_customer(&engine, "Jamal");
                let gold = BakiLineItem::new("Gold", dec!(1), Decimal::MAX);
                let first = engine.add_baki_record(customer, gold.clone()).unwrap();

                let err = engine.add_baki_record(customer, gold).unwrap_err();
                assert!(matches!(err, LedgerError::Validation(_)));
                assert!(err.is_rejection());
                assert_eq!(total_due(&engine, customer), Decimal::MAX);
                assert_eq!(engine.records(customer).unwrap().len(), 1);

                engine
                    .amend_baki_record(customer, first.id, BakiAmendment::amount(dec!(1)))
                    .unwrap();
                engine.add_baki_record(customer, item(dec!(1))).unwrap();
                assert_eq!(total_due(&engine, customer), dec!(2));
                assert!(engine.reconcile(ReconcileMode::Report).unwrap().is_clean());
            }

            #[test]
            fn tenant_totals_beyond_decimal_range_are_an_error() {
                let (_dir, engine) = $make();
                for name in ["Jamal", "Kamal"] {
                    let customer = new_customer(&engine, name);
                    engine.add_baki_record(customer, item(Decimal::MAX)).unwrap();
                }
                let err = engine.outstanding_total().unwrap_err();
                assert!(matches!(err, LedgerError::InvalidState(_)));
                assert!(engine.aging_report(chrono::Utc::now()).is_err());
            }

            #[test]
            fn overpayment_is_rejected_without_side_effects() {
                let (_dir, engine) = $make();
                let customer = new_customer(&engine, "Rahim");
                let record = engine.add_baki_record(customer, item(dec!(300))).unwrap();
                let err = engine
                    .pay_baki_record(customer, record.id, Payment::new(dec!(301)))
                    .unwrap_err();
                match err {
                    LedgerError::Overpayment {
                        requested,
                        outstanding,
                    } => {
                        assert_eq!(requested, dec!(301));
                        assert_eq!(outstanding, dec!(300));
                    }
                    other => panic!("unexpected error {other}"),
                }
                let err = engine
                    .pay_baki_record(customer, record.id, Payment::new(dec!(-5)))
                    .unwrap_err();
                assert!(matches!(err, LedgerError::Validation(_)));
                assert!(engine.sales(SalesQuery::default()).unwrap().is_empty());
                assert_eq!(total_due(&engine, customer), dec!(300));
            }

            #[test]
            fn paid_records_accept_no_further_payment() {
                let (_dir, engine) = $make();
                let customer = new_customer(&engine, "Rahim");
                let record = engine.add_baki_record(customer, item(dec!(100))).unwrap();
                engine
                    .pay_baki_record(customer, record.id, Payment::new(dec!(100)))
                    .unwrap();
                let err = engine
                    .pay_baki_record(customer, record.id, Payment::new(dec!(1)))
                    .unwrap_err();
                assert!(matches!(err, LedgerError::Overpayment { .. }));
            }

            #[test]
            fn replayed_payment_key_applies_once() {
                let (_dir, engine) = $make();
                let customer = new_customer(&engine, "Rahim");
                let record = engine.add_baki_record(customer, item(dec!(1000))).unwrap();
                let payment = Payment::new(dec!(300)).with_key("till-7-0042");
                let first = engine
                    .pay_baki_record(customer, record.id, payment.clone())
                    .unwrap();
                let second = engine.pay_baki_record(customer, record.id, payment).unwrap();
                assert!(!first.replayed);
                assert!(second.replayed);
                assert_eq!(second.sale.id, first.sale.id);
                assert_eq!(second.record.paid_amount, dec!(300));
                assert_eq!(total_due(&engine, customer), dec!(700));
                assert_eq!(engine.sales(SalesQuery::default()).unwrap().len(), 1);
            }

            #[test]
            fn payment_key_cannot_be_reused_across_records() {
                let (_dir, engine) = $make();
                let customer = new_customer(&engine, "Rahim");
                let first = engine.add_baki_record(customer, item(dec!(100))).unwrap();
                let second = engine.add_baki_record(customer, item(dec!(100))).unwrap();
                engine
                    .pay_baki_record(customer, first.id, Payment::new(dec!(10)).with_key("k1"))
                    .unwrap();
                let err = engine
                    .pay_baki_record(customer, second.id, Payment::new(dec!(10)).with_key("k1"))
                    .unwrap_err();
                assert!(matches!(err, LedgerError::Validation(_)));
            }

            #[test]
            fn concurrent_payments_are_not_lost() {
                let (_dir, engine) = $make();
                let engine = Arc::new(engine);
                let customer = new_customer(&engine, "Rahim");
                let record_id = engine.add_baki_record(customer, item(dec!(1000))).unwrap().id;

                thread::scope(|scope| {
                    for _ in 0..2 {
                        let engine = Arc::clone(&engine);
                        scope.spawn(move || {
                            engine
                                .pay_baki_record(customer, record_id, Payment::new(dec!(300)))
                                .unwrap();
                        });
                    }
                });

                let stored = engine.record(customer, record_id).unwrap().unwrap();
                assert_eq!(stored.paid_amount, dec!(600));
                assert_eq!(total_due(&engine, customer), dec!(400));
                assert_eq!(engine.sales(SalesQuery::default()).unwrap().len(), 2);
            }

            #[test]
            fn concurrent_mixed_mutations_keep_balance_consistent() {
                let (_dir, engine) = $make();
                let engine = Arc::new(engine);
                let customer = new_customer(&engine, "Rahim");

                thread::scope(|scope| {
                    for worker in 0..4 {
                        let engine = Arc::clone(&engine);
                        scope.spawn(move || {
                            for step in 0..5 {
                                let amount = Decimal::from(100 + worker * 10 + step);
                                let record = engine.add_baki_record(customer, item(amount)).unwrap();
                                engine
                                    .pay_baki_record(customer, record.id, Payment::new(dec!(50)))
                                    .unwrap();
                                if step % 2 == 0 {
                                    engine.delete_baki_record(customer, record.id).unwrap();
                                }
                            }
                        });
                    }
                });

                let report = engine.reconcile(ReconcileMode::Report).unwrap();
                assert!(report.is_clean(), "{:?}", report.balance_diff);
                let expected: Decimal = engine
                    .records(customer)
                    .unwrap()
                    .iter()
                    .map(|r| r.outstanding())
                    .sum();
                assert_eq!(total_due(&engine, customer), expected);
            }

            #[test]
            fn profile_edits_do_not_touch_balance() {
                let (_dir, engine) = $make();
                let customer = new_customer(&engine, "Rahim");
                engine.add_baki_record(customer, item(dec!(450))).unwrap();
                let updated = engine
                    .update_customer(
                        customer,
                        CustomerProfile::new("Rahim").with_phone("01711-000000"),
                    )
                    .unwrap();
                assert_eq!(updated.phone, "01711-000000");
                assert_eq!(total_due(&engine, customer), dec!(450));
                let err = engine
                    .update_customer(customer, CustomerProfile::new(""))
                    .unwrap_err();
                assert!(matches!(err, LedgerError::Validation(_)));
            }

            #[test]
            fn deleting_customer_cascades_to_records() {
                let (_dir, engine) = $make();
                let customer = new_customer(&engine, "Rahim");
                let other = new_customer(&engine, "Abdul");
                let record = engine.add_baki_record(customer, item(dec!(100))).unwrap();
                engine.add_baki_record(customer, item(dec!(200))).unwrap();
                engine.add_baki_record(other, item(dec!(80))).unwrap();
                engine
                    .pay_baki_record(customer, record.id, Payment::new(dec!(40)))
                    .unwrap();

                assert_eq!(engine.delete_customer(customer).unwrap(), 2);
                assert!(engine.customer(customer).unwrap().is_none());
                assert!(engine.records(customer).unwrap().is_empty());
                assert_eq!(engine.records(other).unwrap().len(), 1);
                assert_eq!(engine.sales(SalesQuery::default()).unwrap().len(), 1);
                assert!(matches!(
                    engine.delete_customer(customer).unwrap_err(),
                    LedgerError::CustomerNotFound(_)
                ));
            }

            #[test]
            fn unknown_targets_are_reported() {
                let (_dir, engine) = $make();
                let missing = CustomerId::new();
                assert!(matches!(
                    engine.add_baki_record(missing, item(dec!(10))).unwrap_err(),
                    LedgerError::CustomerNotFound(_)
                ));
                let customer = new_customer(&engine, "Rahim");
                let record = engine.add_baki_record(customer, item(dec!(10))).unwrap();
                engine.delete_baki_record(customer, record.id).unwrap();
                assert!(matches!(
                    engine.delete_baki_record(customer, record.id).unwrap_err(),
                    LedgerError::RecordNotFound { .. }
                ));
            }

            #[test]
            fn reconcile_heals_drifted_balance() {
                let (_dir, engine) = $make();
                let customer = new_customer(&engine, "Rahim");
                engine.add_baki_record(customer, item(dec!(700))).unwrap();
                engine
                    .store()
                    .apply(LedgerWrite::AdjustTotalDue {
                        customer_id: customer,
                        delta: dec!(55),
                    })
                    .unwrap();

                let report = engine.reconcile(ReconcileMode::Report).unwrap();
                assert_eq!(report.balance_diff.len(), 1);
                assert_eq!(report.balance_diff[0].delta, dec!(55));
                assert_eq!(total_due(&engine, customer), dec!(755));

                let healed = engine.reconcile(ReconcileMode::Heal).unwrap();
                assert_eq!(healed.healed, vec![customer]);
                assert_eq!(total_due(&engine, customer), dec!(700));
                assert!(engine.reconcile(ReconcileMode::Report).unwrap().is_clean());
            }

            #[test]
            fn customers_list_by_first_name_and_records_newest_first() {
                let (_dir, engine) = $make();
                new_customer(&engine, "salma");
                let abdul = new_customer(&engine, "Abdul");
                new_customer(&engine, "Karim");
                let names: Vec<String> = engine
                    .customers()
                    .unwrap()
                    .into_iter()
                    .map(|c| c.first_name)
                    .collect();
                assert_eq!(names, vec!["Abdul", "Karim", "salma"]);

                let older = engine.add_baki_record(abdul, item(dec!(10))).unwrap();
                thread::sleep(std::time::Duration::from_millis(5));
                let newer = engine.add_baki_record(abdul, item(dec!(20))).unwrap();
                let records = engine.records(abdul).unwrap();
                assert_eq!(records[0].id, newer.id);
                assert_eq!(records[1].id, older.id);
                assert_eq!(engine.outstanding_total().unwrap(), dec!(30));
            }
        }
    };
}

engine_suite!(sqlite, sqlite_engine);
engine_suite!(local, local_engine);

#[test]
fn in_memory_store_supports_the_full_flow() {
    let engine = LedgerEngine::new(Arc::new(LocalLedgerStore::in_memory(TenantId::default())));
    let customer = new_customer(&engine, "Rahim");
    let record = engine.add_baki_record(customer, item(dec!(90))).unwrap();
    engine
        .pay_baki_record(customer, record.id, Payment::new(dec!(90)))
        .unwrap();
    assert!(engine.record(customer, record.id).unwrap().unwrap().is_paid());
    assert_eq!(engine.store().latest_sale_sequence().unwrap(), Some(1));
}
