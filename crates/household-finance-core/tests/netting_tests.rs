use std::sync::Arc;

use household_finance_core::config::StoreConfig;
use household_finance_core::netting::service::{DebtFilter, DebtSpec};
use household_finance_core::netting::{DebtStatus, ExpenseService};
use household_finance_core::persons::Person;
use household_finance_core::store::lock::LockRegistry;
use household_finance_core::store::memory::MemoryStore;
use household_finance_core::store::TabularStore;
use household_finance_core::types::Money;
use household_finance_core::LedgerError;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

fn service() -> ExpenseService {
    let store = Arc::new(MemoryStore::new());
    let locks = Arc::new(LockRegistry::new());
    ExpenseService::new(
        store as Arc<dyn TabularStore>,
        locks,
        StoreConfig::default(),
    )
    .unwrap()
}

fn add_person(service: &ExpenseService, id: &str, name: &str) {
    service
        .persons()
        .save(Person {
            id: id.to_string(),
            name: name.to_string(),
            active: true,
        })
        .unwrap();
}

fn add_debt(service: &ExpenseService, debtor: &str, creditor: &str, amount: Money, date: &str) -> String {
    service
        .save_debt(DebtSpec {
            debtor_id: Some(debtor.to_string()),
            creditor_id: Some(creditor.to_string()),
            amount,
            date: Some(date.to_string()),
            kind: Some("groceries".to_string()),
            ..Default::default()
        })
        .unwrap()
        .id
}

// ===========================================================================
// Debt CRUD and derived status
// ===========================================================================

#[test]
fn test_debt_lifecycle_pending_partial_paid() {
    let service = service();
    add_person(&service, "a", "Ana");
    add_person(&service, "b", "Beto");
    let id = add_debt(&service, "a", "b", dec!(100), "2024-03-01");

    let views = service.list_debts(&DebtFilter::default()).unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].status, DebtStatus::Pending);
    assert_eq!(views[0].pending, dec!(100));

    service
        .record_payment(&id, dec!(40), Some("2024-03-05"), None, None)
        .unwrap();
    let views = service.list_debts(&DebtFilter::default()).unwrap();
    assert_eq!(views[0].status, DebtStatus::Partial);
    assert_eq!(views[0].paid, dec!(40));
    assert_eq!(views[0].pending, dec!(60));

    service
        .record_payment(&id, dec!(60), Some("2024-03-09"), None, None)
        .unwrap();
    let views = service.list_debts(&DebtFilter::default()).unwrap();
    assert_eq!(views[0].status, DebtStatus::Paid);
    assert_eq!(views[0].pending, dec!(0));
}

#[test]
fn test_debt_validation_and_not_found() {
    let service = service();
    add_person(&service, "a", "Ana");
    add_person(&service, "b", "Beto");

    let err = service
        .save_debt(DebtSpec {
            debtor_id: Some("a".into()),
            creditor_id: Some("b".into()),
            amount: dec!(0),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));

    let err = service
        .save_debt(DebtSpec {
            debtor_id: Some("a".into()),
            creditor_id: Some("a".into()),
            amount: dec!(10),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));

    let err = service
        .record_payment("missing-debt", dec!(10), None, None, None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[test]
fn test_unattributed_debtor_resolves_to_synthetic_identity() {
    let service = service();
    add_person(&service, "b", "Beto");

    // Historical row: a name with no id. It must aggregate, not vanish.
    service
        .save_debt(DebtSpec {
            debtor_name: Some("María José".into()),
            creditor_id: Some("b".into()),
            amount: dec!(80),
            ..Default::default()
        })
        .unwrap();

    let views = service.list_debts(&DebtFilter::default()).unwrap();
    assert_eq!(views[0].debt.debtor_id, "name:maria jose");

    let balance = service.balance_per_person(&DebtFilter::default()).unwrap();
    let synthetic = balance
        .iter()
        .find(|r| r.person_id == "name:maria jose")
        .unwrap();
    assert_eq!(synthetic.net, dec!(-80));
}

#[test]
fn test_filters_by_window_status_and_person() {
    let service = service();
    add_person(&service, "a", "Ana");
    add_person(&service, "b", "Beto");
    add_person(&service, "c", "Carla");
    add_debt(&service, "a", "b", dec!(100), "2024-02-15");
    add_debt(&service, "c", "b", dec!(50), "2024-03-02");

    let feb = service
        .list_debts(&DebtFilter {
            period: Some("2024-02".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(feb.len(), 1);
    assert_eq!(feb[0].debt.debtor_id, "a");

    let carla = service
        .list_debts(&DebtFilter {
            person_id: Some("c".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(carla.len(), 1);

    let paid_only = service
        .list_debts(&DebtFilter {
            status: Some("paid".into()),
            ..Default::default()
        })
        .unwrap();
    assert!(paid_only.is_empty());

    let err = service
        .list_debts(&DebtFilter {
            from: Some("2024-03-10".into()),
            to: Some("2024-03-01".into()),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
}

// ===========================================================================
// Netting: balances, plan, dashboard
// ===========================================================================

#[test]
fn test_single_creditor_settlement_example() {
    // A owes B 100, C owes B 50 and nothing is paid: net(A) = -100,
    // net(C) = -50, net(B) = +150, plan = A->B 100 and C->B 50.
    let service = service();
    add_person(&service, "a", "Ana");
    add_person(&service, "b", "Beto");
    add_person(&service, "c", "Carla");
    add_debt(&service, "a", "b", dec!(100), "2024-03-01");
    add_debt(&service, "c", "b", dec!(50), "2024-03-02");

    let balance = service.balance_per_person(&DebtFilter::default()).unwrap();
    let net_of = |id: &str| balance.iter().find(|r| r.person_id == id).unwrap().net;
    assert_eq!(net_of("a"), dec!(-100));
    assert_eq!(net_of("b"), dec!(150));
    assert_eq!(net_of("c"), dec!(-50));
    // Sorted net desc: Beto first.
    assert_eq!(balance[0].person_id, "b");

    let report = service
        .compute_settlement_plan(&DebtFilter::default())
        .unwrap();
    assert_eq!(report.plan.transfers.len(), 2);
    assert!(!report.plan.truncated);
    assert_eq!(report.plan.total, dec!(150));
    assert!(report.plan.transfers.iter().all(|t| t.to_person_id == "b"));
    assert_eq!(report.plan.transfers[0].amount, dec!(100));
    assert_eq!(report.plan.transfers[0].from_person_id, "a");
    assert_eq!(report.plan.transfers[1].amount, dec!(50));
}

#[test]
fn test_partial_payments_shrink_net_positions() {
    let service = service();
    add_person(&service, "a", "Ana");
    add_person(&service, "b", "Beto");
    let id = add_debt(&service, "a", "b", dec!(100), "2024-03-01");
    service
        .record_payment(&id, dec!(40), Some("2024-03-05"), None, None)
        .unwrap();

    let balance = service.balance_per_person(&DebtFilter::default()).unwrap();
    let ana = balance.iter().find(|r| r.person_id == "a").unwrap();
    assert_eq!(ana.as_debtor, dec!(60));
    assert_eq!(ana.payments_made, dec!(40));
    assert_eq!(ana.net, dec!(-60));

    let report = service
        .compute_settlement_plan(&DebtFilter::default())
        .unwrap();
    assert_eq!(report.plan.transfers.len(), 1);
    assert_eq!(report.plan.transfers[0].amount, dec!(60));
}

#[test]
fn test_settlement_plan_person_filter_keeps_touching_transfers() {
    let service = service();
    add_person(&service, "a", "Ana");
    add_person(&service, "b", "Beto");
    add_person(&service, "c", "Carla");
    add_person(&service, "d", "Dario");
    add_debt(&service, "a", "b", dec!(100), "2024-03-01");
    add_debt(&service, "c", "d", dec!(70), "2024-03-02");

    let report = service
        .compute_settlement_plan(&DebtFilter {
            person_id: Some("c".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(report.plan.transfers.len(), 1);
    assert_eq!(report.plan.transfers[0].from_person_id, "c");
    assert_eq!(report.plan.total, dec!(70));
}

#[test]
fn test_dashboard_cards_match_the_listing() {
    let service = service();
    add_person(&service, "a", "Ana");
    add_person(&service, "b", "Beto");
    add_person(&service, "c", "Carla");
    let id = add_debt(&service, "a", "b", dec!(100), "2024-03-01");
    add_debt(&service, "c", "b", dec!(50), "2024-03-15");
    service
        .record_payment(&id, dec!(40), Some("2024-03-20"), None, None)
        .unwrap();

    let filter = DebtFilter {
        period: Some("2024-03".into()),
        ..Default::default()
    };
    let summary = service.dashboard(&filter).unwrap();
    assert_eq!(summary.cards.total_amount, dec!(150));
    assert_eq!(summary.cards.total_paid, dec!(40));
    assert_eq!(summary.cards.total_pending, dec!(110));
    assert_eq!(summary.cards.creditor_count, 1);
    assert_eq!(summary.cards.creditor_amount, dec!(110));
    assert_eq!(summary.cards.debtor_count, 2);
    assert_eq!(summary.cards.debtor_amount, dec!(110));
    assert_eq!(summary.window.from, "2024-03-01");
    assert_eq!(summary.window.to, "2024-03-31");

    // Cards agree with the filtered listing.
    let views = service.list_debts(&filter).unwrap();
    let amount: Money = views.iter().map(|v| v.debt.amount).sum();
    let pending: Money = views.iter().map(|v| v.pending).sum();
    assert_eq!(summary.cards.total_amount, amount);
    assert_eq!(summary.cards.total_pending, pending);
}

#[test]
fn test_directory_persons_appear_with_zero_balances() {
    let service = service();
    add_person(&service, "a", "Ana");
    add_person(&service, "zz", "Zoe");
    add_person(&service, "b", "Beto");
    add_debt(&service, "a", "b", dec!(10), "2024-03-01");

    let balance = service.balance_per_person(&DebtFilter::default()).unwrap();
    let zoe = balance.iter().find(|r| r.person_id == "zz").unwrap();
    assert_eq!(zoe.net, dec!(0));
    assert_eq!(zoe.as_debtor, dec!(0));
}

#[test]
fn test_delete_debt_removes_its_payments() {
    let service = service();
    add_person(&service, "a", "Ana");
    add_person(&service, "b", "Beto");
    let id = add_debt(&service, "a", "b", dec!(100), "2024-03-01");
    service
        .record_payment(&id, dec!(25), Some("2024-03-02"), None, None)
        .unwrap();

    service.delete_debt(&id).unwrap();
    assert!(service.list_debts(&DebtFilter::default()).unwrap().is_empty());

    let balance = service.balance_per_person(&DebtFilter::default()).unwrap();
    assert!(balance.iter().all(|r| r.net == dec!(0)));
}
