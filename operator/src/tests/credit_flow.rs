use crate::monitor::CreditMonitor;
use crate::store::CreditState;
use crate::store::CreditStatus;
use crate::store::InvoiceRecord;
use crate::store::MonitorState;
use crate::store::Store;
use crate::tests::mocks::test_gateway;
use crate::tests::mocks::MockChain;
use crate::tests::mocks::MockLn;
use cln_bridge::Invoice;
use cln_bridge::InvoiceStatus;
use cln_bridge::MsatAmount;
use escrow_vault::U256;
use std::sync::Arc;
use std::time::Duration;

const NOW: u64 = 1_700_000_000;

fn monitor(ln: Arc<MockLn>, chain: Arc<MockChain>, store: Arc<Store>) -> CreditMonitor {
    CreditMonitor::new(
        ln,
        test_gateway(chain),
        store,
        Duration::from_secs(15),
        Duration::from_secs(60),
        Duration::from_secs(300),
    )
}

fn stored_invoice(label: &str, credit_address: &str) -> InvoiceRecord {
    InvoiceRecord {
        label: label.to_string(),
        user_id_b64: "dXNlcg==".to_string(),
        credit_address: credit_address.to_string(),
        amount_sats: None,
        amount_msat: None,
        bolt11: "lnbc-credit".to_string(),
        status: "unpaid".to_string(),
        payment_hash: None,
        description: None,
        paid_at: None,
        created_at: NOW - 100,
        monitor: MonitorState::default(),
        credit: CreditState::default(),
    }
}

fn node_paid_invoice(label: &str, amount_msat: u64) -> Invoice {
    Invoice {
        label: label.to_string(),
        status: InvoiceStatus::Paid,
        amount_msat: Some(MsatAmount::from_msat(amount_msat)),
        amount_received_msat: Some(MsatAmount::from_msat(amount_msat)),
        paid_msat: None,
        payment_hash: Some("00AB".repeat(16)),
        payment_preimage: None,
        paid_at: Some(NOW - 10),
        bolt11: Some("lnbc-credit".to_string()),
    }
}

#[tokio::test]
async fn paid_invoices_get_credited_once() {
    let ln = Arc::new(MockLn::default());
    ln.invoices_by_label
        .lock()
        .insert("credit-1".to_string(), node_paid_invoice("credit-1", 5_000_000));
    let chain = Arc::new(MockChain::succeeding());
    let (_dir, store) = crate::tests::mocks::test_store();
    store
        .insert_invoice(stored_invoice("credit-1", "0x505"))
        .unwrap();
    let monitor = monitor(ln.clone(), chain.clone(), store.clone());

    monitor.tick(NOW).await;

    let record = store.get_invoice("credit-1").unwrap();
    assert_eq!(record.status, "paid");
    assert_eq!(record.paid_at, Some(NOW - 10));
    assert_eq!(record.amount_sats, Some(5_000));
    // The node hash is copied in lowercased.
    assert_eq!(record.payment_hash.as_deref(), Some("00ab".repeat(16).as_str()));
    assert_eq!(record.monitor.cln_status.as_deref(), Some("paid"));
    assert_eq!(record.monitor.last_checked_at, Some(NOW));

    assert_eq!(record.credit.status, CreditStatus::Credited);
    assert_eq!(record.credit.attempts, 1);
    assert_eq!(record.credit.tx_hash.as_deref(), Some("0xtx1"));
    assert_eq!(record.credit.amount_units, Some(U256::from(5_000u64)));
    assert!(record.credit.credited_at.is_some());

    let (calls, _) = chain.invokes.lock()[0].clone();
    assert_eq!(calls[0].entry_point, "transfer");
    assert_eq!(calls[0].calldata[0], "0x505");

    // Credited is absorbing: another tick moves nothing.
    monitor.tick(NOW + 15).await;
    assert_eq!(chain.invokes.lock().len(), 1);
    assert_eq!(
        store.get_invoice("credit-1").unwrap().credit.attempts,
        1
    );
}

#[tokio::test]
async fn invalid_credit_addresses_fail_with_retry() {
    let ln = Arc::new(MockLn::default());
    ln.invoices_by_label
        .lock()
        .insert("credit-1".to_string(), node_paid_invoice("credit-1", 5_000_000));
    let chain = Arc::new(MockChain::succeeding());
    let (_dir, store) = crate::tests::mocks::test_store();
    store
        .insert_invoice(stored_invoice("credit-1", "not-an-address"))
        .unwrap();
    let monitor = monitor(ln, chain.clone(), store.clone());

    monitor.tick(NOW).await;

    let record = store.get_invoice("credit-1").unwrap();
    assert_eq!(record.credit.status, CreditStatus::Failed);
    assert_eq!(record.credit.last_error.as_deref(), Some("invalid_address"));
    assert_eq!(record.credit.next_retry_at, Some(NOW + 60));
    assert!(chain.invokes.lock().is_empty());

    // Before the retry window nothing happens, after it the address is
    // rechecked.
    monitor.tick(NOW + 30).await;
    assert_eq!(
        store.get_invoice("credit-1").unwrap().credit.next_retry_at,
        Some(NOW + 60)
    );
    monitor.tick(NOW + 61).await;
    assert_eq!(
        store.get_invoice("credit-1").unwrap().credit.next_retry_at,
        Some(NOW + 61 + 60)
    );
}

#[tokio::test]
async fn paid_invoices_without_amounts_fail_with_retry() {
    let ln = Arc::new(MockLn::default());
    let mut invoice = node_paid_invoice("credit-1", 5_000_000);
    invoice.amount_msat = None;
    invoice.amount_received_msat = None;
    ln.invoices_by_label
        .lock()
        .insert("credit-1".to_string(), invoice);
    let chain = Arc::new(MockChain::succeeding());
    let (_dir, store) = crate::tests::mocks::test_store();
    store
        .insert_invoice(stored_invoice("credit-1", "0x505"))
        .unwrap();
    let monitor = monitor(ln, chain.clone(), store.clone());

    monitor.tick(NOW).await;

    let record = store.get_invoice("credit-1").unwrap();
    assert_eq!(record.credit.status, CreditStatus::Failed);
    assert_eq!(record.credit.last_error.as_deref(), Some("missing_amount"));
    assert!(chain.invokes.lock().is_empty());
}

#[tokio::test]
async fn stale_processing_entries_recover_and_reattempt() {
    let ln = Arc::new(MockLn::default());
    let chain = Arc::new(MockChain::succeeding());
    let (_dir, store) = crate::tests::mocks::test_store();
    let mut record = stored_invoice("credit-1", "0x505");
    record.status = "paid".to_string();
    record.amount_sats = Some(5_000);
    record.credit.status = CreditStatus::Processing;
    record.credit.attempts = 1;
    record.credit.last_attempt_at = Some(NOW - 400);
    store.insert_invoice(record).unwrap();
    let monitor = monitor(ln, chain.clone(), store.clone());

    // First tick only recovers the stuck entry.
    monitor.tick(NOW).await;
    let record = store.get_invoice("credit-1").unwrap();
    assert_eq!(record.credit.status, CreditStatus::Pending);
    assert_eq!(
        record.credit.last_error.as_deref(),
        Some("stale_processing")
    );
    assert!(chain.invokes.lock().is_empty());

    // The next tick re-attempts and succeeds.
    monitor.tick(NOW + 15).await;
    let record = store.get_invoice("credit-1").unwrap();
    assert_eq!(record.credit.status, CreditStatus::Credited);
    assert_eq!(record.credit.attempts, 2);
}

#[tokio::test]
async fn recent_processing_entries_are_left_alone() {
    let ln = Arc::new(MockLn::default());
    let chain = Arc::new(MockChain::succeeding());
    let (_dir, store) = crate::tests::mocks::test_store();
    let mut record = stored_invoice("credit-1", "0x505");
    record.status = "paid".to_string();
    record.amount_sats = Some(5_000);
    record.credit.status = CreditStatus::Processing;
    record.credit.last_attempt_at = Some(NOW - 10);
    store.insert_invoice(record).unwrap();
    let monitor = monitor(ln, chain.clone(), store.clone());

    monitor.tick(NOW).await;
    let record = store.get_invoice("credit-1").unwrap();
    assert_eq!(record.credit.status, CreditStatus::Processing);
    assert!(chain.invokes.lock().is_empty());
}

#[tokio::test]
async fn transfer_failures_schedule_a_retry() {
    let ln = Arc::new(MockLn::default());
    ln.invoices_by_label
        .lock()
        .insert("credit-1".to_string(), node_paid_invoice("credit-1", 5_000_000));
    let chain = Arc::new(MockChain::succeeding());
    chain
        .invoke_errors
        .lock()
        .push_back("insufficient max fee".to_string());
    let (_dir, store) = crate::tests::mocks::test_store();
    store
        .insert_invoice(stored_invoice("credit-1", "0x505"))
        .unwrap();
    let monitor = monitor(ln, chain.clone(), store.clone());

    monitor.tick(NOW).await;
    let record = store.get_invoice("credit-1").unwrap();
    assert_eq!(record.credit.status, CreditStatus::Failed);
    assert_eq!(record.credit.attempts, 1);
    assert_eq!(record.credit.next_retry_at, Some(NOW + 60));
    assert!(record.credit.last_error.is_some());

    // Too early: nothing happens.
    monitor.tick(NOW + 30).await;
    assert_eq!(store.get_invoice("credit-1").unwrap().credit.attempts, 1);

    // After the delay the transfer goes through.
    monitor.tick(NOW + 61).await;
    let record = store.get_invoice("credit-1").unwrap();
    assert_eq!(record.credit.status, CreditStatus::Credited);
    assert_eq!(record.credit.attempts, 2);
}

#[tokio::test]
async fn unpaid_invoices_only_update_monitor_bookkeeping() {
    let ln = Arc::new(MockLn::default());
    let mut invoice = node_paid_invoice("credit-1", 5_000_000);
    invoice.status = InvoiceStatus::Unpaid;
    invoice.paid_at = None;
    ln.invoices_by_label
        .lock()
        .insert("credit-1".to_string(), invoice);
    let chain = Arc::new(MockChain::succeeding());
    let (_dir, store) = crate::tests::mocks::test_store();
    store
        .insert_invoice(stored_invoice("credit-1", "0x505"))
        .unwrap();
    let monitor = monitor(ln.clone(), chain.clone(), store.clone());

    monitor.tick(NOW).await;
    let record = store.get_invoice("credit-1").unwrap();
    assert_eq!(record.status, "unpaid");
    assert_eq!(record.monitor.cln_status.as_deref(), Some("unpaid"));
    assert_eq!(record.credit.status, CreditStatus::Pending);
    assert!(chain.invokes.lock().is_empty());
    assert_eq!(ln.label_lookups.lock().as_slice(), ["credit-1".to_string()]);
}
