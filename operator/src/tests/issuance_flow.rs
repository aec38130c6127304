use crate::issuance;
use crate::issuance::IssueError;
use crate::store::CreditStatus;
use crate::tests::mocks::test_store;
use crate::tests::mocks::MockLn;
use cln_bridge::InvoiceResponse;
use cln_bridge::LnClient;
use std::sync::Arc;

const SECRET: &[u8] = b"0123456789abcdef";

fn ln_with_invoice() -> Arc<MockLn> {
    let ln = Arc::new(MockLn::default());
    *ln.created_invoice.lock() = Some(InvoiceResponse {
        bolt11: "lnbc-issued".to_string(),
        expires_at: 1_700_003_600,
        payment_hash: Some("00AB".repeat(16)),
    });
    ln
}

#[tokio::test]
async fn issues_and_files_a_credit_invoice() {
    let ln = ln_with_invoice();
    let cln: Arc<dyn LnClient> = ln.clone();
    let (_dir, store) = test_store();

    let record =
        issuance::issue_credit_invoice(&store, &cln, SECRET, 3_600, "dXNlcg==", "0x00505", 5_000)
            .await
            .unwrap();

    assert!(record.label.starts_with("credit-"));
    assert_eq!(record.credit_address, "0x505");
    assert_eq!(record.amount_sats, Some(5_000));
    assert_eq!(record.amount_msat, Some(5_000_000));
    assert_eq!(record.bolt11, "lnbc-issued");
    assert_eq!(record.status, "unpaid");
    assert_eq!(record.payment_hash.as_deref(), Some("00ab".repeat(16).as_str()));
    assert_eq!(record.credit.status, CreditStatus::Pending);

    // The node got whole sats and the tagged description.
    let create_calls = ln.create_calls.lock();
    assert_eq!(create_calls.len(), 1);
    assert_eq!(create_calls[0].amount_msat, "5000sat");
    assert_eq!(create_calls[0].expiry, 3_600);
    let expected_tag = issuance::description_tag(SECRET, "dXNlcg==", "0x505");
    assert_eq!(
        create_calls[0].description,
        format!("bridge-credit:0x505:{expected_tag}")
    );

    // The record landed in the store, the address registry too.
    let stored = store.get_invoice(&record.label).unwrap();
    assert_eq!(stored, record);
    assert_eq!(
        store.read(|doc| doc.addresses.get("dXNlcg==").cloned()),
        Some("0x505".to_string())
    );
}

#[tokio::test]
async fn rejects_bad_addresses_and_amounts_without_node_calls() {
    let ln = ln_with_invoice();
    let cln: Arc<dyn LnClient> = ln.clone();
    let (_dir, store) = test_store();

    let err = issuance::issue_credit_invoice(&store, &cln, SECRET, 3_600, "u", "nope", 5_000)
        .await
        .unwrap_err();
    assert!(matches!(err, IssueError::InvalidAddress(_)));

    let err = issuance::issue_credit_invoice(&store, &cln, SECRET, 3_600, "u", "0x0", 5_000)
        .await
        .unwrap_err();
    assert!(matches!(err, IssueError::InvalidAddress(_)));

    let err = issuance::issue_credit_invoice(&store, &cln, SECRET, 3_600, "u", "0x505", 0)
        .await
        .unwrap_err();
    assert!(matches!(err, IssueError::AmountZero));

    assert!(ln.create_calls.lock().is_empty());
    assert!(store.invoice_labels().is_empty());
}
