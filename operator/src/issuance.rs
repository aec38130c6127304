use crate::store::CreditState;
use crate::store::InvoiceRecord;
use crate::store::MonitorState;
use crate::store::Store;
use crate::util::unix_now;
use cln_bridge::bolt11;
use cln_bridge::InvoiceParams;
use cln_bridge::LnClient;
use escrow_vault::Address;
use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

const LABEL_PREFIX: &str = "credit";
const DESCRIPTION_PREFIX: &str = "bridge-credit";

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("invalid_address: {0}")]
    InvalidAddress(String),
    #[error("invalid_amount: amount must be positive")]
    AmountZero,
    #[error("lightning node rejected the invoice: {0:#}")]
    Node(#[from] anyhow::Error),
}

/// Tags an invoice description: HMAC-SHA256 over
/// `user_id_b64:credit_address` keyed by the raw tag secret, rendered as
/// hex. The tag binds the description to the credited user and address.
pub fn description_tag(tag_secret: &[u8], user_id_b64: &str, credit_address: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(tag_secret).expect("hmac accepts any key length");
    mac.update(user_id_b64.as_bytes());
    mac.update(b":");
    mac.update(credit_address.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Asks the node for a credit invoice and files the record the monitor will
/// settle once it is paid. The node signs the bolt11; the bridge never
/// touches invoice keys.
pub async fn issue_credit_invoice(
    store: &Store,
    cln: &Arc<dyn LnClient>,
    tag_secret: &[u8],
    expiry_seconds: u64,
    user_id_b64: &str,
    credit_address: &str,
    amount_sats: u64,
) -> Result<InvoiceRecord, IssueError> {
    let address = Address::parse(credit_address)
        .map_err(|e| IssueError::InvalidAddress(e.to_string()))?;
    if address.is_zero() {
        return Err(IssueError::InvalidAddress("zero address".to_string()));
    }
    if amount_sats == 0 {
        return Err(IssueError::AmountZero);
    }

    let label = format!("{LABEL_PREFIX}-{}", Uuid::new_v4());
    let tag = description_tag(tag_secret, user_id_b64, address.as_str());
    let description = format!("{DESCRIPTION_PREFIX}:{}:{tag}", address.as_str());

    let response = cln
        .create_invoice(InvoiceParams {
            amount_msat: format!("{amount_sats}sat"),
            label: label.clone(),
            description: description.clone(),
            expiry: expiry_seconds,
            deschashonly: None,
        })
        .await?;

    let payment_hash = match &response.payment_hash {
        Some(hash) => Some(hash.to_lowercase()),
        None => bolt11::decode(&response.bolt11)
            .ok()
            .map(|decoded| decoded.payment_hash),
    };

    let record = InvoiceRecord {
        label: label.clone(),
        user_id_b64: user_id_b64.to_string(),
        credit_address: address.as_str().to_string(),
        amount_sats: Some(amount_sats),
        amount_msat: amount_sats.checked_mul(1_000),
        bolt11: response.bolt11.clone(),
        status: "unpaid".to_string(),
        payment_hash,
        description: Some(description),
        paid_at: None,
        created_at: unix_now(),
        monitor: MonitorState::default(),
        credit: CreditState::default(),
    };
    store
        .insert_invoice(record.clone())
        .map_err(IssueError::Node)?;

    tracing::info!(label, %address, amount_sats, "Issued credit invoice");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_deterministic_and_input_sensitive() {
        let secret = b"0123456789abcdef";
        let tag = description_tag(secret, "dXNlcg==", "0xabc");
        assert_eq!(tag, description_tag(secret, "dXNlcg==", "0xabc"));
        assert_eq!(tag.len(), 64);
        assert!(tag.bytes().all(|b| b.is_ascii_hexdigit()));

        assert_ne!(tag, description_tag(secret, "dXNlcg==", "0xabd"));
        assert_ne!(tag, description_tag(secret, "b3RoZXI=", "0xabc"));
        assert_ne!(tag, description_tag(b"another-secret-0123", "dXNlcg==", "0xabc"));
    }
}
