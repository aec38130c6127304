use escrow_vault::U256;
use serde::Deserialize;
use serde::Serialize;

/// Credit settlement state of one issued invoice. `Credited` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    Pending,
    Processing,
    Credited,
    Failed,
}

impl Default for CreditStatus {
    fn default() -> Self {
        CreditStatus::Pending
    }
}

/// Bookkeeping of the node reconciliation loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Invoice status as last reported by the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cln_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditState {
    #[serde(default)]
    pub status: CreditStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_sats: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_units: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credited_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<u64>,
}

/// One invoice issued on behalf of a merchant, keyed in the store by its
/// local label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub label: String,
    pub user_id_b64: String,
    /// Normalized on-chain address credited when the invoice settles.
    pub credit_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_sats: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_msat: Option<u64>,
    pub bolt11: String,
    /// Invoice status as the bridge last recorded it (`unpaid`, `paid`,
    /// `expired`, or whatever newer nodes report).
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<u64>,
    pub created_at: u64,
    #[serde(default)]
    pub monitor: MonitorState,
    #[serde(default)]
    pub credit: CreditState,
}

impl InvoiceRecord {
    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }

    /// The sat amount to credit: the recorded sats, or the msat amount when
    /// it divides evenly.
    pub fn credit_amount_sats(&self) -> Option<u64> {
        if let Some(sats) = self.amount_sats {
            return Some(sats);
        }
        match self.amount_msat {
            Some(msat) if msat % 1_000 == 0 => Some(msat / 1_000),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> InvoiceRecord {
        InvoiceRecord {
            label: "credit-1".to_string(),
            user_id_b64: "dXNlcg==".to_string(),
            credit_address: "0xabc".to_string(),
            amount_sats: None,
            amount_msat: None,
            bolt11: "lnbc1...".to_string(),
            status: "unpaid".to_string(),
            payment_hash: None,
            description: None,
            paid_at: None,
            created_at: 100,
            monitor: MonitorState::default(),
            credit: CreditState::default(),
        }
    }

    #[test]
    fn sats_derive_from_msat_only_when_whole() {
        let mut invoice = record();
        assert_eq!(invoice.credit_amount_sats(), None);

        invoice.amount_msat = Some(5_000_000);
        assert_eq!(invoice.credit_amount_sats(), Some(5_000));

        invoice.amount_msat = Some(5_000_001);
        assert_eq!(invoice.credit_amount_sats(), None);

        // An explicit sat amount wins.
        invoice.amount_sats = Some(7);
        assert_eq!(invoice.credit_amount_sats(), Some(7));
    }

    #[test]
    fn fresh_records_default_to_pending_credit() {
        let invoice = record();
        assert_eq!(invoice.credit.status, CreditStatus::Pending);
        assert_eq!(invoice.credit.attempts, 0);
        assert!(!invoice.is_paid());
    }
}
