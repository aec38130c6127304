use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use std::fmt;

/// Lifecycle of a payment-claim run. `Claimed` is absorbing: once a record
/// reaches it no later run may move it anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Received,
    Processing,
    AwaitingClaim,
    ClaimQueued,
    Claimed,
    LightningFailed,
    ClaimFailed,
    Error,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Received => "received",
            PaymentStatus::Processing => "processing",
            PaymentStatus::AwaitingClaim => "awaiting_claim",
            PaymentStatus::ClaimQueued => "claim_queued",
            PaymentStatus::Claimed => "claimed",
            PaymentStatus::LightningFailed => "lightning_failed",
            PaymentStatus::ClaimFailed => "claim_failed",
            PaymentStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// A serialized failure, written exactly once per failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub code: String,
    pub message: String,
}

/// What happened on the escrow chain when the lock was read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowSnapshot {
    pub user: String,
    pub amount_sats: u64,
    pub expires_at: u64,
    pub locked_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_sats: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_preimage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarknetState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event: String,
    pub at: u64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

/// The audit record of one payment hash, keyed in the store by the
/// canonical 64-char hex form without prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// `0x`-prefixed lowercase hex.
    pub payment_hash: String,
    pub payment_hash_no_prefix: String,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escrow: Option<EscrowSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bolt11: Option<String>,
    /// Hash of the confirmed claim transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub lightning: LightningState,
    #[serde(default)]
    pub starknet: StarknetState,
    /// Append-only; existing entries are never rewritten.
    #[serde(default)]
    pub history: Vec<HistoryEvent>,
}

impl PaymentRecord {
    pub fn new(payment_hash_no_prefix: &str, now: u64) -> Self {
        PaymentRecord {
            payment_hash: format!("0x{payment_hash_no_prefix}"),
            payment_hash_no_prefix: payment_hash_no_prefix.to_string(),
            status: PaymentStatus::Received,
            escrow: None,
            bolt11: None,
            transaction_hash: None,
            created_at: now,
            updated_at: now,
            lightning: LightningState::default(),
            starknet: StarknetState::default(),
            history: Vec::new(),
        }
    }

    pub fn record_event(&mut self, event: &str, now: u64, fields: Map<String, Value>) {
        self.history.push(HistoryEvent {
            event: event.to_string(),
            at: now,
            fields,
        });
        self.updated_at = now;
    }

    /// Status moves are ignored once the record is claimed.
    pub fn set_status(&mut self, status: PaymentStatus, now: u64) {
        if self.status == PaymentStatus::Claimed {
            return;
        }
        self.status = status;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_appends_and_touches_updated_at() {
        let mut record = PaymentRecord::new(&"ab".repeat(32), 100);
        let mut fields = Map::new();
        fields.insert("amount_sats".to_string(), Value::from(5_000));
        record.record_event("payment_requested", 150, fields);
        record.record_event("lightning_succeeded", 200, Map::new());

        assert_eq!(record.history.len(), 2);
        assert_eq!(record.history[0].event, "payment_requested");
        assert_eq!(record.history[1].at, 200);
        assert_eq!(record.updated_at, 200);
    }

    #[test]
    fn claimed_status_is_absorbing() {
        let mut record = PaymentRecord::new(&"ab".repeat(32), 100);
        record.set_status(PaymentStatus::Claimed, 150);
        record.set_status(PaymentStatus::Error, 200);
        assert_eq!(record.status, PaymentStatus::Claimed);
    }

    #[test]
    fn serializes_with_snake_case_statuses() {
        let record = PaymentRecord::new(&"ab".repeat(32), 100);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "received");
        assert_eq!(
            json["payment_hash"],
            format!("0x{}", "ab".repeat(32))
        );
        // Empty sub-states keep their keys, optional scalars drop out.
        assert!(json.get("bolt11").is_none());
        assert!(json["lightning"].is_object());
    }
}
