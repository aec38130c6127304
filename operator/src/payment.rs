use crate::gateway::ChainGateway;
use crate::gateway::GatewayError;
use crate::store::EscrowSnapshot;
use crate::store::FailureInfo;
use crate::store::PaymentStatus;
use crate::store::Store;
use crate::util::canonical_payment_hash;
use crate::util::unix_now;
use cln_bridge::bolt11;
use cln_bridge::bolt11::Bolt11Error;
use cln_bridge::InvoiceStatus;
use cln_bridge::LnClient;
use cln_bridge::PayParams;
use cln_bridge::PayStatus;
use escrow_vault::U256;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// How an error surfaces to the http caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    Conflict,
    Internal,
}

/// A failed payment run. `recorded` tracks whether the failure already
/// landed in the persistent record, so it is serialized exactly once.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct PaymentError {
    pub code: String,
    pub message: String,
    pub class: ErrorClass,
    recorded: bool,
}

impl PaymentError {
    fn new(code: &str, message: impl Into<String>, class: ErrorClass) -> Self {
        PaymentError {
            code: code.to_string(),
            message: message.into(),
            class,
            recorded: false,
        }
    }

    fn bad_request(code: &str, message: impl Into<String>) -> Self {
        Self::new(code, message, ErrorClass::BadRequest)
    }

    fn internal(code: &str, message: impl Into<String>) -> Self {
        Self::new(code, message, ErrorClass::Internal)
    }
}

/// Successful result of a payment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PayOutcome {
    Claimed {
        payment_hash: String,
        tx_hash: String,
        amount_sats: u64,
    },
    /// The hash already completed earlier; nothing was sent anywhere.
    AlreadyClaimed { payment_hash: String },
}

/// Drives one locked escrow through Lightning payment and on-chain claim.
///
/// Owns the transient per-process state: the in-flight set rejecting
/// concurrent duplicates and the processed set short-circuiting repeats.
/// Within one hash the steps are strictly sequential; across hashes runs
/// interleave freely except on the gateway's nonce lane.
pub struct PaymentOrchestrator {
    cln: Arc<dyn LnClient>,
    gateway: Arc<ChainGateway>,
    store: Arc<Store>,
    inflight: Mutex<HashSet<String>>,
    processed: Mutex<HashSet<String>>,
    pay_retry_for: u64,
    max_fee_percent: f64,
}

impl PaymentOrchestrator {
    pub fn new(
        cln: Arc<dyn LnClient>,
        gateway: Arc<ChainGateway>,
        store: Arc<Store>,
        pay_retry_for: u64,
        max_fee_percent: f64,
    ) -> Self {
        PaymentOrchestrator {
            cln,
            gateway,
            store,
            inflight: Mutex::new(HashSet::new()),
            processed: Mutex::new(HashSet::new()),
            pay_retry_for,
            max_fee_percent,
        }
    }

    /// Processes a payment request end to end: load the lock, reconcile the
    /// invoice, pay it, obtain the preimage, claim on chain.
    ///
    /// Idempotent per hash: a completed hash returns
    /// [`PayOutcome::AlreadyClaimed`] without touching Lightning or the
    /// chain, and a concurrent duplicate fails `payment_inflight`. There is
    /// no internal retry; callers may retry freely because the paid-invoice
    /// check and the on-chain phase check make re-runs no-ops.
    pub async fn process_payment_request(
        &self,
        payment_hash: &str,
        bolt11_param: Option<String>,
        lock_tx_hash: Option<String>,
    ) -> Result<PayOutcome, PaymentError> {
        let hash = canonical_payment_hash(payment_hash)
            .map_err(|e| PaymentError::bad_request("invalid_payment_hash", e.to_string()))?;

        if self.processed.lock().contains(&hash) {
            tracing::info!(payment_hash = hash, "Payment already claimed, skipping");
            if let Err(e) =
                self.store
                    .record_payment_event(&hash, "already_claimed", unix_now(), Map::new())
            {
                tracing::error!("Failed to record already_claimed event: {e:#}");
            }
            return Ok(PayOutcome::AlreadyClaimed {
                payment_hash: format!("0x{hash}"),
            });
        }

        {
            let mut inflight = self.inflight.lock();
            if !inflight.insert(hash.clone()) {
                return Err(PaymentError::new(
                    "payment_inflight",
                    format!("payment 0x{hash} is already executing"),
                    ErrorClass::Conflict,
                ));
            }
        }

        let result = self.execute(&hash, bolt11_param, lock_tx_hash).await;
        self.inflight.lock().remove(&hash);

        if let Err(error) = &result {
            if !error.recorded {
                let now = unix_now();
                let mut fields = Map::new();
                fields.insert("code".to_string(), Value::from(error.code.clone()));
                fields.insert("message".to_string(), Value::from(error.message.clone()));
                let write = self.store.with_payment_mut(&hash, now, |record| {
                    record.record_event("error", now, fields);
                    record.set_status(PaymentStatus::Error, now);
                });
                if let Err(e) = write {
                    tracing::error!("Failed to record payment error: {e:#}");
                }
            }
        }

        result
    }

    async fn execute(
        &self,
        hash: &str,
        bolt11_param: Option<String>,
        lock_tx_hash: Option<String>,
    ) -> Result<PayOutcome, PaymentError> {
        // Load the lock. Everything downstream reconciles against this
        // snapshot.
        let lock = match self.gateway.load_escrow(hash).await {
            Ok(lock) => lock,
            Err(GatewayError::NotLockedOnchain(_)) => {
                return Err(PaymentError::bad_request(
                    "locked_not_found",
                    format!("no locked escrow under 0x{hash}"),
                ));
            }
            Err(e) => {
                return Err(PaymentError::internal("chain_unavailable", format!("{e:#}")));
            }
        };
        let lock_amount_sats = lock.amount_sats().ok_or_else(|| {
            PaymentError::internal(
                "amount_out_of_range",
                format!("locked amount {} does not fit sats", lock.amount),
            )
        })?;

        let now = unix_now();
        let mut fields = Map::new();
        fields.insert("user".to_string(), Value::from(lock.user.to_string()));
        fields.insert("amount_sats".to_string(), Value::from(lock_amount_sats));
        fields.insert("expires_at".to_string(), Value::from(lock.expires_at));
        fields.insert("locked_at".to_string(), Value::from(lock.locked_at));
        if let Some(tx) = &lock_tx_hash {
            fields.insert("lock_tx_hash".to_string(), Value::from(tx.clone()));
        }
        self.store
            .with_payment_mut(hash, now, |record| {
                record.escrow = Some(EscrowSnapshot {
                    user: lock.user.to_string(),
                    amount_sats: lock_amount_sats,
                    expires_at: lock.expires_at,
                    locked_at: lock.locked_at,
                });
                if let Some(b) = &bolt11_param {
                    record.bolt11 = Some(b.clone());
                }
                record.record_event("payment_requested", now, fields);
                record.set_status(PaymentStatus::Processing, now);
            })
            .map_err(store_error)?;

        // Reconcile the invoice: the node's own invoice wins, a supplied
        // bolt11 is the fallback.
        let node_invoice = self
            .cln
            .invoice_by_payment_hash(hash)
            .await
            .map_err(|e| {
                self.fail_lightning(hash, "lightning_unavailable", format!("{e:#}"), ErrorClass::Internal)
            })?;

        let (invoice_sats, invoice_paid, invoice_bolt11, invoice_preimage, invoice_status) =
            match node_invoice {
                Some(invoice) => {
                    let status = invoice.status;
                    let msat = invoice.effective_amount_msat().ok_or_else(|| {
                        self.fail_lightning(
                            hash,
                            "invoice_missing_amount",
                            "node invoice reports no amount".to_string(),
                            ErrorClass::BadRequest,
                        )
                    })?;
                    let sats = msat.to_sats().map_err(|e| {
                        self.fail_lightning(
                            hash,
                            "fractional_sats",
                            e.to_string(),
                            ErrorClass::BadRequest,
                        )
                    })?;
                    (
                        sats,
                        status == InvoiceStatus::Paid,
                        invoice.bolt11,
                        invoice.payment_preimage,
                        Some(status.to_string()),
                    )
                }
                None => match &bolt11_param {
                    Some(bolt11_str) => {
                        let decoded = bolt11::decode(bolt11_str).map_err(|e| {
                            let code = match e {
                                Bolt11Error::Invalid(_) => "invalid_bolt11",
                                Bolt11Error::MissingAmount => "invoice_missing_amount",
                                Bolt11Error::FractionalSats(_) => "fractional_sats",
                            };
                            self.fail_lightning(hash, code, e.to_string(), ErrorClass::BadRequest)
                        })?;
                        if decoded.payment_hash != hash {
                            return Err(self.fail_lightning(
                                hash,
                                "hash_mismatch",
                                format!(
                                    "bolt11 pays {} instead of {hash}",
                                    decoded.payment_hash
                                ),
                                ErrorClass::BadRequest,
                            ));
                        }
                        (decoded.amount_sats, false, Some(bolt11_str.clone()), None, None)
                    }
                    None => {
                        return Err(self.fail_lightning(
                            hash,
                            "invoice_not_found",
                            "no invoice on the node and no bolt11 supplied".to_string(),
                            ErrorClass::BadRequest,
                        ));
                    }
                },
            };

        let now = unix_now();
        self.store
            .with_payment_mut(hash, now, |record| {
                record.lightning.invoice_status = invoice_status.clone();
                record.lightning.amount_sats = Some(invoice_sats);
            })
            .map_err(store_error)?;

        // The three amounts must agree: lock, invoice, and later the pay
        // receipt.
        if U256::from(invoice_sats) != lock.amount {
            return Err(self.fail_lightning(
                hash,
                "amount_mismatch",
                format!("invoice wants {invoice_sats} sats but the lock holds {lock_amount_sats}"),
                ErrorClass::BadRequest,
            ));
        }

        let mut preimage_hex = if invoice_paid { invoice_preimage } else { None };

        if !invoice_paid {
            let target = invoice_bolt11.or_else(|| bolt11_param.clone()).ok_or_else(|| {
                self.fail_lightning(
                    hash,
                    "missing_bolt11",
                    "unpaid invoice carries no bolt11 and none was supplied".to_string(),
                    ErrorClass::BadRequest,
                )
            })?;
            let pay = self
                .cln
                .pay(PayParams {
                    bolt11: target,
                    retry_for: self.pay_retry_for,
                    maxfeepercent: Some(self.max_fee_percent),
                })
                .await
                .map_err(|e| {
                    self.fail_lightning(
                        hash,
                        "lightning_pay_failed",
                        format!("{e:#}"),
                        ErrorClass::Internal,
                    )
                })?;
            if matches!(pay.status, Some(PayStatus::Failed)) {
                return Err(self.fail_lightning(
                    hash,
                    "lightning_pay_failed",
                    "node reported the payment as failed".to_string(),
                    ErrorClass::Internal,
                ));
            }

            // Post-pay invariants: the receipt must name our hash and our
            // amount.
            match canonical_payment_hash(&pay.payment_hash) {
                Ok(receipt_hash) if receipt_hash == hash => {}
                _ => {
                    return Err(self.fail_lightning(
                        hash,
                        "lightning_payment_hash_mismatch",
                        format!("pay receipt names hash {:?}", pay.payment_hash),
                        ErrorClass::Internal,
                    ));
                }
            }
            if let Some(paid_msat) = pay.amount_msat {
                if Some(paid_msat.msat()) != lock_amount_sats.checked_mul(1_000) {
                    return Err(self.fail_lightning(
                        hash,
                        "lightning_payment_amount_mismatch",
                        format!(
                            "paid {paid_msat} but the lock holds {lock_amount_sats} sats"
                        ),
                        ErrorClass::Internal,
                    ));
                }
            }
            if pay.payment_preimage.is_some() {
                preimage_hex = pay.payment_preimage;
            }
        }

        // Preimage acquisition: the pay receipt, the invoice, or the node's
        // completed pays.
        let preimage_hex = match preimage_hex {
            Some(preimage) => preimage,
            None => {
                let pays = self.cln.pays_by_payment_hash(hash).await.map_err(|e| {
                    self.fail_lightning(
                        hash,
                        "lightning_unavailable",
                        format!("{e:#}"),
                        ErrorClass::Internal,
                    )
                })?;
                let preimage = pays
                    .into_iter()
                    .filter(|pay| pay.status.is_success())
                    .find_map(|pay| pay.payment_preimage);
                match preimage {
                    Some(preimage) => preimage,
                    None => {
                        return Err(self.fail_lightning(
                            hash,
                            "missing_preimage",
                            "no completed pay with a preimage on the node".to_string(),
                            ErrorClass::Internal,
                        ));
                    }
                }
            }
        };
        let preimage_bytes = hex::decode(preimage_hex.trim()).map_err(|e| {
            self.fail_lightning(
                hash,
                "missing_preimage",
                format!("preimage is not hex: {e}"),
                ErrorClass::Internal,
            )
        })?;

        let now = unix_now();
        let mut fields = Map::new();
        fields.insert(
            "payment_preimage".to_string(),
            Value::from(preimage_hex.clone()),
        );
        fields.insert("amount_sats".to_string(), Value::from(invoice_sats));
        self.store
            .with_payment_mut(hash, now, |record| {
                record.lightning.status = Some("succeeded".to_string());
                record.lightning.payment_preimage = Some(preimage_hex.clone());
                record.record_event("lightning_succeeded", now, fields);
                record.set_status(PaymentStatus::AwaitingClaim, now);
            })
            .map_err(store_error)?;

        // Claim on chain.
        let now = unix_now();
        self.store
            .with_payment_mut(hash, now, |record| {
                record.starknet.status = Some("submitting".to_string());
                record.starknet.submitted_at = Some(now);
                record.record_event("claim_queued", now, Map::new());
                record.set_status(PaymentStatus::ClaimQueued, now);
            })
            .map_err(store_error)?;

        match self.gateway.submit_claim(hash, &preimage_bytes).await {
            Ok((tx_hash, status)) => {
                let now = unix_now();
                let mut fields = Map::new();
                fields.insert("tx_hash".to_string(), Value::from(tx_hash.clone()));
                fields.insert("chain_status".to_string(), Value::from(status.to_string()));
                self.store
                    .with_payment_mut(hash, now, |record| {
                        record.transaction_hash = Some(tx_hash.clone());
                        record.starknet.status = Some("confirmed".to_string());
                        record.starknet.tx_hash = Some(tx_hash.clone());
                        record.starknet.confirmed_at = Some(now);
                        record.record_event("claim_confirmed", now, fields);
                        record.set_status(PaymentStatus::Claimed, now);
                    })
                    .map_err(store_error)?;
                self.processed.lock().insert(hash.to_string());
                tracing::info!(payment_hash = hash, tx_hash, "Claim confirmed");
                Ok(PayOutcome::Claimed {
                    payment_hash: format!("0x{hash}"),
                    tx_hash,
                    amount_sats: lock_amount_sats,
                })
            }
            Err(e) => Err(self.fail_starknet(hash, "claim_failed", format!("{e}"))),
        }
    }

    /// Serializes a Lightning-side failure into the record and returns the
    /// matching error, flagged as recorded.
    fn fail_lightning(
        &self,
        hash: &str,
        code: &str,
        message: String,
        class: ErrorClass,
    ) -> PaymentError {
        tracing::warn!(payment_hash = hash, code, "Lightning step failed: {message}");
        let now = unix_now();
        let mut fields = Map::new();
        fields.insert("message".to_string(), Value::from(message.clone()));
        let write = self.store.with_payment_mut(hash, now, |record| {
            record.lightning.status = Some("failed".to_string());
            record.lightning.failure = Some(FailureInfo {
                code: code.to_string(),
                message: message.clone(),
            });
            record.record_event(code, now, fields);
            record.set_status(PaymentStatus::LightningFailed, now);
        });
        if let Err(e) = write {
            tracing::error!("Failed to record lightning failure: {e:#}");
        }
        PaymentError {
            code: code.to_string(),
            message,
            class,
            recorded: true,
        }
    }

    fn fail_starknet(&self, hash: &str, code: &str, message: String) -> PaymentError {
        tracing::warn!(payment_hash = hash, code, "Chain step failed: {message}");
        let now = unix_now();
        let mut fields = Map::new();
        fields.insert("message".to_string(), Value::from(message.clone()));
        let write = self.store.with_payment_mut(hash, now, |record| {
            record.starknet.status = Some("failed".to_string());
            record.starknet.failure = Some(FailureInfo {
                code: code.to_string(),
                message: message.clone(),
            });
            record.record_event(code, now, fields);
            record.set_status(PaymentStatus::ClaimFailed, now);
        });
        if let Err(e) = write {
            tracing::error!("Failed to record chain failure: {e:#}");
        }
        PaymentError {
            code: code.to_string(),
            message,
            class: ErrorClass::Internal,
            recorded: true,
        }
    }
}

fn store_error(e: anyhow::Error) -> PaymentError {
    PaymentError::internal("store_error", format!("{e:#}"))
}
