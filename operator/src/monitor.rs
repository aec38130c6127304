use crate::gateway::ChainGateway;
use crate::store::CreditStatus;
use crate::store::Store;
use crate::util::unix_now;
use cln_bridge::LnClient;
use escrow_vault::Address;
use std::sync::Arc;
use std::time::Duration;

/// Settles paid invoices on chain.
///
/// Each tick reconciles every invoice with the node, credits the merchant
/// address of freshly paid ones through the gateway, and recovers entries a
/// crashed run left stuck in `processing`. Invoices are handled one at a
/// time so the nonce lane never sees two monitor transactions at once.
pub struct CreditMonitor {
    cln: Arc<dyn LnClient>,
    gateway: Arc<ChainGateway>,
    store: Arc<Store>,
    interval: Duration,
    retry_delay: Duration,
    stale_after: Duration,
}

impl CreditMonitor {
    pub fn new(
        cln: Arc<dyn LnClient>,
        gateway: Arc<ChainGateway>,
        store: Arc<Store>,
        interval: Duration,
        retry_delay: Duration,
        stale_after: Duration,
    ) -> Self {
        CreditMonitor {
            cln,
            gateway,
            store,
            interval,
            retry_delay,
            stale_after,
        }
    }

    pub async fn run(self: Arc<Self>) {
        tracing::info!(interval = ?self.interval, "Starting invoice monitor");
        loop {
            self.tick(unix_now()).await;
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One reconciliation pass over all invoices.
    pub async fn tick(&self, now: u64) {
        for label in self.store.invoice_labels() {
            if let Err(e) = self.process_invoice(&label, now).await {
                tracing::error!(label, "Invoice monitoring failed: {e:#}");
            }
        }
    }

    async fn process_invoice(&self, label: &str, now: u64) -> anyhow::Result<()> {
        let Some(record) = self.store.get_invoice(label) else {
            return Ok(());
        };

        // Recover entries stuck in processing, e.g. after a crash between
        // the mark and the transfer. They go back to pending and the next
        // tick re-attempts; this is recovery, not a retry.
        if record.credit.status == CreditStatus::Processing {
            let stale = record
                .credit
                .last_attempt_at
                .map_or(true, |at| now.saturating_sub(at) >= self.stale_after.as_secs());
            if stale {
                tracing::warn!(label, "Resetting stale processing credit");
                let _ = self.store.with_invoice_mut(label, |record| {
                    record.credit.status = CreditStatus::Pending;
                    record.credit.last_error = Some("stale_processing".to_string());
                })?;
            }
            return Ok(());
        }

        let record = if !record.is_paid() {
            match self.reconcile(label, now).await? {
                Some(record) => record,
                None => return Ok(()),
            }
        } else {
            record
        };

        if !record.is_paid() {
            return Ok(());
        }
        match record.credit.status {
            CreditStatus::Credited => return Ok(()),
            CreditStatus::Failed => {
                if let Some(retry_at) = record.credit.next_retry_at {
                    if now < retry_at {
                        return Ok(());
                    }
                }
            }
            CreditStatus::Pending => {}
            // Handled above.
            CreditStatus::Processing => return Ok(()),
        }

        self.attempt_credit(label, &record.credit_address, record.credit_amount_sats(), now)
            .await
    }

    /// Copies the node's view of the invoice into the record and returns
    /// the updated record. A node error leaves only the monitor bookkeeping
    /// updated and yields `None`.
    async fn reconcile(
        &self,
        label: &str,
        now: u64,
    ) -> anyhow::Result<Option<crate::store::InvoiceRecord>> {
        let node_invoice = match self.cln.invoice_by_label(label).await {
            Ok(invoice) => invoice,
            Err(e) => {
                let message = format!("{e:#}");
                tracing::warn!(label, "Could not reconcile invoice: {message}");
                let _ = self.store.with_invoice_mut(label, |record| {
                    record.monitor.last_checked_at = Some(now);
                    record.monitor.last_error = Some(message);
                })?;
                return Ok(None);
            }
        };

        let updated = self.store.with_invoice_mut(label, |record| {
            record.monitor.last_checked_at = Some(now);
            match &node_invoice {
                Some(invoice) => {
                    record.monitor.last_error = None;
                    record.monitor.cln_status = Some(invoice.status.to_string());
                    record.status = invoice.status.to_string();
                    if let Some(hash) = &invoice.payment_hash {
                        record.payment_hash = Some(hash.to_lowercase());
                    }
                    if let Some(paid_at) = invoice.paid_at {
                        record.paid_at = Some(paid_at);
                    }
                    if let Some(msat) = invoice.effective_amount_msat() {
                        record.amount_msat = Some(msat.msat());
                        if let Ok(sats) = msat.to_sats() {
                            record.amount_sats = Some(sats);
                        }
                    }
                }
                None => {
                    record.monitor.last_error = Some("unknown to the node".to_string());
                }
            }
            record.clone()
        })?;

        Ok(updated)
    }

    async fn attempt_credit(
        &self,
        label: &str,
        credit_address: &str,
        amount_sats: Option<u64>,
        now: u64,
    ) -> anyhow::Result<()> {
        let address = match Address::parse(credit_address) {
            Ok(address) if !address.is_zero() => address,
            _ => {
                tracing::warn!(label, credit_address, "Invalid credit address");
                self.schedule_retry(label, "invalid_address", now)?;
                return Ok(());
            }
        };
        let amount_sats = match amount_sats {
            Some(sats) if sats > 0 => sats,
            _ => {
                tracing::warn!(label, "Paid invoice has no usable amount");
                self.schedule_retry(label, "missing_amount", now)?;
                return Ok(());
            }
        };

        let _ = self.store.with_invoice_mut(label, |record| {
            record.credit.status = CreditStatus::Processing;
            record.credit.attempts += 1;
            record.credit.amount_sats = Some(amount_sats);
            record.credit.next_retry_at = None;
            record.credit.last_attempt_at = Some(now);
        })?;

        match self.gateway.submit_transfer(&address, amount_sats).await {
            Ok((tx_hash, amount_units)) => {
                tracing::info!(label, %address, amount_sats, tx_hash, "Invoice credited");
                let _ = self.store.with_invoice_mut(label, |record| {
                    record.credit.status = CreditStatus::Credited;
                    record.credit.tx_hash = Some(tx_hash.clone());
                    record.credit.amount_units = Some(amount_units);
                    record.credit.credited_at = Some(unix_now());
                    record.credit.last_error = None;
                })?;
            }
            Err(e) => {
                let message = format!("{e}");
                tracing::warn!(label, "Credit transfer failed: {message}");
                let _ = self.store.with_invoice_mut(label, |record| {
                    record.credit.status = CreditStatus::Failed;
                    record.credit.last_error = Some(message);
                    record.credit.next_retry_at = Some(now + self.retry_delay.as_secs());
                })?;
            }
        }
        Ok(())
    }

    fn schedule_retry(&self, label: &str, error: &str, now: u64) -> anyhow::Result<()> {
        let _ = self.store.with_invoice_mut(label, |record| {
            record.credit.status = CreditStatus::Failed;
            record.credit.last_error = Some(error.to_string());
            record.credit.next_retry_at = Some(now + self.retry_delay.as_secs());
        })?;
        Ok(())
    }
}
