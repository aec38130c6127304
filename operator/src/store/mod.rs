//! The persistent json document.
//!
//! One file holds everything the bridge remembers: registered users, their
//! credit addresses, issued invoices, auth nonces of the user surface, and
//! the payment audit records. Mutations reload the file, apply under a
//! coarse lock and persist via write-to-temp-then-rename, so readers only
//! ever see a complete document. A single writer task consuming queued
//! mutations is the scaling path if throughput ever outgrows this.

pub mod invoices;
pub mod payments;

use anyhow::Context;
use anyhow::Result;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

pub use invoices::CreditState;
pub use invoices::CreditStatus;
pub use invoices::InvoiceRecord;
pub use invoices::MonitorState;
pub use payments::EscrowSnapshot;
pub use payments::FailureInfo;
pub use payments::HistoryEvent;
pub use payments::LightningState;
pub use payments::PaymentRecord;
pub use payments::PaymentStatus;
pub use payments::StarknetState;

/// Account entry maintained by the user-facing surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey_b64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
    /// user_id_b64 -> normalized credit address.
    #[serde(default)]
    pub addresses: BTreeMap<String, String>,
    #[serde(default)]
    pub invoices: BTreeMap<String, InvoiceRecord>,
    /// Auth nonces of the user surface, keyed by user id.
    #[serde(default)]
    pub nonces: BTreeMap<String, u64>,
    /// Keyed by the canonical payment hash without prefix.
    #[serde(default)]
    pub payments: BTreeMap<String, PaymentRecord>,
}

pub struct Store {
    path: PathBuf,
    doc: Mutex<Document>,
}

impl Store {
    /// Opens or creates the document at `path`, creating the parent
    /// directory if needed.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Could not create data dir {}", parent.display()))?;
            }
        }
        let doc = Self::load(&path)?;
        Ok(Store {
            path,
            doc: Mutex::new(doc),
        })
    }

    fn load(path: &Path) -> Result<Document> {
        if !path.exists() {
            return Ok(Document::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("Could not read store at {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Corrupt store document at {}", path.display()))
    }

    fn persist(path: &Path, doc: &Document) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("Store path has no file name")?;
        let tmp = path.with_file_name(format!("{file_name}.tmp"));
        let data = serde_json::to_string_pretty(doc).context("Could not serialize store")?;
        fs::write(&tmp, data)
            .with_context(|| format!("Could not write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Could not move {} into place", tmp.display()))?;
        Ok(())
    }

    /// Reload-apply-persist. The closure sees the latest durable document
    /// and its changes hit disk before this returns.
    pub fn mutate<T>(&self, apply: impl FnOnce(&mut Document) -> T) -> Result<T> {
        let mut doc = self.doc.lock();
        *doc = Self::load(&self.path)?;
        let out = apply(&mut doc);
        Self::persist(&self.path, &doc)?;
        Ok(out)
    }

    /// Reads the last durable snapshot.
    pub fn read<T>(&self, read: impl FnOnce(&Document) -> T) -> T {
        read(&self.doc.lock())
    }

    pub fn get_payment(&self, payment_hash_no_prefix: &str) -> Option<PaymentRecord> {
        self.read(|doc| doc.payments.get(payment_hash_no_prefix).cloned())
    }

    /// Applies `update` to the record under `payment_hash_no_prefix`,
    /// creating it first when absent.
    pub fn with_payment_mut<T>(
        &self,
        payment_hash_no_prefix: &str,
        now: u64,
        update: impl FnOnce(&mut PaymentRecord) -> T,
    ) -> Result<T> {
        self.mutate(|doc| {
            let record = doc
                .payments
                .entry(payment_hash_no_prefix.to_string())
                .or_insert_with(|| PaymentRecord::new(payment_hash_no_prefix, now));
            update(record)
        })
    }

    /// Convenience for the common "append event + adjust" shape.
    pub fn record_payment_event(
        &self,
        payment_hash_no_prefix: &str,
        event: &str,
        now: u64,
        fields: Map<String, Value>,
    ) -> Result<()> {
        self.with_payment_mut(payment_hash_no_prefix, now, |record| {
            record.record_event(event, now, fields);
        })
    }

    pub fn insert_invoice(&self, record: InvoiceRecord) -> Result<()> {
        self.mutate(|doc| {
            doc.addresses
                .insert(record.user_id_b64.clone(), record.credit_address.clone());
            doc.invoices.insert(record.label.clone(), record);
        })
    }

    pub fn get_invoice(&self, label: &str) -> Option<InvoiceRecord> {
        self.read(|doc| doc.invoices.get(label).cloned())
    }

    pub fn invoice_labels(&self) -> Vec<String> {
        self.read(|doc| doc.invoices.keys().cloned().collect())
    }

    pub fn with_invoice_mut<T>(
        &self,
        label: &str,
        update: impl FnOnce(&mut InvoiceRecord) -> T,
    ) -> Result<Option<T>> {
        self.mutate(|doc| doc.invoices.get_mut(label).map(update))
    }
}
