//! Typed client for a Core Lightning node exposed over its REST plugin.
//!
//! The node signs invoices and routes payments; this crate only frames the
//! four rpc calls the bridge consumes (`listinvoices`, `listpays`, `pay`,
//! `invoice`) and normalizes the loosely-typed amount fields at the edge.

pub mod bolt11;
pub mod msat;

use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;

pub use msat::FractionalSats;
pub use msat::MsatAmount;

#[derive(Clone)]
pub struct ClnBridge {
    client: reqwest::Client,
    endpoint: String,
    rune: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ListInvoicesResponse {
    pub invoices: Vec<Invoice>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Invoice {
    pub label: String,
    pub status: InvoiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_msat: Option<MsatAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_received_msat: Option<MsatAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_msat: Option<MsatAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_preimage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bolt11: Option<String>,
}

impl Invoice {
    /// The received amount if the node reported one, falling back to the
    /// invoiced amount.
    pub fn effective_amount_msat(&self) -> Option<MsatAmount> {
        self.amount_received_msat
            .or(self.paid_msat)
            .or(self.amount_msat)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Unpaid,
    Paid,
    Expired,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Expired => "expired",
            InvoiceStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ListPaysResponse {
    pub pays: Vec<Pay>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Pay {
    pub status: PayStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_preimage: Option<String>,
}

/// Terminal pay states have drifted across node versions; all the success
/// spellings are accepted.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PayStatus {
    Complete,
    Completed,
    Paid,
    Succeeded,
    Pending,
    Failed,
    #[serde(other)]
    Unknown,
}

impl PayStatus {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            PayStatus::Complete | PayStatus::Completed | PayStatus::Paid | PayStatus::Succeeded
        )
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PayParams {
    pub bolt11: String,
    /// Seconds the node keeps retrying routes before giving up.
    pub retry_for: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxfeepercent: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PayResponse {
    pub payment_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_preimage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_msat: Option<MsatAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_sent_msat: Option<MsatAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PayStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct InvoiceParams {
    /// Whole-sat amounts are passed in the node's `"<N>sat"` spelling.
    pub amount_msat: String,
    pub label: String,
    pub description: String,
    pub expiry: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deschashonly: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InvoiceResponse {
    pub bolt11: String,
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_hash: Option<String>,
}

#[derive(Serialize)]
struct ListInvoicesByPaymentHash<'a> {
    payment_hash: &'a str,
}

#[derive(Serialize)]
struct ListInvoicesByLabel<'a> {
    label: &'a str,
}

#[derive(Serialize)]
struct ListPaysByPaymentHash<'a> {
    payment_hash: &'a str,
}

impl ClnBridge {
    pub fn new(endpoint: String, rune: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            rune,
        }
    }

    async fn call<Req, Resp>(&self, method: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/v1/{method}", self.endpoint);
        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("Rune", self.rune.clone())
            .json(body)
            .send()
            .await
            .with_context(|| format!("Could not reach lightning node for {method}"))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{method} failed with {status}: {text}");
        }
        resp.json()
            .await
            .with_context(|| format!("Unexpected {method} response shape"))
    }

    pub async fn list_invoices_by_payment_hash(
        &self,
        payment_hash: &str,
    ) -> Result<ListInvoicesResponse> {
        self.call("listinvoices", &ListInvoicesByPaymentHash { payment_hash })
            .await
    }

    pub async fn list_invoices_by_label(&self, label: &str) -> Result<ListInvoicesResponse> {
        self.call("listinvoices", &ListInvoicesByLabel { label }).await
    }

    pub async fn list_pays_by_payment_hash(&self, payment_hash: &str) -> Result<ListPaysResponse> {
        self.call("listpays", &ListPaysByPaymentHash { payment_hash })
            .await
    }

    pub async fn pay(&self, params: PayParams) -> Result<PayResponse> {
        tracing::debug!(bolt11_len = params.bolt11.len(), retry_for = params.retry_for, "Paying invoice");
        self.call("pay", &params).await
    }

    pub async fn create_invoice(&self, params: InvoiceParams) -> Result<InvoiceResponse> {
        self.call("invoice", &params).await
    }
}

/// The node operations the bridge consumes, as a mockable seam.
#[async_trait]
pub trait LnClient: Send + Sync {
    /// The invoice carrying `payment_hash`, if this node issued one.
    async fn invoice_by_payment_hash(&self, payment_hash: &str) -> Result<Option<Invoice>>;

    /// The invoice filed under the local `label`, if any.
    async fn invoice_by_label(&self, label: &str) -> Result<Option<Invoice>>;

    /// Completed or attempted outgoing payments for `payment_hash`.
    async fn pays_by_payment_hash(&self, payment_hash: &str) -> Result<Vec<Pay>>;

    async fn pay(&self, params: PayParams) -> Result<PayResponse>;

    async fn create_invoice(&self, params: InvoiceParams) -> Result<InvoiceResponse>;
}

#[async_trait]
impl LnClient for ClnBridge {
    async fn invoice_by_payment_hash(&self, payment_hash: &str) -> Result<Option<Invoice>> {
        let response = self.list_invoices_by_payment_hash(payment_hash).await?;
        Ok(response.invoices.into_iter().next())
    }

    async fn invoice_by_label(&self, label: &str) -> Result<Option<Invoice>> {
        let response = self.list_invoices_by_label(label).await?;
        Ok(response.invoices.into_iter().next())
    }

    async fn pays_by_payment_hash(&self, payment_hash: &str) -> Result<Vec<Pay>> {
        let response = self.list_pays_by_payment_hash(payment_hash).await?;
        Ok(response.pays)
    }

    async fn pay(&self, params: PayParams) -> Result<PayResponse> {
        ClnBridge::pay(self, params).await
    }

    async fn create_invoice(&self, params: InvoiceParams) -> Result<InvoiceResponse> {
        ClnBridge::create_invoice(self, params).await
    }
}
