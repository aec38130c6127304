//! Typed client for the operator's Starknet account daemon.
//!
//! The daemon owns the Stark signing key: the bridge hands it entrypoint
//! calls with ready-made calldata and a nonce, and the daemon signs, submits
//! and exposes transaction status. This crate frames those four operations
//! and the felt-level encodings ([`wire`]); everything above it is typed.

pub mod wire;

use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;
use wire::TransactionStatus;

/// One entrypoint invocation on one contract.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractCall {
    pub contract_address: String,
    pub entry_point: String,
    pub calldata: Vec<String>,
}

/// The chain operations the gateway consumes, as a mockable seam.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Read-only entrypoint call; returns the raw felt array.
    async fn call(&self, call: ContractCall) -> Result<Vec<String>>;

    /// Signs and submits an invoke transaction under `nonce`; returns the
    /// transaction hash without waiting for inclusion.
    async fn invoke(&self, calls: Vec<ContractCall>, nonce: u64) -> Result<String>;

    /// The operator account's next usable nonce according to the chain.
    async fn account_nonce(&self) -> Result<u64>;

    /// Polls `tx_hash` until the chain reports a terminal status.
    async fn wait_for_transaction(&self, tx_hash: &str) -> Result<TransactionStatus>;
}

#[derive(Clone)]
pub struct StarknetBridge {
    client: reqwest::Client,
    endpoint: String,
    auth_token: String,
}

#[derive(Serialize)]
struct InvokeRequest<'a> {
    calls: &'a [ContractCall],
    nonce: u64,
}

#[derive(Deserialize)]
struct InvokeResponse {
    transaction_hash: String,
}

#[derive(Deserialize)]
struct CallResponse {
    result: Vec<String>,
}

#[derive(Deserialize)]
struct NonceResponse {
    nonce: u64,
}

const POLL_INTERVAL: Duration = Duration::from_secs(2);

impl StarknetBridge {
    pub fn new(endpoint: String, auth_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    async fn check<T>(resp: reqwest::Response, what: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{what} failed with {status}: {text}");
        }
        resp.json()
            .await
            .with_context(|| format!("Unexpected {what} response shape"))
    }
}

#[async_trait]
impl ChainRpc for StarknetBridge {
    async fn call(&self, call: ContractCall) -> Result<Vec<String>> {
        let resp = self
            .client
            .post(self.url("/call"))
            .bearer_auth(&self.auth_token)
            .json(&call)
            .send()
            .await
            .context("Could not reach chain daemon for call")?;
        let parsed: CallResponse = Self::check(resp, "call").await?;
        Ok(parsed.result)
    }

    async fn invoke(&self, calls: Vec<ContractCall>, nonce: u64) -> Result<String> {
        let resp = self
            .client
            .post(self.url("/invoke"))
            .bearer_auth(&self.auth_token)
            .json(&InvokeRequest {
                calls: &calls,
                nonce,
            })
            .send()
            .await
            .context("Could not reach chain daemon for invoke")?;
        let parsed: InvokeResponse = Self::check(resp, "invoke").await?;
        tracing::debug!(
            tx_hash = parsed.transaction_hash,
            nonce,
            "Submitted invoke transaction"
        );
        Ok(parsed.transaction_hash)
    }

    async fn account_nonce(&self) -> Result<u64> {
        let resp = self
            .client
            .get(self.url("/nonce"))
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .context("Could not reach chain daemon for nonce")?;
        let parsed: NonceResponse = Self::check(resp, "nonce").await?;
        Ok(parsed.nonce)
    }

    async fn wait_for_transaction(&self, tx_hash: &str) -> Result<TransactionStatus> {
        loop {
            let resp = self
                .client
                .get(self.url(&format!("/transactions/{tx_hash}")))
                .bearer_auth(&self.auth_token)
                .send()
                .await
                .context("Could not reach chain daemon for transaction status")?;
            let status: TransactionStatus = Self::check(resp, "transaction status").await?;
            let effective = status.effective();
            if effective.is_terminal() {
                return Ok(status);
            }
            tracing::trace!(tx_hash, %effective, "Waiting for transaction inclusion");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
