use escrow_vault::Address;
use escrow_vault::Phase;
use escrow_vault::U256;
use starknet_bridge::wire;
use starknet_bridge::wire::TxStatus;
use starknet_bridge::ChainRpc;
use starknet_bridge::ContractCall;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Typed access to the escrow and token contracts through the operator
/// account. All transactions flow through one serialized nonce lane.
pub struct ChainGateway {
    rpc: Arc<dyn ChainRpc>,
    escrow_address: String,
    token_address: String,
    token_decimals: u32,
    /// `None` means the lane reseeds from the chain before the next
    /// submission.
    next_nonce: Mutex<Option<u64>>,
}

/// A decoded escrow read in Locked phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedPosition {
    /// Canonical hex, no prefix.
    pub payment_hash: String,
    pub user: Address,
    /// Locked amount in sats.
    pub amount: U256,
    pub expires_at: u64,
    pub locked_at: u64,
}

impl LockedPosition {
    pub fn amount_sats(&self) -> Option<u64> {
        if self.amount.high != 0 {
            return None;
        }
        u64::try_from(self.amount.low).ok()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("locked_not_found: no locked escrow under hash {0}")]
    NotLockedOnchain(String),
    #[error("claim transaction {tx_hash} ended {status}")]
    ClaimFailed {
        tx_hash: String,
        status: String,
        revert_reason: Option<String>,
    },
    #[error("transfer transaction {tx_hash} ended {status}")]
    TransferFailed {
        tx_hash: String,
        status: String,
        revert_reason: Option<String>,
    },
    #[error("token_decimals {0} outside supported range [8, 77]")]
    DecimalsOutOfRange(u32),
    #[error("transfer amount must be positive")]
    AmountZero,
    #[error("{amount_sats} sats overflow the token's unit range at {decimals} decimals")]
    AmountOverflow { amount_sats: u64, decimals: u32 },
    #[error("malformed escrow data from chain: {0}")]
    Malformed(String),
    #[error(transparent)]
    Rpc(#[from] anyhow::Error),
}

impl ChainGateway {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        escrow_address: String,
        token_address: String,
        token_decimals: u32,
    ) -> Result<Self, GatewayError> {
        if !(8..=77).contains(&token_decimals) {
            return Err(GatewayError::DecimalsOutOfRange(token_decimals));
        }
        Ok(ChainGateway {
            rpc,
            escrow_address,
            token_address,
            token_decimals,
            next_nonce: Mutex::new(None),
        })
    }

    /// Reads the escrow entry for `payment_hash_no_prefix` and decodes it,
    /// failing unless it is currently Locked.
    pub async fn load_escrow(
        &self,
        payment_hash_no_prefix: &str,
    ) -> Result<LockedPosition, GatewayError> {
        let hash = U256::from_hex(payment_hash_no_prefix)
            .map_err(|e| GatewayError::Malformed(format!("bad payment hash: {e}")))?;
        let [low, high] = wire::u256_calldata(hash);
        let result = self
            .rpc
            .call(ContractCall {
                contract_address: self.escrow_address.clone(),
                entry_point: "get_escrow".to_string(),
                calldata: vec![low, high],
            })
            .await?;
        if result.len() < 6 {
            return Err(GatewayError::Malformed(format!(
                "get_escrow returned {} felts, wanted 6",
                result.len()
            )));
        }

        let phase = parse_phase(&result[0])?;
        if phase != Phase::Locked {
            return Err(GatewayError::NotLockedOnchain(
                payment_hash_no_prefix.to_string(),
            ));
        }
        let user = Address::parse(&result[1])
            .map_err(|e| GatewayError::Malformed(format!("bad user address: {e}")))?;
        let amount = wire::u256_from_felts(&result[2], &result[3])
            .map_err(|e| GatewayError::Malformed(format!("bad amount: {e}")))?;
        let expires_at = wire::felt_to_u64(&result[4])
            .map_err(|e| GatewayError::Malformed(format!("bad expires_at: {e}")))?;
        let locked_at = wire::felt_to_u64(&result[5])
            .map_err(|e| GatewayError::Malformed(format!("bad locked_at: {e}")))?;

        Ok(LockedPosition {
            payment_hash: payment_hash_no_prefix.to_string(),
            user,
            amount,
            expires_at,
            locked_at,
        })
    }

    /// Submits the claim for `payment_hash_no_prefix` revealing `preimage`
    /// and waits for inclusion.
    pub async fn submit_claim(
        &self,
        payment_hash_no_prefix: &str,
        preimage: &[u8],
    ) -> Result<(String, TxStatus), GatewayError> {
        let hash = U256::from_hex(payment_hash_no_prefix)
            .map_err(|e| GatewayError::Malformed(format!("bad payment hash: {e}")))?;
        let mut calldata = wire::u256_calldata(hash).to_vec();
        calldata.extend(wire::byte_array_calldata(preimage));

        let tx_hash = self
            .with_nonce(ContractCall {
                contract_address: self.escrow_address.clone(),
                entry_point: "claim".to_string(),
                calldata,
            })
            .await?;
        tracing::info!(payment_hash = payment_hash_no_prefix, tx_hash, "Claim submitted");

        let status = self.rpc.wait_for_transaction(&tx_hash).await?;
        let effective = status.effective();
        if !effective.is_success() {
            return Err(GatewayError::ClaimFailed {
                tx_hash,
                status: effective.to_string(),
                revert_reason: status.revert_reason,
            });
        }
        Ok((tx_hash, effective))
    }

    /// Transfers `amount_sats` worth of token units to `recipient` and waits
    /// for inclusion. Returns the transaction hash and the unit amount.
    pub async fn submit_transfer(
        &self,
        recipient: &Address,
        amount_sats: u64,
    ) -> Result<(String, U256), GatewayError> {
        if amount_sats == 0 {
            return Err(GatewayError::AmountZero);
        }
        let amount_units = U256::from(amount_sats)
            .checked_mul_pow10(self.token_decimals - 8)
            .ok_or(GatewayError::AmountOverflow {
                amount_sats,
                decimals: self.token_decimals,
            })?;
        let [low, high] = wire::u256_calldata(amount_units);

        let tx_hash = self
            .with_nonce(ContractCall {
                contract_address: self.token_address.clone(),
                entry_point: "transfer".to_string(),
                calldata: vec![recipient.as_str().to_string(), low, high],
            })
            .await?;
        tracing::info!(%recipient, amount_sats, tx_hash, "Transfer submitted");

        let status = self.rpc.wait_for_transaction(&tx_hash).await?;
        let effective = status.effective();
        if !effective.is_success() {
            return Err(GatewayError::TransferFailed {
                tx_hash,
                status: effective.to_string(),
                revert_reason: status.revert_reason,
            });
        }
        Ok((tx_hash, amount_units))
    }

    /// The operator's serialized nonce lane.
    ///
    /// The fair mutex keeps submission order equal to arrival order. The
    /// counter is seeded from the chain on first use and advances before the
    /// submission, so an attempt that fails for non-nonce reasons still
    /// consumes its slot; only a detected desync resets the lane.
    async fn with_nonce(&self, call: ContractCall) -> Result<String, GatewayError> {
        let mut next_nonce = self.next_nonce.lock().await;
        let nonce = match *next_nonce {
            Some(nonce) => nonce,
            None => {
                let seeded = self.rpc.account_nonce().await?;
                tracing::debug!(nonce = seeded, "Seeded operator nonce from chain");
                seeded
            }
        };
        *next_nonce = Some(nonce + 1);

        match self.rpc.invoke(vec![call], nonce).await {
            Ok(tx_hash) => Ok(tx_hash),
            Err(e) => {
                if is_nonce_desync(&format!("{e:#}")) {
                    tracing::warn!(nonce, "Nonce desync, reseeding on next submission: {e:#}");
                    *next_nonce = None;
                }
                Err(GatewayError::Rpc(e))
            }
        }
    }
}

/// Accepts the phase as a felt (`0x1`), a bare number, or a name in any
/// case, since chain libraries disagree on how to render the enum.
fn parse_phase(raw: &str) -> Result<Phase, GatewayError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" => return Ok(Phase::None),
        "locked" => return Ok(Phase::Locked),
        "claimed" => return Ok(Phase::Claimed),
        "refunded" => return Ok(Phase::Refunded),
        _ => {}
    }
    let value = wire::felt_to_u64(raw)
        .map_err(|e| GatewayError::Malformed(format!("bad phase: {e}")))?;
    match value {
        0 => Ok(Phase::None),
        1 => Ok(Phase::Locked),
        2 => Ok(Phase::Claimed),
        3 => Ok(Phase::Refunded),
        other => Err(GatewayError::Malformed(format!("unknown phase {other}"))),
    }
}

fn is_nonce_desync(message: &str) -> bool {
    let message = message.to_lowercase();
    if !message.contains("nonce") {
        return false;
    }
    ["low", "used", "already", "invalid", "out of order"]
        .iter()
        .any(|marker| message.contains(marker))
}
