//! The operator service http surface.
//!
//! Trusted and meant to stay bound to localhost: requests are not
//! authenticated, the out-of-scope user frontend and the deployment's
//! tooling are the only expected callers. Put mTLS or a shared secret in
//! front before ever exposing it.

use crate::gateway::ChainGateway;
use crate::gateway::GatewayError;
use crate::issuance;
use crate::issuance::IssueError;
use crate::payment::ErrorClass;
use crate::payment::PaymentError;
use crate::payment::PaymentOrchestrator;
use crate::store::Store;
use crate::util::canonical_payment_hash;
use crate::AppError;
use axum::extract::State;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use cln_bridge::LnClient;
use escrow_vault::Address;
use escrow_vault::U256;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;

pub struct AppState {
    pub orchestrator: PaymentOrchestrator,
    pub gateway: Arc<ChainGateway>,
    pub store: Arc<Store>,
    pub cln: Arc<dyn LnClient>,
    pub tag_secret: Vec<u8>,
    pub invoice_expiry_seconds: u64,
}

pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/claim", post(post_claim))
        .route("/transfer", post(post_transfer))
        .route("/payments", post(post_payment))
        .route("/invoices", post(post_invoice))
        .with_state(app_state)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    ready: bool,
}

async fn get_health(State(state): State<Arc<AppState>>) -> Json<Health> {
    // Readiness is the store being reachable; the daemons are probed by
    // their first real call.
    let ready = state.store.read(|_| true);
    Json(Health {
        status: "ok",
        ready,
    })
}

#[derive(Deserialize)]
pub struct ClaimRequest {
    pub payment_hash: String,
    pub preimage_hex: String,
}

#[derive(Serialize)]
pub struct ClaimResponse {
    pub status: &'static str,
    pub tx_hash: String,
}

/// Manual claim with a known preimage, bypassing Lightning entirely.
async fn post_claim(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, AppError> {
    let hash = canonical_payment_hash(&request.payment_hash)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let preimage = hex::decode(request.preimage_hex.trim())
        .map_err(|e| AppError::BadRequest(format!("invalid_preimage: {e}")))?;

    let (tx_hash, _status) = state
        .gateway
        .submit_claim(&hash, &preimage)
        .await
        .map_err(claim_error)?;

    Ok(Json(ClaimResponse {
        status: "claimed",
        tx_hash,
    }))
}

fn claim_error(e: GatewayError) -> AppError {
    match e {
        GatewayError::NotLockedOnchain(_) | GatewayError::Malformed(_) => {
            AppError::BadRequest(format!("invalid_claim: {e}"))
        }
        other => AppError::InternalServerError(format!("claim_failed: {other}")),
    }
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub recipient_address: String,
    pub amount_sats: u64,
}

#[derive(Serialize)]
pub struct TransferResponse {
    pub status: &'static str,
    pub tx_hash: String,
    pub amount_units: U256,
}

async fn post_transfer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    let recipient = Address::parse(&request.recipient_address)
        .map_err(|e| AppError::BadRequest(format!("invalid_address: {e}")))?;
    if recipient.is_zero() {
        return Err(AppError::BadRequest("invalid_address: zero address".to_string()));
    }
    if request.amount_sats == 0 {
        return Err(AppError::BadRequest("invalid_amount: must be positive".to_string()));
    }

    let (tx_hash, amount_units) = state
        .gateway
        .submit_transfer(&recipient, request.amount_sats)
        .await
        .map_err(|e| match e {
            GatewayError::AmountZero | GatewayError::AmountOverflow { .. } => {
                AppError::BadRequest(format!("invalid_amount: {e}"))
            }
            other => AppError::InternalServerError(format!("transfer_failed: {other}")),
        })?;

    Ok(Json(TransferResponse {
        status: "sent",
        tx_hash,
        amount_units,
    }))
}

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub payment_hash: String,
    #[serde(default)]
    pub bolt11: Option<String>,
    /// Hash of the user's lock transaction, recorded for the audit trail.
    #[serde(default)]
    pub tx_hash: Option<String>,
}

/// The orchestrator entry point the user surface forwards to.
async fn post_payment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<crate::payment::PayOutcome>, AppError> {
    let outcome = state
        .orchestrator
        .process_payment_request(&request.payment_hash, request.bolt11, request.tx_hash)
        .await?;
    Ok(Json(outcome))
}

impl From<PaymentError> for AppError {
    fn from(e: PaymentError) -> Self {
        let message = format!("{e}");
        match e.class {
            ErrorClass::BadRequest => AppError::BadRequest(message),
            ErrorClass::Conflict => AppError::Conflict(message),
            ErrorClass::Internal => AppError::InternalServerError(message),
        }
    }
}

#[derive(Deserialize)]
pub struct IssueInvoiceRequest {
    pub user_id_b64: String,
    pub credit_address: String,
    pub amount_sats: u64,
}

#[derive(Serialize)]
pub struct IssueInvoiceResponse {
    pub label: String,
    pub bolt11: String,
    pub payment_hash: Option<String>,
}

async fn post_invoice(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IssueInvoiceRequest>,
) -> Result<Json<IssueInvoiceResponse>, AppError> {
    let record = issuance::issue_credit_invoice(
        &state.store,
        &state.cln,
        &state.tag_secret,
        state.invoice_expiry_seconds,
        &request.user_id_b64,
        &request.credit_address,
        request.amount_sats,
    )
    .await
    .map_err(|e| match e {
        IssueError::InvalidAddress(_) | IssueError::AmountZero => {
            AppError::BadRequest(e.to_string())
        }
        IssueError::Node(_) => AppError::InternalServerError(format!("{e}")),
    })?;

    Ok(Json(IssueInvoiceResponse {
        label: record.label,
        bolt11: record.bolt11,
        payment_hash: record.payment_hash,
    }))
}
