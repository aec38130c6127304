use lightning_invoice::Bolt11Invoice;
use std::str::FromStr;

/// The fields the bridge needs out of a BOLT11 invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInvoice {
    /// 64 lowercase hex chars, no prefix.
    pub payment_hash: String,
    pub amount_msat: u64,
    pub amount_sats: u64,
    /// Invoice creation time, seconds since epoch.
    pub created_at: u64,
    pub expires_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Bolt11Error {
    #[error("invalid bolt11 invoice: {0}")]
    Invalid(String),
    /// Zero-amount (donation style) invoices cannot be bridged.
    #[error("invoice carries no amount")]
    MissingAmount,
    #[error("invoice amount {0} msat is not a whole satoshi")]
    FractionalSats(u64),
}

/// Strictly decodes a BOLT11 string. The signature is verified by the
/// decoder; amountless and fractional-sat invoices are rejected.
pub fn decode(bolt11: &str) -> Result<DecodedInvoice, Bolt11Error> {
    let invoice = Bolt11Invoice::from_str(bolt11.trim())
        .map_err(|e| Bolt11Error::Invalid(e.to_string()))?;
    let amount_msat = invoice
        .amount_milli_satoshis()
        .filter(|msat| *msat > 0)
        .ok_or(Bolt11Error::MissingAmount)?;
    if amount_msat % 1_000 != 0 {
        return Err(Bolt11Error::FractionalSats(amount_msat));
    }
    let created_at = invoice.duration_since_epoch().as_secs();
    let expires_at = created_at.saturating_add(invoice.expiry_time().as_secs());
    Ok(DecodedInvoice {
        payment_hash: invoice.payment_hash().to_string(),
        amount_msat,
        amount_sats: amount_msat / 1_000,
        created_at,
        expires_at,
    })
}
