use escrow_vault::u256::U256ParseError;
use escrow_vault::U256;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Largest byte chunk that fits a field element.
pub const BYTES_PER_FELT_WORD: usize = 31;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("invalid felt: {0}")]
    InvalidFelt(#[from] U256ParseError),
    #[error("u128 felt out of range: {0}")]
    FeltOutOfRange(String),
    #[error("result too short: wanted {wanted} felts, got {got}")]
    ResultTooShort { wanted: usize, got: usize },
}

/// Renders a big-endian byte slice as a minimal `0x`-hex felt.
pub fn bytes_to_felt_hex(bytes: &[u8]) -> String {
    let hex = hex::encode(bytes);
    let trimmed = hex.trim_start_matches('0');
    if trimmed.is_empty() {
        "0x0".to_string()
    } else {
        format!("0x{trimmed}")
    }
}

pub fn u64_to_felt_hex(value: u64) -> String {
    format!("0x{value:x}")
}

pub fn u128_to_felt_hex(value: u128) -> String {
    format!("0x{value:x}")
}

pub fn felt_to_u256(felt: &str) -> Result<U256, WireError> {
    Ok(U256::from_hex(felt)?)
}

pub fn felt_to_u128(felt: &str) -> Result<u128, WireError> {
    let value = felt_to_u256(felt)?;
    if value.high != 0 {
        return Err(WireError::FeltOutOfRange(felt.to_string()));
    }
    Ok(value.low)
}

pub fn felt_to_u64(felt: &str) -> Result<u64, WireError> {
    let value = felt_to_u128(felt)?;
    u64::try_from(value).map_err(|_| WireError::FeltOutOfRange(felt.to_string()))
}

/// u256 calldata: little-endian limb split, low felt first.
pub fn u256_calldata(value: U256) -> [String; 2] {
    [u128_to_felt_hex(value.low), u128_to_felt_hex(value.high)]
}

pub fn u256_from_felts(low: &str, high: &str) -> Result<U256, WireError> {
    Ok(U256 {
        low: felt_to_u128(low)?,
        high: felt_to_u128(high)?,
    })
}

/// Encodes a byte string as the Cairo byte-array calldata struct:
/// the number of full 31-byte words, the words themselves (big-endian),
/// the pending word holding the 0..=30 remaining bytes, and its length.
pub fn byte_array_calldata(bytes: &[u8]) -> Vec<String> {
    let full_words: Vec<&[u8]> = bytes.chunks_exact(BYTES_PER_FELT_WORD).collect();
    let pending = &bytes[full_words.len() * BYTES_PER_FELT_WORD..];

    let mut calldata = Vec::with_capacity(full_words.len() + 3);
    calldata.push(u64_to_felt_hex(full_words.len() as u64));
    for word in &full_words {
        calldata.push(bytes_to_felt_hex(word));
    }
    calldata.push(bytes_to_felt_hex(pending));
    calldata.push(u64_to_felt_hex(pending.len() as u64));
    calldata
}

/// Transaction status as reported by the chain, across the spellings the
/// chain library emits for finality and execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    AcceptedOnL1,
    AcceptedOnL2,
    Succeeded,
    Reverted,
    Rejected,
    Received,
    Pending,
    Other(String),
}

impl TxStatus {
    pub fn parse(s: &str) -> TxStatus {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACCEPTED_ON_L1" => TxStatus::AcceptedOnL1,
            "ACCEPTED_ON_L2" => TxStatus::AcceptedOnL2,
            "SUCCEEDED" => TxStatus::Succeeded,
            "REVERTED" => TxStatus::Reverted,
            "REJECTED" => TxStatus::Rejected,
            "RECEIVED" => TxStatus::Received,
            "PENDING" => TxStatus::Pending,
            other => TxStatus::Other(other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TxStatus::AcceptedOnL1 | TxStatus::AcceptedOnL2 | TxStatus::Succeeded
        )
    }

    /// Whether polling can stop.
    pub fn is_terminal(&self) -> bool {
        self.is_success() || matches!(self, TxStatus::Reverted | TxStatus::Rejected)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxStatus::AcceptedOnL1 => "ACCEPTED_ON_L1",
            TxStatus::AcceptedOnL2 => "ACCEPTED_ON_L2",
            TxStatus::Succeeded => "SUCCEEDED",
            TxStatus::Reverted => "REVERTED",
            TxStatus::Rejected => "REJECTED",
            TxStatus::Received => "RECEIVED",
            TxStatus::Pending => "PENDING",
            TxStatus::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// Raw status document returned for a transaction.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TransactionStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finality_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
}

impl TransactionStatus {
    /// Collapses finality and execution into one status. A reverted or
    /// rejected execution overrides finality, since a transaction can be
    /// accepted into a block and still have failed.
    pub fn effective(&self) -> TxStatus {
        if let Some(execution) = self.execution_status.as_deref().map(TxStatus::parse) {
            if matches!(execution, TxStatus::Reverted | TxStatus::Rejected) {
                return execution;
            }
        }
        if let Some(finality) = self.finality_status.as_deref().map(TxStatus::parse) {
            return finality;
        }
        self.execution_status
            .as_deref()
            .map(TxStatus::parse)
            .unwrap_or(TxStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn felt_hex_is_minimal() {
        assert_eq!(bytes_to_felt_hex(&[]), "0x0");
        assert_eq!(bytes_to_felt_hex(&[0, 0]), "0x0");
        assert_eq!(bytes_to_felt_hex(&[0, 1, 0x2a]), "0x102a");
        assert_eq!(u64_to_felt_hex(0), "0x0");
        assert_eq!(u128_to_felt_hex(255), "0xff");
    }

    #[test]
    fn u256_split_is_low_first() {
        let value = U256 { low: 0x2a, high: 0x1 };
        assert_eq!(u256_calldata(value), ["0x2a".to_string(), "0x1".to_string()]);
        assert_eq!(u256_from_felts("0x2a", "0x1").unwrap(), value);
    }

    #[test]
    fn felt_range_checks() {
        assert_eq!(felt_to_u64("0xff").unwrap(), 255);
        assert!(felt_to_u64(&format!("0x1{}", "0".repeat(16))).is_err());
        assert!(felt_to_u128(&format!("0x1{}", "0".repeat(32))).is_err());
        assert!(matches!(felt_to_u64("zz"), Err(WireError::InvalidFelt(_))));
    }

    #[test]
    fn short_preimage_encodes_as_pending_word_only() {
        // "ln-secret" is 9 bytes, below the 31-byte word size.
        let calldata = byte_array_calldata(b"ln-secret");
        assert_eq!(
            calldata,
            vec![
                "0x0".to_string(),
                "0x6c6e2d736563726574".to_string(),
                "0x9".to_string(),
            ]
        );
    }

    #[test]
    fn exact_word_preimage_has_empty_pending_word() {
        let bytes = [0x11u8; 31];
        let calldata = byte_array_calldata(&bytes);
        assert_eq!(calldata.len(), 4);
        assert_eq!(calldata[0], "0x1");
        assert_eq!(calldata[1], format!("0x{}", "11".repeat(31)));
        assert_eq!(calldata[2], "0x0");
        assert_eq!(calldata[3], "0x0");
    }

    #[test]
    fn typical_32_byte_preimage_splits_into_word_and_one_byte() {
        let mut bytes = [0xabu8; 32];
        bytes[31] = 0x07;
        let calldata = byte_array_calldata(&bytes);
        assert_eq!(calldata[0], "0x1");
        assert_eq!(calldata[1], format!("0x{}", "ab".repeat(31)));
        assert_eq!(calldata[2], "0x7");
        assert_eq!(calldata[3], "0x1");
    }

    #[test]
    fn status_parsing_is_case_insensitive_and_total() {
        assert_eq!(TxStatus::parse("accepted_on_l2"), TxStatus::AcceptedOnL2);
        assert!(TxStatus::parse("ACCEPTED_ON_L1").is_success());
        assert!(TxStatus::parse("SUCCEEDED").is_success());
        assert!(!TxStatus::parse("REVERTED").is_success());
        assert!(TxStatus::parse("REVERTED").is_terminal());
        assert!(!TxStatus::parse("PENDING").is_terminal());
        assert_eq!(
            TxStatus::parse("weird"),
            TxStatus::Other("WEIRD".to_string())
        );
    }

    #[test]
    fn execution_failure_overrides_finality() {
        let status = TransactionStatus {
            finality_status: Some("ACCEPTED_ON_L2".to_string()),
            execution_status: Some("REVERTED".to_string()),
            revert_reason: Some("NOT_LOCKED".to_string()),
        };
        assert_eq!(status.effective(), TxStatus::Reverted);

        let status = TransactionStatus {
            finality_status: Some("ACCEPTED_ON_L2".to_string()),
            execution_status: Some("SUCCEEDED".to_string()),
            revert_reason: None,
        };
        assert_eq!(status.effective(), TxStatus::AcceptedOnL2);

        assert_eq!(TransactionStatus::default().effective(), TxStatus::Pending);
    }
}
