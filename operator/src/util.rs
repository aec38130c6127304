use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid_payment_hash: {0}")]
pub struct InvalidPaymentHash(String);

/// Canonicalizes a payment hash to 64 lowercase hex chars without a prefix.
/// Every store lookup and chain call keys off this form.
pub fn canonical_payment_hash(input: &str) -> Result<String, InvalidPaymentHash> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.len() != 64 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(InvalidPaymentHash(format!(
            "expected 64 hex chars, got {input:?}"
        )));
    }
    Ok(digits.to_lowercase())
}

/// Seconds since epoch, clamped at zero.
pub fn unix_now() -> u64 {
    OffsetDateTime::now_utc().unix_timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_prefix_and_case() {
        let upper = format!("0X{}", "AB".repeat(32));
        assert_eq!(
            canonical_payment_hash(&upper).unwrap(),
            "ab".repeat(32)
        );
        let bare = "cd".repeat(32);
        assert_eq!(canonical_payment_hash(&bare).unwrap(), bare);
        assert_eq!(
            canonical_payment_hash(&format!("  {bare} ")).unwrap(),
            bare
        );
    }

    #[test]
    fn rejects_wrong_length_and_non_hex() {
        assert!(canonical_payment_hash("").is_err());
        assert!(canonical_payment_hash("abc").is_err());
        assert!(canonical_payment_hash(&"g".repeat(64)).is_err());
        assert!(canonical_payment_hash(&"a".repeat(63)).is_err());
        assert!(canonical_payment_hash(&"a".repeat(65)).is_err());
    }
}
