use serde::de;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use std::fmt;

/// A normalized on-chain address: `0x` followed by lowercase hex digits with
/// leading zeros stripped. The all-zero address normalizes to `0x0`.
///
/// Normalizing at the boundary lets addresses from user input, the chain and
/// the persistent store compare with plain equality.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("empty address")]
    Empty,
    #[error("address longer than 64 hex digits: {0}")]
    TooLong(usize),
    #[error("invalid hex digit {0:?} in address")]
    InvalidDigit(char),
}

impl Address {
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() {
            return Err(AddressError::Empty);
        }
        if digits.len() > 64 {
            return Err(AddressError::TooLong(digits.len()));
        }
        if let Some(c) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidDigit(c));
        }
        let trimmed = digits.trim_start_matches('0');
        let digits = if trimmed.is_empty() { "0" } else { trimmed };
        Ok(Address(format!("0x{}", digits.to_lowercase())))
    }

    pub fn zero() -> Self {
        Address("0x0".to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == "0x0"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_prefix_and_leading_zeros() {
        let a = Address::parse("0X00ABCdef").unwrap();
        assert_eq!(a.as_str(), "0xabcdef");
        assert_eq!(a, Address::parse("abcdef").unwrap());
        assert_eq!(Address::parse("0x000").unwrap(), Address::zero());
    }

    #[test]
    fn zero_is_detected() {
        assert!(Address::parse("0x0").unwrap().is_zero());
        assert!(!Address::parse("0x1").unwrap().is_zero());
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(Address::parse(""), Err(AddressError::Empty));
        assert_eq!(Address::parse("0x"), Err(AddressError::Empty));
        assert_eq!(Address::parse("0xzz"), Err(AddressError::InvalidDigit('z')));
        assert!(matches!(
            Address::parse(&"1".repeat(65)),
            Err(AddressError::TooLong(65))
        ));
        // 64 digits (66 chars with the prefix) is the maximum.
        assert!(Address::parse(&format!("0x{}", "1".repeat(64))).is_ok());
    }
}
