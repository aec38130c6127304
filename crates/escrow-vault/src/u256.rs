use serde::de;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use std::cmp::Ordering;
use std::fmt;

/// Unsigned 256-bit integer as two little-endian u128 limbs.
///
/// Token amounts and payment hashes share this representation: amounts
/// compare high limb first, hashes bind to SHA-256 output through the
/// big-endian byte order of [`U256::from_be_bytes`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct U256 {
    pub low: u128,
    pub high: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum U256ParseError {
    #[error("empty hex string")]
    Empty,
    #[error("hex string longer than 64 digits: {0}")]
    TooLong(usize),
    #[error("invalid hex digit {0:?}")]
    InvalidDigit(char),
}

impl U256 {
    pub const ZERO: U256 = U256 { low: 0, high: 0 };

    pub fn is_zero(&self) -> bool {
        self.low == 0 && self.high == 0
    }

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        let mut high = [0u8; 16];
        let mut low = [0u8; 16];
        high.copy_from_slice(&bytes[..16]);
        low.copy_from_slice(&bytes[16..]);
        U256 {
            low: u128::from_be_bytes(low),
            high: u128::from_be_bytes(high),
        }
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[..16].copy_from_slice(&self.high.to_be_bytes());
        out[16..].copy_from_slice(&self.low.to_be_bytes());
        out
    }

    /// Parses a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, U256ParseError> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() {
            return Err(U256ParseError::Empty);
        }
        if digits.len() > 64 {
            return Err(U256ParseError::TooLong(digits.len()));
        }
        let mut value = U256::ZERO;
        for c in digits.chars() {
            let nibble = c.to_digit(16).ok_or(U256ParseError::InvalidDigit(c))? as u128;
            value = U256 {
                low: (value.low << 4) | nibble,
                high: (value.high << 4) | (value.low >> 124),
            };
        }
        Ok(value)
    }

    pub fn checked_add(self, rhs: U256) -> Option<U256> {
        let (low, carry) = self.low.overflowing_add(rhs.low);
        let high = self.high.checked_add(rhs.high)?;
        let high = high.checked_add(carry as u128)?;
        Some(U256 { low, high })
    }

    pub fn checked_sub(self, rhs: U256) -> Option<U256> {
        if self < rhs {
            return None;
        }
        let (low, borrow) = self.low.overflowing_sub(rhs.low);
        let high = self.high - rhs.high - borrow as u128;
        Some(U256 { low, high })
    }

    pub fn checked_mul_u64(self, rhs: u64) -> Option<U256> {
        let limbs = [
            self.low as u64,
            (self.low >> 64) as u64,
            self.high as u64,
            (self.high >> 64) as u64,
        ];
        let mut out = [0u64; 4];
        let mut carry: u128 = 0;
        for (i, limb) in limbs.iter().enumerate() {
            let wide = *limb as u128 * rhs as u128 + carry;
            out[i] = wide as u64;
            carry = wide >> 64;
        }
        if carry != 0 {
            return None;
        }
        Some(U256 {
            low: out[0] as u128 | (out[1] as u128) << 64,
            high: out[2] as u128 | (out[3] as u128) << 64,
        })
    }

    /// `self * 10^exp`, or `None` on overflow.
    pub fn checked_mul_pow10(self, exp: u32) -> Option<U256> {
        // 10^19 is the largest power of ten that fits a u64.
        const POW10_19: u64 = 10_000_000_000_000_000_000;
        let mut value = self;
        let mut exp = exp;
        while exp >= 19 {
            value = value.checked_mul_u64(POW10_19)?;
            exp -= 19;
        }
        if exp > 0 {
            value = value.checked_mul_u64(10u64.pow(exp))?;
        }
        Some(value)
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> Self {
        U256 {
            low: value as u128,
            high: 0,
        }
    }
}

impl From<u128> for U256 {
    fn from(value: u128) -> Self {
        U256 {
            low: value,
            high: 0,
        }
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.high
            .cmp(&other.high)
            .then(self.low.cmp(&other.low))
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.high == 0 {
            write!(f, "0x{:x}", self.low)
        } else {
            write!(f, "0x{:x}{:032x}", self.high, self.low)
        }
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for U256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        U256::from_hex(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_high_limb_first() {
        let small = U256 { low: u128::MAX, high: 0 };
        let big = U256 { low: 0, high: 1 };
        assert!(small < big);
        assert!(U256::from(5u64) < U256::from(6u64));
        assert_eq!(U256::from(7u64).cmp(&U256::from(7u64)), Ordering::Equal);
    }

    #[test]
    fn be_bytes_round_trip() {
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let value = U256::from_be_bytes(bytes);
        assert_eq!(value.to_be_bytes(), bytes);
        // First byte is the most significant.
        assert_eq!(value.high >> 120, 0);
        assert_eq!(U256::from_be_bytes([0xff; 32]).high, u128::MAX);
    }

    #[test]
    fn parses_hex_with_and_without_prefix() {
        assert_eq!(U256::from_hex("0x2a").unwrap(), U256::from(42u64));
        assert_eq!(U256::from_hex("2A").unwrap(), U256::from(42u64));
        let full = "f".repeat(64);
        assert_eq!(
            U256::from_hex(&full).unwrap(),
            U256 { low: u128::MAX, high: u128::MAX }
        );
        assert_eq!(U256::from_hex(""), Err(U256ParseError::Empty));
        assert_eq!(U256::from_hex("0x"), Err(U256ParseError::Empty));
        assert!(matches!(
            U256::from_hex(&"f".repeat(65)),
            Err(U256ParseError::TooLong(65))
        ));
        assert_eq!(U256::from_hex("xyz"), Err(U256ParseError::InvalidDigit('x')));
    }

    #[test]
    fn display_round_trips_through_from_hex() {
        let value = U256 { low: 7, high: 3 };
        assert_eq!(value.to_string(), "0x300000000000000000000000000000007");
        assert_eq!(U256::from_hex(&value.to_string()).unwrap(), value);
    }

    #[test]
    fn checked_add_and_sub() {
        let a = U256 { low: u128::MAX, high: 0 };
        let sum = a.checked_add(U256::from(1u64)).unwrap();
        assert_eq!(sum, U256 { low: 0, high: 1 });
        assert_eq!(sum.checked_sub(U256::from(1u64)).unwrap(), a);
        assert_eq!(U256::from(1u64).checked_sub(U256::from(2u64)), None);
        let max = U256 { low: u128::MAX, high: u128::MAX };
        assert_eq!(max.checked_add(U256::from(1u64)), None);
    }

    #[test]
    fn scales_sats_to_token_units() {
        // 18-decimal token: 1 sat = 10^10 units.
        let units = U256::from(5_000u64).checked_mul_pow10(10).unwrap();
        assert_eq!(units, U256::from(50_000_000_000_000u64));
        // 8-decimal token keeps sats as-is.
        assert_eq!(
            U256::from(123u64).checked_mul_pow10(0).unwrap(),
            U256::from(123u64)
        );
        // 69 decimal places on a large amount overflows.
        let max = U256 { low: u128::MAX, high: u128::MAX };
        assert_eq!(max.checked_mul_pow10(1), None);
        assert!(U256::from(u64::MAX).checked_mul_pow10(57).is_some());
        assert_eq!(U256::from(u64::MAX).checked_mul_pow10(69), None);
    }

    #[test]
    fn serde_uses_hex_strings() {
        let value = U256::from(0xdeadbeefu64);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"0xdeadbeef\"");
        assert_eq!(serde_json::from_str::<U256>(&json).unwrap(), value);
    }
}
