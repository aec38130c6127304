use serde::de;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde_json::Value;
use std::fmt;

/// A millisatoshi amount as reported by the node.
///
/// The REST api is not consistent about the shape of amount fields: the same
/// field arrives as an integer, a digit string, or a `"123msat"` suffixed
/// string depending on the node version. Deserialization accepts all of
/// them; the ambiguity stops here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MsatAmount(u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fractional_sats: {0} msat is not a whole satoshi")]
pub struct FractionalSats(pub u64);

impl MsatAmount {
    pub fn from_msat(msat: u64) -> Self {
        MsatAmount(msat)
    }

    pub fn msat(self) -> u64 {
        self.0
    }

    /// Converts to satoshis, failing unless the amount is a whole-sat
    /// multiple.
    pub fn to_sats(self) -> Result<u64, FractionalSats> {
        if self.0 % 1_000 != 0 {
            return Err(FractionalSats(self.0));
        }
        Ok(self.0 / 1_000)
    }
}

/// Parses `^(\d+)(msat)?$` case-insensitively, then falls back to the digits
/// contained in the string.
pub fn parse_msat_str(s: &str) -> Option<u64> {
    let lowered = s.trim().to_ascii_lowercase();
    let digits = lowered.strip_suffix("msat").unwrap_or(&lowered);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(msat) = digits.parse() {
            return Some(msat);
        }
    }
    let fallback: String = lowered.chars().filter(char::is_ascii_digit).collect();
    if fallback.is_empty() {
        return None;
    }
    fallback.parse().ok()
}

impl fmt::Display for MsatAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}msat", self.0)
    }
}

impl Serialize for MsatAmount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for MsatAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_u64()
                .map(MsatAmount)
                .ok_or_else(|| de::Error::custom(format!("amount out of range: {n}"))),
            Value::String(s) => parse_msat_str(&s)
                .map(MsatAmount)
                .ok_or_else(|| de::Error::custom(format!("unparseable msat amount {s:?}"))),
            other => Err(de::Error::custom(format!(
                "msat amount must be a number or string, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        amount_msat: MsatAmount,
    }

    #[test]
    fn accepts_integer_string_and_suffixed_forms() {
        for json in [
            r#"{"amount_msat": 250000000}"#,
            r#"{"amount_msat": "250000000"}"#,
            r#"{"amount_msat": "250000000msat"}"#,
            r#"{"amount_msat": "250000000MSAT"}"#,
        ] {
            let w: Wrapper = serde_json::from_str(json).unwrap();
            assert_eq!(w.amount_msat.msat(), 250_000_000, "input {json}");
        }
    }

    #[test]
    fn falls_back_to_embedded_digits() {
        assert_eq!(parse_msat_str("approx 12msat "), Some(12));
        assert_eq!(parse_msat_str("msat"), None);
        assert_eq!(parse_msat_str(""), None);
    }

    #[test]
    fn rejects_non_amount_shapes() {
        assert!(serde_json::from_str::<Wrapper>(r#"{"amount_msat": -5}"#).is_err());
        assert!(serde_json::from_str::<Wrapper>(r#"{"amount_msat": {}}"#).is_err());
        assert!(serde_json::from_str::<Wrapper>(r#"{"amount_msat": "sats"}"#).is_err());
    }

    #[test]
    fn sat_conversion_requires_whole_sats() {
        assert_eq!(MsatAmount::from_msat(5_000_000).to_sats(), Ok(5_000));
        assert_eq!(
            MsatAmount::from_msat(5_000_001).to_sats(),
            Err(FractionalSats(5_000_001))
        );
    }
}
