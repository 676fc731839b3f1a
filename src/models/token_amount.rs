use std::fmt;
use std::ops::Add;
use std::ops::Div;
use std::ops::Mul;
use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::Zero;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

/// atto-units per whole coin
pub const ATTO_PER_FIL: u64 = 1_000_000_000_000_000_000;

/// A non-negative amount of the native token, in atto units.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(BigUint);

impl TokenAmount {
    pub fn from_atto(atto: impl Into<BigUint>) -> Self {
        Self(atto.into())
    }

    pub fn from_whole(fil: u64) -> Self {
        Self(BigUint::from(fil) * BigUint::from(ATTO_PER_FIL))
    }

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn atto(&self) -> &BigUint {
        &self.0
    }

    /// Parse a decimal coin amount such as `"0.5"`, `"2"` or `"1.5 FIL"`.
    pub fn parse_fil(input: &str) -> Result<Self, String> {
        let trimmed = input.trim();
        let number = trimmed
            .strip_suffix("FIL")
            .or_else(|| trimmed.strip_suffix("fil"))
            .unwrap_or(trimmed)
            .trim();
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(format!("invalid amount: {:?}", input));
        }
        if fraction.len() > 18 {
            return Err(format!("too many decimal places in {:?}", input));
        }
        let whole: BigUint = if whole.is_empty() {
            BigUint::zero()
        } else {
            whole
                .parse()
                .map_err(|_| format!("invalid amount: {:?}", input))?
        };
        let fraction_atto: BigUint = if fraction.is_empty() {
            BigUint::zero()
        } else {
            let padded = format!("{:0<18}", fraction);
            padded
                .parse()
                .map_err(|_| format!("invalid amount: {:?}", input))?
        };
        Ok(Self(whole * BigUint::from(ATTO_PER_FIL) + fraction_atto))
    }

    /// Whole-coin representation with trailing zeros trimmed, e.g. `1.25 FIL`.
    pub fn to_fil_string(&self) -> String {
        let per = BigUint::from(ATTO_PER_FIL);
        let whole = &self.0 / &per;
        let rest = &self.0 % &per;
        if rest.is_zero() {
            return format!("{} FIL", whole);
        }
        let fraction = format!("{:0>18}", rest.to_string());
        format!("{}.{} FIL", whole, fraction.trim_end_matches('0'))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenAmount({})", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = String;

    /// Parses an integer atto amount.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<BigUint>()
            .map(Self)
            .map_err(|e| format!("invalid atto amount {:?}: {}", s, e))
    }
}

impl From<u64> for TokenAmount {
    fn from(atto: u64) -> Self {
        Self(BigUint::from(atto))
    }
}

impl Add for &TokenAmount {
    type Output = TokenAmount;
    fn add(self, rhs: Self) -> TokenAmount {
        TokenAmount(&self.0 + &rhs.0)
    }
}

impl Mul<u64> for &TokenAmount {
    type Output = TokenAmount;
    fn mul(self, rhs: u64) -> TokenAmount {
        TokenAmount(&self.0 * BigUint::from(rhs))
    }
}

/// Integer division, rounding down.
impl Div<u64> for &TokenAmount {
    type Output = TokenAmount;
    fn div(self, rhs: u64) -> TokenAmount {
        TokenAmount(&self.0 / BigUint::from(rhs))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(&self.0)
        } else {
            serializer.serialize_bytes(&self.0.to_bytes_be())
        }
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes: serde_bytes_compat::ByteBuf = Deserialize::deserialize(deserializer)?;
            Ok(Self(BigUint::from_bytes_be(&bytes.0)))
        }
    }
}

// Accepts both a byte string and a sequence of u8, so the same type decodes
// from cbor and bincode alike.
mod serde_bytes_compat {
    use std::fmt;

    use serde::de;
    use serde::Deserialize;
    use serde::Deserializer;

    pub(super) struct ByteBuf(pub(super) Vec<u8>);

    impl<'de> Deserialize<'de> for ByteBuf {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            struct Visitor;

            impl<'de> de::Visitor<'de> for Visitor {
                type Value = ByteBuf;

                fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    f.write_str("big-endian integer bytes")
                }

                fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<ByteBuf, E> {
                    Ok(ByteBuf(v.to_vec()))
                }

                fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<ByteBuf, E> {
                    Ok(ByteBuf(v))
                }

                fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<ByteBuf, A::Error> {
                    let mut bytes = Vec::new();
                    while let Some(b) = seq.next_element::<u8>()? {
                        bytes.push(b);
                    }
                    Ok(ByteBuf(bytes))
                }
            }

            deserializer.deserialize_byte_buf(Visitor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fil_handles_fractions() {
        assert_eq!(TokenAmount::from_whole(2), TokenAmount::parse_fil("2").unwrap());
        assert_eq!(
            TokenAmount::from(500_000_000_000_000_000),
            TokenAmount::parse_fil("0.5 FIL").unwrap()
        );
        assert_eq!(
            TokenAmount::from(1),
            TokenAmount::parse_fil("0.000000000000000001").unwrap()
        );
        assert!(TokenAmount::parse_fil("0.0000000000000000001").is_err());
        assert!(TokenAmount::parse_fil("abc").is_err());
        assert!(TokenAmount::parse_fil(".").is_err());
    }

    #[test]
    fn fil_string_trims_trailing_zeros() {
        assert_eq!("1.25 FIL", TokenAmount::parse_fil("1.25").unwrap().to_fil_string());
        assert_eq!("3 FIL", TokenAmount::from_whole(3).to_fil_string());
    }

    #[test]
    fn arithmetic_rounds_down() {
        let amount = TokenAmount::from(11);
        assert_eq!(TokenAmount::from(2), &amount / 5);
        assert_eq!(TokenAmount::from(66), &amount * 6);
    }

    #[test]
    fn serde_round_trips_in_all_formats() {
        let amount = TokenAmount::from_whole(1_000_000);
        assert_eq!(
            amount,
            serde_json::from_str(&serde_json::to_string(&amount).unwrap()).unwrap()
        );
        assert_eq!(
            amount,
            serde_cbor::from_slice(&serde_cbor::to_vec(&amount).unwrap()).unwrap()
        );
        assert_eq!(
            amount,
            bincode::deserialize(&bincode::serialize(&amount).unwrap()).unwrap()
        );
    }
}
