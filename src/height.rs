//! Arbitrary-precision block heights
//!
//! Block heights are unbounded non-negative integers and eventually exceed
//! 64 bits. All arithmetic and comparison goes through [`BlockHeight`];
//! heights are carried as decimal strings on both wire edges (source rows
//! and the progress store), so nothing in the pipeline ever narrows them.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::error::Error;

/// A block height: unbounded, non-negative, totally ordered.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHeight(BigUint);

impl BlockHeight {
    /// Height zero (the genesis sentinel in the progress store).
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// Whether this is height zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The next height.
    pub fn succ(&self) -> Self {
        Self(&self.0 + 1u32)
    }

    /// Lossy conversion for metrics gauges.
    ///
    /// Prometheus gauges are f64; above 2^53 this loses precision. That is
    /// acceptable for monitoring only - replication logic never uses it.
    pub fn as_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::MAX)
    }
}

impl FromStr for BlockHeight {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<BigUint>()
            .map(Self)
            .map_err(|_| Error::HeightParse { input: s.into() })
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHeight({})", self.0)
    }
}

impl From<u64> for BlockHeight {
    fn from(h: u64) -> Self {
        Self(BigUint::from(h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_and_display() {
        let h: BlockHeight = "12345".parse().unwrap();
        assert_eq!(h.to_string(), "12345");

        let h: BlockHeight = "0".parse().unwrap();
        assert!(h.is_zero());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<BlockHeight>().is_err());
        assert!("-1".parse::<BlockHeight>().is_err());
        assert!("12.5".parse::<BlockHeight>().is_err());
        assert!("0x10".parse::<BlockHeight>().is_err());
    }

    #[test]
    fn test_succ_and_order() {
        let h: BlockHeight = "99".parse().unwrap();
        assert_eq!(h.succ().to_string(), "100");
        assert!(h < h.succ());
        assert_eq!(BlockHeight::from(99), h);
    }

    #[test]
    fn test_exceeds_u64() {
        // 2^128; must round-trip and order correctly well past 64 bits
        let big: BlockHeight = "340282366920938463463374607431768211456".parse().unwrap();
        assert_eq!(
            big.succ().to_string(),
            "340282366920938463463374607431768211457"
        );
        assert!(BlockHeight::from(u64::MAX) < big);
    }

    #[test]
    fn test_as_f64_is_monotone_at_small_heights() {
        assert_eq!(BlockHeight::from(42).as_f64(), 42.0);
        assert!(BlockHeight::from(41).as_f64() < BlockHeight::from(42).as_f64());
    }

    proptest! {
        #[test]
        fn prop_decimal_roundtrip(n in any::<u64>()) {
            let h = BlockHeight::from(n);
            let parsed: BlockHeight = h.to_string().parse().unwrap();
            prop_assert_eq!(parsed, h);
        }

        #[test]
        fn prop_succ_increases(n in any::<u64>()) {
            let h = BlockHeight::from(n);
            prop_assert!(h.succ() > h);
        }
    }
}
