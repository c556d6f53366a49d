use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Data granularity, ordered finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Resolution {
    Tick,
    Minute,
    Hour,
    Day,
}

impl Resolution {
    /// Duration of one aggregation interval. Ticks have no interval.
    pub fn interval(&self) -> chrono::Duration {
        match self {
            Resolution::Tick => chrono::Duration::zero(),
            Resolution::Minute => chrono::Duration::minutes(1),
            Resolution::Hour => chrono::Duration::hours(1),
            Resolution::Day => chrono::Duration::days(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Equity,
    Option,
    Future,
    Forex,
    Crypto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    Call,
    Put,
}

/// A tradable instrument. Immutable once constructed; equality and ordering
/// cover all fields so instruments key ordered maps deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub expiry: Option<NaiveDate>,
    pub strike: Option<Decimal>,
    pub right: Option<OptionRight>,
    pub currency: String,
    /// Decimal places of the quoted price (price rounding target).
    pub quote_precision: u32,
}

impl Instrument {
    pub fn equity(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class: AssetClass::Equity,
            expiry: None,
            strike: None,
            right: None,
            currency: "USD".to_string(),
            quote_precision: 2,
        }
    }

    pub fn crypto(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class: AssetClass::Crypto,
            expiry: None,
            strike: None,
            right: None,
            currency: "USD".to_string(),
            quote_precision: 8,
        }
    }

    pub fn option(
        symbol: impl Into<String>,
        expiry: NaiveDate,
        strike: Decimal,
        right: OptionRight,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class: AssetClass::Option,
            expiry: Some(expiry),
            strike: Some(strike),
            right: Some(right),
            currency: "USD".to_string(),
            quote_precision: 2,
        }
    }

    /// Stable identity hash, used as the secondary sort key when events tie
    /// on timestamp. BLAKE3-based so the value is identical across runs and
    /// platforms.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.symbol.as_bytes());
        hasher.update(&[self.asset_class as u8]);
        if let Some(expiry) = self.expiry {
            hasher.update(expiry.to_string().as_bytes());
        }
        if let Some(strike) = self.strike {
            hasher.update(strike.to_string().as_bytes());
        }
        if let Some(right) = self.right {
            hasher.update(&[right as u8]);
        }
        hasher.update(self.currency.as_bytes());
        let hash = hasher.finalize();
        u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap())
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn resolution_ordering_finest_first() {
        assert!(Resolution::Tick < Resolution::Minute);
        assert!(Resolution::Minute < Resolution::Hour);
        assert!(Resolution::Hour < Resolution::Day);
    }

    #[test]
    fn equality_covers_all_fields() {
        let spy = Instrument::equity("SPY");
        let spy2 = Instrument::equity("SPY");
        assert_eq!(spy, spy2);

        let call = Instrument::option(
            "SPY",
            NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            dec!(450),
            OptionRight::Call,
        );
        let put = Instrument::option(
            "SPY",
            NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            dec!(450),
            OptionRight::Put,
        );
        assert_ne!(call, put);
    }

    #[test]
    fn stable_hash_is_deterministic() {
        let a = Instrument::equity("SPY");
        let b = Instrument::equity("SPY");
        assert_eq!(a.stable_hash(), b.stable_hash());
        assert_ne!(a.stable_hash(), Instrument::equity("QQQ").stable_hash());
    }
}
