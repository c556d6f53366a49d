//! Exchange/regulatory fees and slippage price adjustment.

use super::{FeeComponent, FillDraft, PriceAdjustment};
use crate::domain::{OrderSide, Position};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Notional-based regulatory fee, optionally sell-side only.
#[derive(Debug, Clone, Copy)]
pub struct RegulatoryFee {
    pub bps: Decimal,
    pub sell_only: bool,
}

impl RegulatoryFee {
    pub fn sell_side(bps: Decimal) -> Self {
        Self { bps, sell_only: true }
    }

    pub fn both_sides(bps: Decimal) -> Self {
        Self { bps, sell_only: false }
    }
}

impl FeeComponent for RegulatoryFee {
    fn fee(&self, draft: &FillDraft, _position: Option<&Position>) -> Decimal {
        if self.sell_only && draft.side == OrderSide::Buy {
            return Decimal::ZERO;
        }
        draft.price * draft.size * self.bps / dec!(10000)
    }

    fn name(&self) -> &'static str {
        "regulatory_fee"
    }
}

/// Directional basis-point slippage: buys pay up, sells receive less.
#[derive(Debug, Clone, Copy)]
pub struct BpsSlippage {
    pub bps: Decimal,
}

impl BpsSlippage {
    pub fn new(bps: Decimal) -> Self {
        Self { bps }
    }
}

impl PriceAdjustment for BpsSlippage {
    fn adjust(&self, draft: &FillDraft) -> Decimal {
        let fraction = self.bps / dec!(10000);
        match draft.side {
            OrderSide::Buy => draft.price * (Decimal::ONE + fraction),
            OrderSide::Sell => draft.price * (Decimal::ONE - fraction),
        }
    }

    fn name(&self) -> &'static str {
        "bps_slippage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Instrument, MarketSnapshot};

    fn draft(side: OrderSide) -> FillDraft {
        FillDraft {
            instrument: Instrument::equity("SPY"),
            side,
            price: dec!(100),
            size: dec!(1000),
            snapshot: MarketSnapshot::default(),
            arrival_price: None,
        }
    }

    #[test]
    fn sell_side_fee_skips_buys() {
        let fee = RegulatoryFee::sell_side(dec!(0.8));
        assert_eq!(fee.fee(&draft(OrderSide::Buy), None), Decimal::ZERO);
        assert_eq!(fee.fee(&draft(OrderSide::Sell), None), dec!(8.0000));
    }

    #[test]
    fn slippage_is_directional() {
        let slip = BpsSlippage::new(dec!(10));
        assert_eq!(slip.adjust(&draft(OrderSide::Buy)), dec!(100.10));
        assert_eq!(slip.adjust(&draft(OrderSide::Sell)), dec!(99.90));
    }
}
