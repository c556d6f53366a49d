//! Risk model implementations: caps, leverage limits, drawdown halts.

use super::{PortfolioCtx, RiskModel, StageError};
use crate::domain::TargetPortfolio;
use rust_decimal::Decimal;

/// Pass-through risk stage.
pub struct NoRisk;

impl RiskModel for NoRisk {
    fn apply(
        &mut self,
        targets: TargetPortfolio,
        _ctx: &PortfolioCtx,
    ) -> Result<TargetPortfolio, StageError> {
        Ok(targets)
    }
}

/// Clamp each instrument's absolute weight to a cap.
pub struct MaxPositionWeight {
    pub cap: Decimal,
}

impl MaxPositionWeight {
    pub fn new(cap: Decimal) -> Self {
        Self { cap }
    }
}

impl RiskModel for MaxPositionWeight {
    fn apply(
        &mut self,
        targets: TargetPortfolio,
        _ctx: &PortfolioCtx,
    ) -> Result<TargetPortfolio, StageError> {
        Ok(targets
            .iter()
            .map(|(instrument, weight)| {
                let clamped = weight.clamp(-self.cap, self.cap);
                (instrument.clone(), clamped)
            })
            .collect())
    }
}

/// Scale the whole book down proportionally when gross exposure exceeds the
/// cap.
pub struct GrossLeverageCap {
    pub cap: Decimal,
}

impl GrossLeverageCap {
    pub fn new(cap: Decimal) -> Self {
        Self { cap }
    }
}

impl RiskModel for GrossLeverageCap {
    fn apply(
        &mut self,
        mut targets: TargetPortfolio,
        _ctx: &PortfolioCtx,
    ) -> Result<TargetPortfolio, StageError> {
        let gross = targets.gross_exposure();
        if gross > self.cap && gross > Decimal::ZERO {
            targets.scale(self.cap / gross);
        }
        Ok(targets)
    }
}

/// Halt trading (empty targets) once equity drawdown from its running peak
/// exceeds the limit. The halt latches for the rest of the run.
pub struct DrawdownHalt {
    pub max_drawdown: Decimal,
    peak: Option<Decimal>,
    halted: bool,
}

impl DrawdownHalt {
    pub fn new(max_drawdown: Decimal) -> Self {
        Self {
            max_drawdown,
            peak: None,
            halted: false,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }
}

impl RiskModel for DrawdownHalt {
    fn apply(
        &mut self,
        targets: TargetPortfolio,
        ctx: &PortfolioCtx,
    ) -> Result<TargetPortfolio, StageError> {
        let peak = self.peak.map_or(ctx.equity, |p| p.max(ctx.equity));
        self.peak = Some(peak);
        if !self.halted && peak > Decimal::ZERO {
            let drawdown = (peak - ctx.equity) / peak;
            if drawdown > self.max_drawdown {
                self.halted = true;
            }
        }
        if self.halted {
            Ok(TargetPortfolio::new())
        } else {
            Ok(targets)
        }
    }
}

/// Apply several risk models in order.
pub struct CompositeRisk {
    models: Vec<Box<dyn RiskModel>>,
}

impl CompositeRisk {
    pub fn new(models: Vec<Box<dyn RiskModel>>) -> Self {
        Self { models }
    }
}

impl RiskModel for CompositeRisk {
    fn apply(
        &mut self,
        mut targets: TargetPortfolio,
        ctx: &PortfolioCtx,
    ) -> Result<TargetPortfolio, StageError> {
        for model in &mut self.models {
            targets = model.apply(targets, ctx)?;
        }
        Ok(targets)
    }
}
