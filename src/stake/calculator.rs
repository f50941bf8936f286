use crate::config::StakeConfig;
use crate::models::MultiplierPair;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for stake calculations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StakeError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid wagered total: {0}")]
    InvalidTotal(Decimal),
}

/// Result type for stake calculations
pub type StakeResult<T> = Result<T, StakeError>;

/// Calculator constants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeParams {
    pub base: Decimal,
    pub min: Decimal,
    pub max: Decimal,
    pub sensitivity: Decimal,
    pub easing: Decimal,
}

impl StakeParams {
    pub fn validate(&self) -> StakeResult<()> {
        if self.min <= Decimal::ZERO || self.min > self.base || self.base > self.max {
            return Err(StakeError::InvalidParameters(format!(
                "expected 0 < min <= base <= max, got min={} base={} max={}",
                self.min, self.base, self.max
            )));
        }
        if self.sensitivity < Decimal::ZERO {
            return Err(StakeError::InvalidParameters("sensitivity must not be negative".into()));
        }
        if self.easing <= Decimal::ZERO || self.easing > Decimal::ONE {
            return Err(StakeError::InvalidParameters("easing must be in (0, 1]".into()));
        }
        Ok(())
    }
}

impl From<&StakeConfig> for StakeParams {
    fn from(config: &StakeConfig) -> Self {
        Self {
            base: config.base,
            min: config.min,
            max: config.max,
            sensitivity: config.sensitivity,
            easing: config.easing,
        }
    }
}

impl Default for StakeParams {
    fn default() -> Self {
        Self::from(&StakeConfig::default())
    }
}

/// Full-precision multiplier values carried between recalculations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplierState {
    pub for_value: Decimal,
    pub against_value: Decimal,
}

impl MultiplierState {
    pub fn seeded(base: Decimal) -> Self {
        Self {
            for_value: base,
            against_value: base,
        }
    }

    /// Two-decimal pair for display and for locking into bets
    pub fn display(&self) -> MultiplierPair {
        MultiplierPair::new(round_display(self.for_value), round_display(self.against_value))
    }
}

impl From<MultiplierPair> for MultiplierState {
    fn from(pair: MultiplierPair) -> Self {
        Self {
            for_value: pair.for_multiplier,
            against_value: pair.against_multiplier,
        }
    }
}

fn round_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Maps total volume wagered on an option to an eased multiplier pair.
///
/// Volume tilts both sides regardless of which side it was wagered on:
/// `for` drifts toward `min` and `against` toward `max` as volume grows.
#[derive(Debug, Clone)]
pub struct StakeCalculator {
    params: StakeParams,
}

impl StakeCalculator {
    pub fn new(params: StakeParams) -> StakeResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &StakeParams {
        &self.params
    }

    /// Pair published for an option nobody has wagered on
    pub fn neutral(&self) -> MultiplierPair {
        MultiplierPair::neutral(self.params.base)
    }

    /// Un-eased target for a wagered total
    pub fn target(&self, total_wagered: Decimal) -> StakeResult<MultiplierState> {
        if total_wagered < Decimal::ZERO {
            return Err(StakeError::InvalidTotal(total_wagered));
        }

        let p = &self.params;
        if total_wagered.is_zero() {
            return Ok(MultiplierState::seeded(p.base));
        }

        // An overflowing shift pins both sides to their bounds
        let shift = p
            .sensitivity
            .checked_mul(total_wagered)
            .unwrap_or(p.max - p.min);

        Ok(MultiplierState {
            for_value: self.clamp(p.base.checked_sub(shift).unwrap_or(p.min)),
            against_value: self.clamp(p.base.checked_add(shift).unwrap_or(p.max)),
        })
    }

    /// Ease from `previous` toward the target for `total_wagered`.
    /// `previous` of `None` seeds from `base`.
    pub fn next(
        &self,
        total_wagered: Decimal,
        previous: Option<MultiplierState>,
    ) -> StakeResult<MultiplierState> {
        let target = self.target(total_wagered)?;
        let previous = previous.unwrap_or_else(|| MultiplierState::seeded(self.params.base));

        Ok(MultiplierState {
            for_value: self.ease(previous.for_value, target.for_value),
            against_value: self.ease(previous.against_value, target.against_value),
        })
    }

    fn ease(&self, previous: Decimal, target: Decimal) -> Decimal {
        // previous may predate a bounds change, so clamp after easing too
        self.clamp(previous + (target - previous) * self.params.easing)
    }

    fn clamp(&self, value: Decimal) -> Decimal {
        value.max(self.params.min).min(self.params.max)
    }
}

impl Default for StakeCalculator {
    fn default() -> Self {
        Self {
            params: StakeParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn calculator(sensitivity: &str, easing: &str) -> StakeCalculator {
        StakeCalculator::new(StakeParams {
            base: dec("2.00"),
            min: dec("1.05"),
            max: dec("10.00"),
            sensitivity: dec(sensitivity),
            easing: dec(easing),
        })
        .unwrap()
    }

    #[test]
    fn test_zero_volume_targets_base() {
        let calc = calculator("0.001", "0.2");
        let target = calc.target(Decimal::ZERO).unwrap();
        assert_eq!(target, MultiplierState::seeded(dec("2.00")));
    }

    #[test]
    fn test_target_tilts_and_clamps() {
        let calc = calculator("0.001", "1");
        let target = calc.target(dec("500")).unwrap();
        assert_eq!(target.for_value, dec("1.50"));
        assert_eq!(target.against_value, dec("2.50"));

        let saturated = calc.target(dec("100000")).unwrap();
        assert_eq!(saturated.for_value, dec("1.05"));
        assert_eq!(saturated.against_value, dec("10.00"));
    }

    #[test]
    fn test_easing_moves_fraction_of_gap() {
        let calc = calculator("0.001", "0.2");
        // First computation seeds from base: 2 + (1.5 - 2) * 0.2 = 1.9
        let first = calc.next(dec("500"), None).unwrap();
        assert_eq!(first.for_value, dec("1.9"));
        assert_eq!(first.against_value, dec("2.1"));

        // 1.9 + (1.5 - 1.9) * 0.2 = 1.82
        let second = calc.next(dec("500"), Some(first)).unwrap();
        assert_eq!(second.display().for_multiplier, dec("1.82"));
        assert_eq!(second.display().against_multiplier, dec("2.18"));
    }

    #[test]
    fn test_display_keeps_internal_precision() {
        let calc = calculator("0.001", "0.3");
        let state = calc.next(dec("333"), None).unwrap();
        // 2 - 0.333 * 0.3 = 1.9001
        assert_eq!(state.for_value, dec("1.9001"));
        assert_eq!(state.display().for_multiplier, dec("1.90"));
    }

    #[test]
    fn test_bounds_hold_for_extreme_totals() {
        let calc = calculator("0.5", "1");
        for total in ["0", "1", "7", "1000", "79228162514264337593543950"] {
            let state = calc.next(dec(total), None).unwrap().display();
            assert!(state.for_multiplier >= dec("1.05") && state.for_multiplier <= dec("10.00"));
            assert!(state.against_multiplier >= dec("1.05") && state.against_multiplier <= dec("10.00"));
        }
    }

    #[test]
    fn test_out_of_bounds_previous_is_clamped() {
        let calc = calculator("0.001", "0.1");
        let stale = MultiplierState {
            for_value: dec("0.50"),
            against_value: dec("25"),
        };
        let state = calc.next(Decimal::ZERO, Some(stale)).unwrap();
        assert!(state.for_value >= dec("1.05"));
        assert!(state.against_value <= dec("10.00"));
    }

    #[test]
    fn test_negative_total_rejected() {
        let calc = calculator("0.001", "0.2");
        assert_eq!(calc.target(dec("-1")), Err(StakeError::InvalidTotal(dec("-1"))));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = StakeParams {
            easing: Decimal::ZERO,
            ..StakeParams::default()
        };
        assert!(StakeCalculator::new(params).is_err());
    }
}
