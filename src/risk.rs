use serde::Serialize;

use crate::config::TenureBandPolicy;
use crate::error::{EngineError, EngineResult};
use crate::models::{Rate, TenureBand};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenureAdjustment {
    pub tenure_months: u32,
    pub band: TenureBand,
    pub multiplier: f64,
}

pub fn tenure_adjustment(
    tenure_months: u32,
    bands: &[TenureBandPolicy],
) -> EngineResult<TenureAdjustment> {
    bands
        .iter()
        .rev()
        .find(|band| band.min_months <= tenure_months)
        .map(|band| TenureAdjustment {
            tenure_months,
            band: band.band,
            multiplier: band.multiplier,
        })
        .ok_or_else(|| EngineError::configuration("tenure bands", format!("{tenure_months} months")))
}

pub fn severity(shrunk: Rate, severity_weight: f64, adjustment: &TenureAdjustment) -> f64 {
    shrunk.value() * severity_weight * adjustment.multiplier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnginePolicy;

    #[test]
    fn bands_follow_expected_boundaries() {
        let bands = EnginePolicy::default().tenure_bands;
        let band = |months| tenure_adjustment(months, &bands).unwrap().band;
        assert_eq!(band(0), TenureBand::UnderThreeMonths);
        assert_eq!(band(2), TenureBand::UnderThreeMonths);
        assert_eq!(band(3), TenureBand::ThreeToSixMonths);
        assert_eq!(band(11), TenureBand::SixToTwelveMonths);
        assert_eq!(band(12), TenureBand::TwelveMonthsPlus);
        assert_eq!(band(240), TenureBand::TwelveMonthsPlus);
    }

    #[test]
    fn new_agents_carry_the_largest_multiplier() {
        let bands = EnginePolicy::default().tenure_bands;
        let new = tenure_adjustment(1, &bands).unwrap();
        let veteran = tenure_adjustment(30, &bands).unwrap();
        assert!(new.multiplier >= 1.0);
        assert!(new.multiplier > veteran.multiplier);
    }

    #[test]
    fn empty_band_table_is_a_configuration_error() {
        let err = tenure_adjustment(4, &[]).unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn severity_scales_shrunk_rate() {
        let adjustment = TenureAdjustment {
            tenure_months: 1,
            band: TenureBand::UnderThreeMonths,
            multiplier: 1.25,
        };
        let value = severity(Rate::new(0.2).unwrap(), 1.5, &adjustment);
        assert!((value - 0.375).abs() < 1e-12);
    }
}
