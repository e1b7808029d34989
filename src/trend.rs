use serde::Serialize;

use crate::config::TrendConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::WeeklyPoint;
use crate::stats::round_to;

const COMPARE_DECIMALS: i32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Deteriorating,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub is_significant: bool,
    pub weeks_used: usize,
    pub evaluations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrendOutcome {
    Available(TrendAnalysis),
    InsufficientData { weeks_used: usize, required: usize },
}

impl TrendOutcome {
    pub fn analysis(&self) -> Option<&TrendAnalysis> {
        match self {
            TrendOutcome::Available(analysis) => Some(analysis),
            TrendOutcome::InsufficientData { .. } => None,
        }
    }
}

struct LinearFit {
    slope: f64,
    intercept: f64,
    r_squared: f64,
}

fn fit(values: &[f64]) -> LinearFit {
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
    let intercept = mean_y - slope * mean_x;

    let (mut ss_res, mut ss_tot) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let predicted = intercept + slope * i as f64;
        ss_res += (y - predicted).powi(2);
        ss_tot += (y - mean_y).powi(2);
    }
    let r_squared = if ss_tot == 0.0 {
        0.0
    } else {
        1.0 - ss_res / ss_tot
    };

    LinearFit {
        slope,
        intercept,
        r_squared,
    }
}

/// Classify a weekly error-rate series.
///
/// Weeks without evaluations carry no signal and are dropped before fitting;
/// the remaining points are re-indexed `0..n` in their given order.
pub fn analyze(series: &[WeeklyPoint], config: &TrendConfig) -> EngineResult<TrendOutcome> {
    if let Some(bad) = series.iter().find(|p| !p.value.is_finite()) {
        return Err(EngineError::out_of_range(
            format!("weekly value (week {})", bad.week_index),
            bad.value,
            "a finite number",
        ));
    }

    let used: Vec<&WeeklyPoint> = series.iter().filter(|p| p.eval_count > 0).collect();
    if used.len() < config.min_points {
        return Ok(TrendOutcome::InsufficientData {
            weeks_used: used.len(),
            required: config.min_points,
        });
    }

    let values: Vec<f64> = used.iter().map(|p| p.value).collect();
    let LinearFit {
        slope,
        intercept,
        r_squared,
    } = fit(&values);

    // Strict thresholds, compared at a precision that drops float noise.
    let (cmp_slope, cmp_r_squared) = (
        round_to(slope, COMPARE_DECIMALS),
        round_to(r_squared, COMPARE_DECIMALS),
    );
    let direction = if cmp_slope < config.improving_slope {
        TrendDirection::Improving
    } else if cmp_slope > config.deteriorating_slope {
        TrendDirection::Deteriorating
    } else {
        TrendDirection::Stable
    };
    let is_significant =
        cmp_r_squared > config.min_r_squared && cmp_slope.abs() > config.min_abs_slope;

    Ok(TrendOutcome::Available(TrendAnalysis {
        direction,
        slope: round_to(slope, 3),
        intercept: round_to(intercept, 3),
        r_squared: round_to(r_squared, 3),
        is_significant,
        weeks_used: used.len(),
        evaluations: used.iter().map(|p| p.eval_count).sum(),
    }))
}
