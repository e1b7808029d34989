use serde::Serialize;

use crate::config::SignificanceConfig;
use crate::models::Rate;

/// Pull an observed rate toward the cohort prior.
///
/// `prior_weight` acts as an equivalent sample size for the prior: with
/// `n == prior_weight` the observation and the prior count equally.
/// `n == 0` returns the prior unchanged.
pub fn shrink(observed: Rate, n: u64, prior: Rate, prior_weight: f64) -> Rate {
    if n == 0 {
        return prior;
    }
    let n = n as f64;
    let shrunk = (n * observed.value() + prior_weight * prior.value()) / (n + prior_weight);
    Rate::clamped(shrunk)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceOutcome {
    Tested,
    InsufficientSample,
    DegenerateGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignificanceResult {
    pub z_score: f64,
    pub significant: bool,
    pub outcome: SignificanceOutcome,
}

pub fn test_worse_than_group(
    individual: Rate,
    group: Rate,
    n: u64,
    config: &SignificanceConfig,
) -> SignificanceResult {
    if n < config.min_sample {
        return SignificanceResult {
            z_score: 0.0,
            significant: false,
            outcome: SignificanceOutcome::InsufficientSample,
        };
    }

    let g = group.value();
    let se = (g * (1.0 - g) / n as f64).sqrt();
    if se == 0.0 {
        let significant = individual.value() > g;
        return SignificanceResult {
            z_score: if significant { config.degenerate_z } else { 0.0 },
            significant,
            outcome: SignificanceOutcome::DegenerateGroup,
        };
    }

    let z = (individual.value() - g) / se;
    SignificanceResult {
        z_score: round_to(z, 2),
        significant: z > config.z_threshold,
        outcome: SignificanceOutcome::Tested,
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
