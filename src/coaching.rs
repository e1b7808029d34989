use std::cmp::Ordering;

use serde::Serialize;

use crate::category::CategoryWeakness;
use crate::config::{EnginePolicy, TierAggregate, TierPolicy};
use crate::error::{EngineError, EngineResult};
use crate::models::{CategoryId, CoachingTier, DateRange};
use crate::risk::TenureAdjustment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanOutcome {
    NoAction,
    Action { tier: CoachingTier },
}

impl PlanOutcome {
    pub fn tier(&self) -> Option<CoachingTier> {
        match self {
            PlanOutcome::NoAction => None,
            PlanOutcome::Action { tier } => Some(*tier),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub rank: usize,
    pub category: CategoryId,
    pub tier: CoachingTier,
    pub text: String,
    pub flagged: u64,
    pub evaluated: u64,
    pub severity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEvidence {
    pub evaluations: u64,
    pub period: Option<DateRange>,
    pub tenure: TenureAdjustment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCoachingPlan {
    pub agent_id: String,
    pub outcome: PlanOutcome,
    pub aggregate_severity: f64,
    pub weaknesses: Vec<CategoryWeakness>,
    pub assessments: Vec<CategoryWeakness>,
    pub prescriptions: Vec<Prescription>,
    pub evidence: PlanEvidence,
}

fn rank_order(a: &CategoryWeakness, b: &CategoryWeakness) -> Ordering {
    b.severity
        .total_cmp(&a.severity)
        .then_with(|| b.evaluated.cmp(&a.evaluated))
        .then_with(|| a.category.cmp(&b.category))
}

pub fn rank_weaknesses(assessed: &[CategoryWeakness]) -> Vec<CategoryWeakness> {
    let mut ranked: Vec<CategoryWeakness> =
        assessed.iter().filter(|w| w.significant).cloned().collect();
    ranked.sort_by(rank_order);
    ranked
}

pub fn aggregate_severity(ranked: &[CategoryWeakness], tiers: &TierPolicy) -> f64 {
    match tiers.aggregate {
        TierAggregate::Top => ranked.first().map(|w| w.severity).unwrap_or(0.0),
        TierAggregate::SumTopN => ranked
            .iter()
            .take(tiers.aggregate_n)
            .map(|w| w.severity)
            .sum(),
    }
}

/// Highest tier whose threshold the aggregate reaches; a value sitting
/// exactly on a threshold takes that (more urgent) tier. Below every
/// threshold falls back to the lowest configured tier.
pub fn assign_tier(aggregate: f64, tiers: &TierPolicy) -> EngineResult<CoachingTier> {
    let lowest = tiers
        .thresholds
        .first()
        .ok_or_else(|| EngineError::configuration("coaching tiers", "lowest tier"))?;
    Ok(tiers
        .thresholds
        .iter()
        .rev()
        .find(|t| aggregate >= t.min_severity)
        .unwrap_or(lowest)
        .tier)
}

pub fn render_prescription(template: &str, weakness: &CategoryWeakness) -> String {
    template
        .replace("{category}", &weakness.display_name)
        .replace(
            "{rate}",
            &format!("{:.1}%", weakness.raw_rate.value() * 100.0),
        )
        .replace("{flagged}", &weakness.flagged.to_string())
        .replace("{evaluated}", &weakness.evaluated.to_string())
}

pub fn build_plan(
    agent_id: &str,
    assessments: Vec<CategoryWeakness>,
    evidence: PlanEvidence,
    policy: &EnginePolicy,
) -> EngineResult<AgentCoachingPlan> {
    let weaknesses = rank_weaknesses(&assessments);

    if weaknesses.is_empty() {
        return Ok(AgentCoachingPlan {
            agent_id: agent_id.to_string(),
            outcome: PlanOutcome::NoAction,
            aggregate_severity: 0.0,
            weaknesses,
            assessments,
            prescriptions: Vec::new(),
            evidence,
        });
    }

    let aggregate = aggregate_severity(&weaknesses, &policy.tiers);
    let tier = assign_tier(aggregate, &policy.tiers)?;

    let prescriptions = weaknesses
        .iter()
        .take(policy.tiers.top_n)
        .enumerate()
        .map(|(index, weakness)| {
            let template = policy.prescription(weakness.category, tier)?;
            Ok(Prescription {
                rank: index + 1,
                category: weakness.category,
                tier,
                text: render_prescription(template, weakness),
                flagged: weakness.flagged,
                evaluated: weakness.evaluated,
                severity: weakness.severity,
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

    Ok(AgentCoachingPlan {
        agent_id: agent_id.to_string(),
        outcome: PlanOutcome::Action { tier },
        aggregate_severity: aggregate,
        weaknesses,
        assessments,
        prescriptions,
        evidence,
    })
}
