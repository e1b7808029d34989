use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::category::{self, CategoryTally, GroupRates};
use crate::coaching::{self, AgentCoachingPlan, PlanEvidence};
use crate::config::EnginePolicy;
use crate::criteria::{self, UnderperformingCriterionResult};
use crate::error::{EngineError, EngineResult};
use crate::models::{AgentInput, CohortKey};
use crate::risk;
use crate::sla::{self, SlaResult};
use crate::trend::{self, TrendOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Trend,
    Sla,
    Criteria,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReport {
    pub agent_id: String,
    pub cohort: CohortKey,
    pub plan: AgentCoachingPlan,
    pub trend: Option<TrendOutcome>,
    pub sla: Option<SlaResult>,
    pub criteria: Vec<UnderperformingCriterionResult>,
    pub underperforming: bool,
    pub stage_failures: Vec<StageFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFailure {
    pub agent_id: String,
    pub kind: String,
    pub message: String,
}

impl AgentFailure {
    fn new(agent_id: &str, err: &EngineError) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub reports: Vec<AgentReport>,
    pub failures: Vec<AgentFailure>,
}

fn keep_stage<T>(
    agent_id: &str,
    stage: Stage,
    result: EngineResult<T>,
    failures: &mut Vec<StageFailure>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(agent_id, ?stage, kind = err.kind(), "stage skipped: {err}");
            failures.push(StageFailure {
                stage,
                kind: err.kind().to_string(),
                message: err.to_string(),
            });
            None
        }
    }
}

/// Run every stage for one agent against pre-computed cohort rates.
///
/// Only the coaching plan is fatal for the agent. Trend, SLA and criteria
/// failures land in `stage_failures` next to the plan.
pub fn evaluate_agent(
    input: &AgentInput,
    tally: &CategoryTally,
    group_rates: &GroupRates,
    policy: &EnginePolicy,
) -> EngineResult<AgentReport> {
    let agent_id = input.agent_id.as_str();

    let adjustment = risk::tenure_adjustment(input.tenure_months, &policy.tenure_bands)?;
    let assessments =
        category::assess_categories(agent_id, tally, group_rates, &adjustment, policy)?;
    let evidence = PlanEvidence {
        evaluations: tally.evaluations,
        period: tally.period,
        tenure: adjustment,
    };
    let plan = coaching::build_plan(agent_id, assessments, evidence, policy)?;
    debug!(
        agent_id,
        outcome = ?plan.outcome,
        flagged = plan.weaknesses.len(),
        "coaching plan built"
    );

    let mut stage_failures = Vec::new();

    let trend = if input.weekly_series.is_empty() {
        None
    } else {
        keep_stage(
            agent_id,
            Stage::Trend,
            trend::analyze(&input.weekly_series, &policy.trend),
            &mut stage_failures,
        )
    };

    let sla = input.sla.as_ref().and_then(|metrics| {
        let center = input.cohort.center.as_str();
        let scored = policy
            .sla
            .for_center(center)
            .and_then(|config| sla::score(center, metrics, config));
        keep_stage(agent_id, Stage::Sla, scored, &mut stage_failures)
    });

    let criteria = if input.criteria_metrics.is_empty() {
        Vec::new()
    } else {
        keep_stage(
            agent_id,
            Stage::Criteria,
            criteria::evaluate(&policy.criteria, &input.criteria_metrics),
            &mut stage_failures,
        )
        .unwrap_or_default()
    };
    let underperforming = criteria::is_underperforming(&criteria);

    Ok(AgentReport {
        agent_id: input.agent_id.clone(),
        cohort: input.cohort.clone(),
        plan,
        trend,
        sla,
        criteria,
        underperforming,
        stage_failures,
    })
}

pub fn run_batch(inputs: &[AgentInput], policy: &EnginePolicy) -> BatchReport {
    if let Err(err) = policy.validate() {
        warn!(agents = inputs.len(), "policy rejected: {err}");
        return BatchReport {
            reports: Vec::new(),
            failures: inputs
                .iter()
                .map(|input| AgentFailure::new(&input.agent_id, &err))
                .collect(),
        };
    }

    let tallies: Vec<EngineResult<CategoryTally>> = inputs
        .par_iter()
        .map(|input| category::tally_agent(input, policy))
        .collect();

    // Agents whose counts cannot be read are left out of the cohort pool too.
    let pooled = inputs.iter().zip(&tallies).filter_map(|(input, tally)| {
        tally
            .as_ref()
            .ok()
            .map(|t| (input.agent_id.as_str(), &input.cohort, t))
    });
    let cohorts = category::cohort_rates(pooled);

    run_with_rates(inputs, tallies, &cohorts, policy)
}

fn run_with_rates(
    inputs: &[AgentInput],
    tallies: Vec<EngineResult<CategoryTally>>,
    cohorts: &BTreeMap<CohortKey, EngineResult<GroupRates>>,
    policy: &EnginePolicy,
) -> BatchReport {
    let empty = GroupRates::new();
    let outcomes: Vec<EngineResult<AgentReport>> = inputs
        .par_iter()
        .zip(tallies.into_par_iter())
        .map(|(input, tally)| {
            let tally = tally?;
            let rates = match cohorts.get(&input.cohort) {
                Some(Ok(rates)) => rates,
                Some(Err(err)) => return Err(err.clone()),
                None => &empty,
            };
            evaluate_agent(input, &tally, rates, policy)
        })
        .collect();

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for (input, outcome) in inputs.iter().zip(outcomes) {
        match outcome {
            Ok(report) => reports.push(report),
            Err(err) => {
                warn!(agent_id = %input.agent_id, kind = err.kind(), "agent skipped: {err}");
                failures.push(AgentFailure::new(&input.agent_id, &err));
            }
        }
    }

    info!(
        agents = inputs.len(),
        reports = reports.len(),
        failures = failures.len(),
        "batch complete"
    );
    BatchReport { reports, failures }
}
