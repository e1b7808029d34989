use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::EnginePolicy;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    AgentInput, CategoryCount, CategoryId, CohortKey, DateRange, EvaluationRecord, Findings, Rate,
};
use crate::risk::{self, TenureAdjustment};
use crate::stats::{self, SignificanceOutcome};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTally {
    pub counts: BTreeMap<CategoryId, CategoryCount>,
    pub evaluations: u64,
    pub period: Option<DateRange>,
}

impl CategoryTally {
    fn record(&mut self, category: CategoryId, flagged: bool) {
        let entry = self.counts.entry(category).or_default();
        entry.evaluated += 1;
        if flagged {
            entry.flagged += 1;
        }
    }
}

pub type GroupRates = BTreeMap<CategoryId, Rate>;

fn findings_by_category(
    record: &EvaluationRecord,
    policy: &EnginePolicy,
) -> EngineResult<BTreeMap<CategoryId, bool>> {
    let mut outcome = BTreeMap::new();
    match &record.findings {
        Findings::Qc { failed } => {
            // Every reviewed call scores the full checklist.
            for category in policy.qc_item_categories.values() {
                outcome.insert(*category, false);
            }
            for item in failed {
                outcome.insert(policy.category_for_qc(*item)?, true);
            }
        }
        Findings::Qa { scores } => {
            for sub in scores {
                if !(sub.max.is_finite() && sub.max > 0.0) {
                    return Err(EngineError::out_of_range(
                        format!("qa max for {}", sub.item),
                        sub.max,
                        "a positive number",
                    ));
                }
                if !(sub.score.is_finite() && (0.0..=sub.max).contains(&sub.score)) {
                    return Err(EngineError::out_of_range(
                        format!("qa score for {}", sub.item),
                        sub.score,
                        "a value between 0 and the item maximum",
                    ));
                }
                let category = policy.category_for_qa(&sub.item)?;
                let lost_points = sub.score / sub.max < policy.qa_flag_ratio;
                *outcome.entry(category).or_insert(false) |= lost_points;
            }
        }
    }
    Ok(outcome)
}

pub fn tally_evaluations(
    agent_id: &str,
    records: &[EvaluationRecord],
    policy: &EnginePolicy,
) -> EngineResult<CategoryTally> {
    let mut tally = CategoryTally::default();
    for record in records {
        if record.agent_id != agent_id {
            return Err(EngineError::input(
                agent_id,
                format!("evaluation for agent '{}' in this agent's input", record.agent_id),
            ));
        }
        for (category, flagged) in findings_by_category(record, policy)? {
            tally.record(category, flagged);
        }
        tally.evaluations += 1;
        tally.period = Some(match tally.period {
            Some(range) => range.include(record.date),
            None => DateRange::single(record.date),
        });
    }
    Ok(tally)
}

pub fn tally_agent(input: &AgentInput, policy: &EnginePolicy) -> EngineResult<CategoryTally> {
    let mut tally = tally_evaluations(&input.agent_id, &input.evaluations, policy)?;

    for (category, count) in &input.category_counts {
        count.rate(&input.agent_id)?;
        tally
            .counts
            .entry(*category)
            .or_default()
            .add(*count, &input.agent_id)?;
    }
    let supplied_evaluations = input
        .category_counts
        .values()
        .map(|c| c.evaluated)
        .max()
        .unwrap_or(0);
    tally.evaluations = tally
        .evaluations
        .checked_add(supplied_evaluations)
        .ok_or_else(|| EngineError::input(&input.agent_id, "evaluation count overflows"))?;

    tally.period = match (tally.period, input.period) {
        (Some(observed), Some(declared)) => Some(observed.merge(declared)),
        (observed, declared) => observed.or(declared),
    };
    Ok(tally)
}

fn pool_tally(
    pooled: &mut BTreeMap<CategoryId, CategoryCount>,
    agent_id: &str,
    tally: &CategoryTally,
) -> EngineResult<()> {
    for (category, count) in &tally.counts {
        pooled.entry(*category).or_default().add(*count, agent_id)?;
    }
    Ok(())
}

/// Pooled category rates per cohort: Σ flagged / Σ evaluated over every
/// agent sharing the cohort key. A pool that cannot be formed fails only
/// its own cohort.
pub fn cohort_rates<'a>(
    tallies: impl IntoIterator<Item = (&'a str, &'a CohortKey, &'a CategoryTally)>,
) -> BTreeMap<CohortKey, EngineResult<GroupRates>> {
    let mut pooled: BTreeMap<CohortKey, EngineResult<BTreeMap<CategoryId, CategoryCount>>> =
        BTreeMap::new();
    for (agent_id, cohort, tally) in tallies {
        let slot = pooled
            .entry(cohort.clone())
            .or_insert_with(|| Ok(BTreeMap::new()));
        let outcome = match slot {
            Ok(counts) => pool_tally(counts, agent_id, tally),
            Err(_) => continue,
        };
        if let Err(err) = outcome {
            *slot = Err(err);
        }
    }

    pooled
        .into_iter()
        .map(|(cohort, counts)| {
            let subject = cohort.to_string();
            let rates = counts.and_then(|counts| {
                let mut group = GroupRates::new();
                for (category, count) in counts {
                    if let Some(rate) = count.rate(&subject)? {
                        group.insert(category, rate);
                    }
                }
                Ok(group)
            });
            (cohort, rates)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWeakness {
    pub category: CategoryId,
    pub display_name: String,
    pub evaluated: u64,
    pub flagged: u64,
    pub raw_rate: Rate,
    pub group_rate: Rate,
    pub shrunk_rate: Rate,
    pub z_score: f64,
    pub significant: bool,
    pub significance: SignificanceOutcome,
    pub severity_weight: f64,
    pub tenure_multiplier: f64,
    pub severity: f64,
}

pub fn assess_categories(
    agent_id: &str,
    tally: &CategoryTally,
    group_rates: &GroupRates,
    adjustment: &TenureAdjustment,
    policy: &EnginePolicy,
) -> EngineResult<Vec<CategoryWeakness>> {
    let mut assessed = Vec::new();
    for (category, count) in &tally.counts {
        let Some(raw_rate) = count.rate(agent_id)? else {
            continue;
        };
        let group_rate = *group_rates
            .get(category)
            .ok_or_else(|| EngineError::configuration("group rates", category))?;
        let category_policy = policy.category(*category)?;

        let shrunk_rate = stats::shrink(raw_rate, count.evaluated, group_rate, policy.prior_weight);
        let significance = stats::test_worse_than_group(
            raw_rate,
            group_rate,
            count.evaluated,
            &policy.significance,
        );

        assessed.push(CategoryWeakness {
            category: *category,
            display_name: category_policy.display_name.clone(),
            evaluated: count.evaluated,
            flagged: count.flagged,
            raw_rate,
            group_rate,
            shrunk_rate,
            z_score: significance.z_score,
            significant: significance.significant,
            significance: significance.outcome,
            severity_weight: category_policy.severity_weight,
            tenure_multiplier: adjustment.multiplier,
            severity: risk::severity(shrunk_rate, category_policy.severity_weight, adjustment),
        });
    }
    Ok(assessed)
}
