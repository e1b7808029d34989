use std::collections::BTreeMap;

use chrono::NaiveDate;

use qc_coaching_engine::coaching::PlanOutcome;
use qc_coaching_engine::config::{EnginePolicy, SignificanceConfig, TrendConfig};
use qc_coaching_engine::models::{
    AgentInput, CategoryId, CoachingTier, CohortKey, EvaluationRecord, Findings, QcItem, Rate,
    SlaInput, TenureBand, WeeklyPoint,
};
use qc_coaching_engine::sla::{self, GradeBand};
use qc_coaching_engine::stats::{shrink, test_worse_than_group};
use qc_coaching_engine::trend::{analyze, TrendDirection, TrendOutcome};
use qc_coaching_engine::{run_batch, EngineError};

fn cohort() -> CohortKey {
    CohortKey {
        center: "manila".to_string(),
        service: "collections".to_string(),
        channel: "voice".to_string(),
    }
}

fn calls(agent_id: &str, total: u32, failing: &[(u32, QcItem)]) -> Vec<EvaluationRecord> {
    (0..total)
        .map(|i| {
            let failed = failing
                .iter()
                .filter(|(call, _)| *call == i)
                .map(|(_, item)| *item)
                .collect();
            EvaluationRecord {
                agent_id: agent_id.to_string(),
                date: NaiveDate::from_ymd_opt(2026, 6, 1 + (i % 28)).unwrap(),
                cohort: cohort(),
                findings: Findings::Qc { failed },
            }
        })
        .collect()
}

fn agent(agent_id: &str, tenure_months: u32, evaluations: Vec<EvaluationRecord>) -> AgentInput {
    AgentInput {
        agent_id: agent_id.to_string(),
        cohort: cohort(),
        tenure_months,
        period: None,
        category_counts: BTreeMap::new(),
        evaluations,
        weekly_series: Vec::new(),
        sla: None,
        criteria_metrics: BTreeMap::new(),
    }
}

#[test]
fn shrinkage_worked_example() {
    let shrunk = shrink(Rate::new(0.20).unwrap(), 4, Rate::new(0.05).unwrap(), 10.0);
    assert!((shrunk.value() - 0.129).abs() < 5e-4);
}

#[test]
fn flat_series_worked_example() {
    let series: Vec<WeeklyPoint> = (0..3)
        .map(|i| WeeklyPoint {
            week_index: i,
            value: 5.0,
            eval_count: 10,
        })
        .collect();
    match analyze(&series, &TrendConfig::default()).unwrap() {
        TrendOutcome::Available(analysis) => {
            assert_eq!(analysis.slope, 0.0);
            assert_eq!(analysis.direction, TrendDirection::Stable);
            assert!(!analysis.is_significant);
        }
        other => panic!("expected a trend, got {other:?}"),
    }
}

#[test]
fn z_test_worked_examples() {
    let config = SignificanceConfig::default();
    let worse = test_worse_than_group(
        Rate::new(0.30).unwrap(),
        Rate::new(0.10).unwrap(),
        20,
        &config,
    );
    assert_eq!(worse.z_score, 2.98);
    assert!(worse.significant);

    let thin = test_worse_than_group(Rate::new(0.9).unwrap(), Rate::new(0.10).unwrap(), 2, &config);
    assert!(!thin.significant);
    assert_eq!(thin.z_score, 0.0);
}

#[test]
fn grade_band_worked_example() {
    let bands: Vec<GradeBand> = [("C", 70.0), ("B", 80.0), ("A", 90.0)]
        .into_iter()
        .map(|(grade, min_score)| GradeBand {
            grade: grade.to_string(),
            min_score,
        })
        .collect();
    assert_eq!(sla::grade_for(92.0, &bands).unwrap(), "A");
}

#[test]
fn evaluations_flow_through_to_a_ranked_plan() {
    let mut inputs = Vec::new();
    for peer in 0..6 {
        inputs.push(agent(
            &format!("peer-{peer}"),
            20,
            calls(&format!("peer-{peer}"), 30, &[(3, QcItem::CallNotes)]),
        ));
    }
    let struggling: Vec<(u32, QcItem)> = (0..12)
        .map(|i| (i, QcItem::IdentityCheck))
        .chain((0..8).map(|i| (i + 12, QcItem::CallNotes)))
        .collect();
    inputs.push(agent("new-hire", 2, calls("new-hire", 30, &struggling)));

    let batch = run_batch(&inputs, &EnginePolicy::default());
    assert!(batch.failures.is_empty());

    let report = batch
        .reports
        .iter()
        .find(|r| r.agent_id == "new-hire")
        .unwrap();
    let plan = &report.plan;
    assert_eq!(plan.outcome, PlanOutcome::Action { tier: CoachingTier::Intensive });
    assert_eq!(plan.evidence.evaluations, 30);
    assert_eq!(plan.evidence.tenure.band, TenureBand::UnderThreeMonths);
    let period = plan.evidence.period.unwrap();
    assert_eq!(period.start, NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
    assert_eq!(period.end, NaiveDate::from_ymd_opt(2026, 6, 28).unwrap());

    let ranked: Vec<CategoryId> = plan.weaknesses.iter().map(|w| w.category).collect();
    assert_eq!(
        ranked,
        vec![CategoryId::IdentityVerification, CategoryId::Documentation]
    );
    assert_eq!(plan.prescriptions.len(), 2);
    assert_eq!(plan.assessments.len(), CategoryId::ALL.len());

    for peer in batch.reports.iter().filter(|r| r.agent_id != "new-hire") {
        assert_eq!(peer.plan.outcome, PlanOutcome::NoAction);
    }
}

#[test]
fn sla_breakdown_is_always_attached() {
    let mut input = agent("a-1", 14, calls("a-1", 10, &[]));
    input.sla = Some(SlaInput {
        subject: "a-1".to_string(),
        period: "2026-06".to_string(),
        metrics: [
            ("answer_rate", 0.90),
            ("aht_seconds", 330.0),
            ("schedule_adherence", 0.92),
            ("qa_score", 88.0),
            ("qc_error_rate", 0.04),
            ("critical_errors", 1.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect(),
    });

    let batch = run_batch(&[input], &EnginePolicy::default());
    let result = batch.reports[0].sla.as_ref().unwrap();
    assert_eq!(result.productivity.details.len(), 3);
    assert_eq!(result.quality.details.len(), 2);
    assert_eq!(result.deductions.len(), 1);
    assert_eq!(result.deductions[0].rule_id, "critical_error");
    let detail_sum: f64 = result
        .productivity
        .details
        .iter()
        .chain(&result.quality.details)
        .map(|d| d.points_earned)
        .sum();
    assert!((detail_sum - result.subtotal).abs() < 0.011);
    assert!((result.composite - (result.subtotal - 5.0)).abs() < 1e-9);
}

#[test]
fn custom_policy_tables_drive_the_outcome() {
    let mut policy = EnginePolicy::default();
    policy.significance.min_sample = 1_000;

    let inputs = vec![
        agent("a-1", 20, calls("a-1", 30, &[])),
        agent(
            "a-2",
            20,
            calls("a-2", 30, &(0..20).map(|i| (i, QcItem::DeadAir)).collect::<Vec<_>>()),
        ),
    ];
    let batch = run_batch(&inputs, &policy);
    assert!(batch
        .reports
        .iter()
        .all(|r| r.plan.outcome == PlanOutcome::NoAction));
}

#[test]
fn incomplete_policy_fails_only_the_affected_agent() {
    let mut policy = EnginePolicy::default();
    policy.qc_item_categories.remove(&QcItem::DeadAir);

    let inputs = vec![
        agent("clean", 20, calls("clean", 10, &[])),
        agent("dead-air", 20, calls("dead-air", 10, &[(0, QcItem::DeadAir)])),
    ];
    let batch = run_batch(&inputs, &policy);
    assert_eq!(batch.reports.len(), 1);
    assert_eq!(batch.reports[0].agent_id, "clean");
    assert_eq!(batch.failures[0].agent_id, "dead-air");
    assert_eq!(
        batch.failures[0].message,
        EngineError::configuration("qc item categories", QcItem::DeadAir).to_string()
    );
}
