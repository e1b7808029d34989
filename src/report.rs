use std::collections::BTreeMap;
use std::fmt::Write;

use crate::batch::{AgentReport, BatchReport};
use crate::coaching::PlanOutcome;
use crate::criteria::CriterionStatus;
use crate::trend::TrendOutcome;

#[derive(Debug, Clone, PartialEq)]
pub struct TierSummary {
    pub label: String,
    pub count: usize,
    pub avg_severity: f64,
}

pub fn summarize_by_tier(reports: &[AgentReport]) -> Vec<TierSummary> {
    let mut map: BTreeMap<String, (usize, f64)> = BTreeMap::new();

    for report in reports {
        let label = match report.plan.outcome {
            PlanOutcome::NoAction => "no action".to_string(),
            PlanOutcome::Action { tier } => tier.to_string(),
        };
        let entry = map.entry(label).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += report.plan.aggregate_severity;
    }

    let mut summaries: Vec<TierSummary> = map
        .into_iter()
        .map(|(label, (count, total_severity))| TierSummary {
            label,
            count,
            avg_severity: if count == 0 {
                0.0
            } else {
                total_severity / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    summaries
}

fn trend_line(trend: &Option<TrendOutcome>) -> String {
    match trend {
        None => "no weekly series supplied".to_string(),
        Some(TrendOutcome::InsufficientData {
            weeks_used,
            required,
        }) => format!("not available ({weeks_used} of {required} weeks)"),
        Some(TrendOutcome::Available(analysis)) => format!(
            "{:?} (slope {:.3}, R² {:.2}{}) over {} weeks",
            analysis.direction,
            analysis.slope,
            analysis.r_squared,
            if analysis.is_significant {
                ", significant"
            } else {
                ""
            },
            analysis.weeks_used
        ),
    }
}

fn write_agent(output: &mut String, report: &AgentReport) {
    let plan = &report.plan;
    let _ = writeln!(output, "### {} ({})", report.agent_id, report.cohort);

    let evidence = &plan.evidence;
    let period = evidence
        .period
        .map(|p| format!("{} to {}", p.start, p.end))
        .unwrap_or_else(|| "period not supplied".to_string());
    let _ = writeln!(
        output,
        "- Evidence: {} evaluations, {}, tenure {} months (x{:.2})",
        evidence.evaluations, period, evidence.tenure.tenure_months, evidence.tenure.multiplier
    );

    match plan.outcome {
        PlanOutcome::NoAction => {
            let _ = writeln!(output, "- Plan: no action");
        }
        PlanOutcome::Action { tier } => {
            let _ = writeln!(
                output,
                "- Plan: {} (aggregate severity {:.3})",
                tier, plan.aggregate_severity
            );
            for weakness in &plan.weaknesses {
                let _ = writeln!(
                    output,
                    "  - {}: {}/{} flagged, shrunk {:.1}% vs cohort {:.1}%, z {:.2}, severity {:.3}",
                    weakness.display_name,
                    weakness.flagged,
                    weakness.evaluated,
                    weakness.shrunk_rate.value() * 100.0,
                    weakness.group_rate.value() * 100.0,
                    weakness.z_score,
                    weakness.severity
                );
            }
            for prescription in &plan.prescriptions {
                let _ = writeln!(output, "  {}. {}", prescription.rank, prescription.text);
            }
        }
    }

    let _ = writeln!(output, "- Trend: {}", trend_line(&report.trend));

    if let Some(sla) = &report.sla {
        let _ = writeln!(
            output,
            "- SLA {}: {:.2} ({}), productivity {:.2}/{:.0}, quality {:.2}/{:.0}",
            sla.period,
            sla.composite,
            sla.grade,
            sla.productivity.earned,
            sla.productivity.allocated,
            sla.quality.earned,
            sla.quality.allocated
        );
        for detail in sla.productivity.details.iter().chain(&sla.quality.details) {
            let _ = writeln!(
                output,
                "  - {}: {} vs target {} -> {:.2}/{:.0}",
                detail.metric, detail.actual, detail.target, detail.points_earned, detail.points_allocated
            );
        }
        for deduction in &sla.deductions {
            let _ = writeln!(
                output,
                "  - deduction {}: -{:.2} ({})",
                deduction.rule_id, deduction.points, deduction.description
            );
        }
    }

    for failure in &report.stage_failures {
        let _ = writeln!(
            output,
            "- {:?} not available [{}]: {}",
            failure.stage, failure.kind, failure.message
        );
    }

    let flagged: Vec<String> = report
        .criteria
        .iter()
        .filter(|c| c.status != CriterionStatus::Met)
        .map(|c| format!("{} {:?}", c.rule_id, c.status))
        .collect();
    if !flagged.is_empty() {
        let _ = writeln!(output, "- Criteria: {}", flagged.join(", "));
    }
    let _ = writeln!(output);
}

pub fn build_report(title: &str, batch: &BatchReport) -> String {
    let summaries = summarize_by_tier(&batch.reports);
    let mut output = String::new();

    let _ = writeln!(output, "# QC Coaching Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} agents scored, {} failed)",
        title,
        batch.reports.len(),
        batch.failures.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Tier Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No agents scored in this batch.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} agents (avg severity {:.3})",
                summary.label, summary.count, summary.avg_severity
            );
        }
    }

    let mut ranked: Vec<&AgentReport> = batch.reports.iter().collect();
    ranked.sort_by(|a, b| {
        b.plan
            .outcome
            .tier()
            .cmp(&a.plan.outcome.tier())
            .then_with(|| b.plan.aggregate_severity.total_cmp(&a.plan.aggregate_severity))
            .then_with(|| a.agent_id.cmp(&b.agent_id))
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Agents");
    if ranked.is_empty() {
        let _ = writeln!(output, "No agents scored in this batch.");
        let _ = writeln!(output);
    } else {
        for report in ranked {
            write_agent(&mut output, report);
        }
    }

    let _ = writeln!(output, "## Failures");
    if batch.failures.is_empty() {
        let _ = writeln!(output, "None.");
    } else {
        for failure in &batch.failures {
            let _ = writeln!(
                output,
                "- {} [{}]: {}",
                failure.agent_id, failure.kind, failure.message
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{run_batch, AgentFailure, Stage, StageFailure};
    use crate::config::EnginePolicy;
    use crate::models::{AgentInput, CategoryCount, CategoryId, CohortKey};

    fn agent(id: &str, flagged: u64) -> AgentInput {
        AgentInput {
            agent_id: id.to_string(),
            cohort: CohortKey {
                center: "cebu".to_string(),
                service: "billing".to_string(),
                channel: "voice".to_string(),
            },
            tenure_months: 8,
            period: None,
            category_counts: [(
                CategoryId::IdentityVerification,
                CategoryCount {
                    evaluated: 30,
                    flagged,
                },
            )]
            .into_iter()
            .collect(),
            evaluations: Vec::new(),
            weekly_series: Vec::new(),
            sla: None,
            criteria_metrics: BTreeMap::new(),
        }
    }

    #[test]
    fn report_lists_tiers_agents_and_failures() {
        let inputs = vec![agent("a-1", 1), agent("a-2", 2), agent("a-3", 14)];
        let mut batch = run_batch(&inputs, &EnginePolicy::default());
        batch.failures.push(AgentFailure {
            agent_id: "a-x".to_string(),
            kind: "configuration".to_string(),
            message: "no tenure bands entry for 3 months".to_string(),
        });

        let report = build_report("cebu billing", &batch);
        assert!(report.contains("# QC Coaching Report"));
        assert!(report.contains("- no action: 2 agents"));
        assert!(report.contains("### a-3 (cebu/billing/voice)"));
        assert!(report.contains("Identity verification: 14/30 flagged"));
        assert!(report.contains("- a-x [configuration]"));

        let a3 = report.find("### a-3").unwrap();
        let a1 = report.find("### a-1").unwrap();
        assert!(a3 < a1, "most urgent agent is listed first");
    }

    #[test]
    fn stage_failures_are_listed_under_the_agent() {
        let mut batch = run_batch(&[agent("a-1", 1)], &EnginePolicy::default());
        batch.reports[0].stage_failures.push(StageFailure {
            stage: Stage::Sla,
            kind: "configuration".to_string(),
            message: "no sla centers entry for iloilo".to_string(),
        });
        let report = build_report("iloilo", &batch);
        assert!(report.contains("- Sla not available [configuration]: no sla centers entry for iloilo"));
    }

    #[test]
    fn empty_batch_renders() {
        let report = build_report(
            "nobody",
            &BatchReport {
                reports: Vec::new(),
                failures: Vec::new(),
            },
        );
        assert!(report.contains("No agents scored in this batch."));
        assert!(report.contains("None."));
    }
}
