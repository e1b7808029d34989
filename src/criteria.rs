use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::sla::MetricDirection;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionRule {
    pub id: String,
    pub metric: String,
    pub direction: MetricDirection,
    pub threshold: f64,
    #[serde(default)]
    pub at_risk_margin: f64,
}

impl CriterionRule {
    pub fn validate(&self) -> EngineResult<()> {
        if !self.threshold.is_finite() || !(self.at_risk_margin.is_finite() && self.at_risk_margin >= 0.0)
        {
            return Err(EngineError::InvalidPolicy(format!(
                "criterion {} needs a finite threshold and non-negative margin",
                self.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionStatus {
    Met,
    AtRisk,
    Breached,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderperformingCriterionResult {
    pub rule_id: String,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub status: CriterionStatus,
}

pub fn status_for(rule: &CriterionRule, value: f64) -> CriterionStatus {
    let (breached, at_risk) = match rule.direction {
        MetricDirection::HigherIsBetter => (
            value < rule.threshold,
            value < rule.threshold + rule.at_risk_margin,
        ),
        MetricDirection::LowerIsBetter => (
            value > rule.threshold,
            value > rule.threshold - rule.at_risk_margin,
        ),
    };
    if breached {
        CriterionStatus::Breached
    } else if at_risk {
        CriterionStatus::AtRisk
    } else {
        CriterionStatus::Met
    }
}

pub fn evaluate(
    rules: &[CriterionRule],
    metrics: &BTreeMap<String, f64>,
) -> EngineResult<Vec<UnderperformingCriterionResult>> {
    rules
        .iter()
        .map(|rule| {
            let value = *metrics
                .get(&rule.metric)
                .ok_or_else(|| EngineError::configuration("criteria metrics", &rule.metric))?;
            if !value.is_finite() {
                return Err(EngineError::out_of_range(
                    format!("criteria metric {}", rule.metric),
                    value,
                    "a finite number",
                ));
            }
            Ok(UnderperformingCriterionResult {
                rule_id: rule.id.clone(),
                metric: rule.metric.clone(),
                value,
                threshold: rule.threshold,
                status: status_for(rule, value),
            })
        })
        .collect()
}

pub fn is_underperforming(results: &[UnderperformingCriterionResult]) -> bool {
    results
        .iter()
        .any(|r| r.status == CriterionStatus::Breached)
}

pub fn default_rules() -> Vec<CriterionRule> {
    vec![
        CriterionRule {
            id: "monthly_qc_error_rate".to_string(),
            metric: "qc_error_rate".to_string(),
            direction: MetricDirection::LowerIsBetter,
            threshold: 0.10,
            at_risk_margin: 0.02,
        },
        CriterionRule {
            id: "monthly_qa_score".to_string(),
            metric: "qa_score".to_string(),
            direction: MetricDirection::HigherIsBetter,
            threshold: 85.0,
            at_risk_margin: 3.0,
        },
        CriterionRule {
            id: "monthly_quiz_score".to_string(),
            metric: "quiz_score".to_string(),
            direction: MetricDirection::HigherIsBetter,
            threshold: 80.0,
            at_risk_margin: 5.0,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn statuses_follow_thresholds_and_margins() {
        let results = evaluate(
            &default_rules(),
            &metrics(&[("qc_error_rate", 0.09), ("qa_score", 84.0), ("quiz_score", 92.0)]),
        )
        .unwrap();
        let statuses: Vec<CriterionStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                CriterionStatus::AtRisk,
                CriterionStatus::Breached,
                CriterionStatus::Met
            ]
        );
        assert!(is_underperforming(&results));
        assert_eq!(results[1].rule_id, "monthly_qa_score");
    }

    #[test]
    fn exact_threshold_is_not_a_breach() {
        let rule = &default_rules()[2];
        assert_eq!(status_for(rule, 80.0), CriterionStatus::AtRisk);
        assert_eq!(status_for(rule, 85.0), CriterionStatus::Met);
    }

    #[test]
    fn all_met_is_not_underperforming() {
        let results = evaluate(
            &default_rules(),
            &metrics(&[("qc_error_rate", 0.02), ("qa_score", 95.0), ("quiz_score", 90.0)]),
        )
        .unwrap();
        assert!(!is_underperforming(&results));
    }

    #[test]
    fn missing_metric_is_a_configuration_error() {
        let err = evaluate(&default_rules(), &metrics(&[("qa_score", 90.0)])).unwrap_err();
        assert_eq!(
            err,
            EngineError::configuration("criteria metrics", "qc_error_rate")
        );
    }
}
