use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::SlaInput;
use crate::stats::round_to;

const POINTS_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    HigherIsBetter,
    LowerIsBetter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpec {
    pub id: String,
    pub direction: MetricDirection,
    pub target: f64,
    pub points: f64,
    #[serde(default = "default_max_achievement")]
    pub max_achievement: f64,
}

fn default_max_achievement() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSpec {
    pub points: f64,
    pub metrics: Vec<MetricSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Below,
    AtMost,
    Above,
    AtLeast,
}

impl Comparator {
    fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Below => value < threshold,
            Comparator::AtMost => value <= threshold,
            Comparator::Above => value > threshold,
            Comparator::AtLeast => value >= threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeductionCondition {
    Metric {
        metric: String,
        comparator: Comparator,
        threshold: f64,
    },
    All {
        conditions: Vec<DeductionCondition>,
    },
    Any {
        conditions: Vec<DeductionCondition>,
    },
}

impl DeductionCondition {
    fn evaluate(&self, metrics: &BTreeMap<String, f64>) -> EngineResult<bool> {
        match self {
            DeductionCondition::Metric {
                metric,
                comparator,
                threshold,
            } => {
                let value = metric_value(metrics, metric)?;
                Ok(comparator.holds(value, *threshold))
            }
            // Every branch is evaluated so a missing metric is never masked.
            DeductionCondition::All { conditions } => {
                let results = conditions
                    .iter()
                    .map(|c| c.evaluate(metrics))
                    .collect::<EngineResult<Vec<bool>>>()?;
                Ok(results.into_iter().all(|hit| hit))
            }
            DeductionCondition::Any { conditions } => {
                let results = conditions
                    .iter()
                    .map(|c| c.evaluate(metrics))
                    .collect::<EngineResult<Vec<bool>>>()?;
                Ok(results.into_iter().any(|hit| hit))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeductionRule {
    pub id: String,
    pub description: String,
    pub condition: DeductionCondition,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub grade: String,
    pub min_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaConfig {
    pub productivity: BucketSpec,
    pub quality: BucketSpec,
    #[serde(default)]
    pub deductions: Vec<DeductionRule>,
    pub grade_bands: Vec<GradeBand>,
    /// Lowest composite deductions can push the score to.
    #[serde(default)]
    pub floor: f64,
}

impl SlaConfig {
    pub fn validate(&self) -> EngineResult<()> {
        for (name, bucket) in [("productivity", &self.productivity), ("quality", &self.quality)] {
            if !(bucket.points.is_finite() && bucket.points >= 0.0) {
                return Err(EngineError::InvalidPolicy(format!(
                    "{name} bucket points must be non-negative"
                )));
            }
            let allocated: f64 = bucket.metrics.iter().map(|m| m.points).sum();
            if (allocated - bucket.points).abs() > POINTS_TOLERANCE {
                return Err(EngineError::InvalidPolicy(format!(
                    "{name} metric points sum to {allocated}, bucket allocates {}",
                    bucket.points
                )));
            }
            for metric in &bucket.metrics {
                if !(metric.target.is_finite() && metric.target > 0.0) {
                    return Err(EngineError::InvalidPolicy(format!(
                        "target for {} must be positive",
                        metric.id
                    )));
                }
                if !(metric.points.is_finite() && metric.points >= 0.0) {
                    return Err(EngineError::InvalidPolicy(format!(
                        "points for {} must be non-negative",
                        metric.id
                    )));
                }
                if !(metric.max_achievement.is_finite() && metric.max_achievement > 0.0) {
                    return Err(EngineError::InvalidPolicy(format!(
                        "achievement cap for {} must be positive",
                        metric.id
                    )));
                }
            }
        }
        if let Some(rule) = self
            .deductions
            .iter()
            .find(|r| !(r.points.is_finite() && r.points >= 0.0))
        {
            return Err(EngineError::InvalidPolicy(format!(
                "deduction {} must carry non-negative points",
                rule.id
            )));
        }
        if self.grade_bands.is_empty() {
            return Err(EngineError::InvalidPolicy("no grade bands".into()));
        }
        for pair in self.grade_bands.windows(2) {
            if pair[1].min_score <= pair[0].min_score {
                return Err(EngineError::InvalidPolicy(
                    "grade bands must be ascending by minimum score".into(),
                ));
            }
        }
        if !self.floor.is_finite() {
            return Err(EngineError::InvalidPolicy("sla floor must be finite".into()));
        }
        Ok(())
    }
}

/// SLA configurations per center. `fallback` scores centers without an entry
/// of their own; with no fallback such a center is a configuration error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SlaPolicy {
    pub centers: BTreeMap<String, SlaConfig>,
    pub fallback: Option<SlaConfig>,
}

impl SlaPolicy {
    pub fn for_center(&self, center: &str) -> EngineResult<&SlaConfig> {
        self.centers
            .get(center)
            .or(self.fallback.as_ref())
            .ok_or_else(|| EngineError::configuration("sla centers", center))
    }

    pub fn validate(&self) -> EngineResult<()> {
        for config in self.centers.values().chain(&self.fallback) {
            config.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaScoreDetail {
    pub metric: String,
    pub actual: f64,
    pub target: f64,
    pub direction: MetricDirection,
    pub achievement_ratio: f64,
    pub points_allocated: f64,
    pub points_earned: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketScore {
    pub allocated: f64,
    pub earned: f64,
    pub capped: bool,
    pub details: Vec<SlaScoreDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaDeduction {
    pub rule_id: String,
    pub description: String,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaResult {
    pub subject: String,
    pub period: String,
    pub center: String,
    pub productivity: BucketScore,
    pub quality: BucketScore,
    pub subtotal: f64,
    pub deductions: Vec<SlaDeduction>,
    pub composite: f64,
    pub floor_applied: bool,
    pub grade: String,
}

fn metric_value(metrics: &BTreeMap<String, f64>, id: &str) -> EngineResult<f64> {
    let value = *metrics
        .get(id)
        .ok_or_else(|| EngineError::configuration("sla metrics", id))?;
    if !(value.is_finite() && value >= 0.0) {
        return Err(EngineError::out_of_range(
            format!("sla metric {id}"),
            value,
            "a finite non-negative number",
        ));
    }
    Ok(value)
}

pub fn achievement_ratio(spec: &MetricSpec, actual: f64) -> f64 {
    let ratio = match spec.direction {
        MetricDirection::HigherIsBetter => actual / spec.target,
        MetricDirection::LowerIsBetter if actual == 0.0 => spec.max_achievement,
        MetricDirection::LowerIsBetter => spec.target / actual,
    };
    ratio.clamp(0.0, spec.max_achievement)
}

fn score_bucket(bucket: &BucketSpec, metrics: &BTreeMap<String, f64>) -> EngineResult<BucketScore> {
    let mut details = Vec::with_capacity(bucket.metrics.len());
    for spec in &bucket.metrics {
        let actual = metric_value(metrics, &spec.id)?;
        let ratio = achievement_ratio(spec, actual);
        details.push(SlaScoreDetail {
            metric: spec.id.clone(),
            actual,
            target: spec.target,
            direction: spec.direction,
            achievement_ratio: round_to(ratio, 4),
            points_allocated: spec.points,
            points_earned: round_to(ratio * spec.points, 2),
        });
    }
    let raw: f64 = details.iter().map(|d| d.points_earned).sum();
    Ok(BucketScore {
        allocated: bucket.points,
        earned: round_to(raw.min(bucket.points), 2),
        capped: raw > bucket.points,
        details,
    })
}

pub fn grade_for(score: f64, bands: &[GradeBand]) -> EngineResult<String> {
    bands
        .iter()
        .rev()
        .find(|band| score >= band.min_score)
        .map(|band| band.grade.clone())
        .ok_or_else(|| EngineError::configuration("grade bands", format!("score {score}")))
}

pub fn score(center: &str, input: &SlaInput, config: &SlaConfig) -> EngineResult<SlaResult> {
    let productivity = score_bucket(&config.productivity, &input.metrics)?;
    let quality = score_bucket(&config.quality, &input.metrics)?;
    let subtotal = round_to(productivity.earned + quality.earned, 2);

    let mut deductions = Vec::new();
    for rule in &config.deductions {
        if rule.condition.evaluate(&input.metrics)? {
            deductions.push(SlaDeduction {
                rule_id: rule.id.clone(),
                description: rule.description.clone(),
                points: rule.points,
            });
        }
    }
    let deducted: f64 = deductions.iter().map(|d| d.points).sum();
    let unfloored = round_to(subtotal - deducted, 2);
    let floor_applied = unfloored < config.floor;
    let composite = unfloored.max(config.floor);

    Ok(SlaResult {
        subject: input.subject.clone(),
        period: input.period.clone(),
        center: center.to_string(),
        grade: grade_for(composite, &config.grade_bands)?,
        productivity,
        quality,
        subtotal,
        deductions,
        composite,
        floor_applied,
    })
}

pub fn default_policy() -> SlaPolicy {
    SlaPolicy {
        centers: BTreeMap::new(),
        fallback: Some(default_config()),
    }
}

pub fn default_config() -> SlaConfig {
    let metric = |id: &str, direction, target, points| MetricSpec {
        id: id.to_string(),
        direction,
        target,
        points,
        max_achievement: 1.0,
    };
    SlaConfig {
        productivity: BucketSpec {
            points: 60.0,
            metrics: vec![
                metric("answer_rate", MetricDirection::HigherIsBetter, 0.95, 20.0),
                metric("aht_seconds", MetricDirection::LowerIsBetter, 300.0, 20.0),
                metric("schedule_adherence", MetricDirection::HigherIsBetter, 0.90, 20.0),
            ],
        },
        quality: BucketSpec {
            points: 40.0,
            metrics: vec![
                metric("qa_score", MetricDirection::HigherIsBetter, 90.0, 25.0),
                metric("qc_error_rate", MetricDirection::LowerIsBetter, 0.05, 15.0),
            ],
        },
        deductions: vec![
            DeductionRule {
                id: "critical_error".to_string(),
                description: "Critical compliance error recorded in the period".to_string(),
                condition: DeductionCondition::Metric {
                    metric: "critical_errors".to_string(),
                    comparator: Comparator::Above,
                    threshold: 0.0,
                },
                points: 5.0,
            },
            DeductionRule {
                id: "quality_and_adherence_miss".to_string(),
                description: "QA score and adherence both well below target".to_string(),
                condition: DeductionCondition::All {
                    conditions: vec![
                        DeductionCondition::Metric {
                            metric: "qa_score".to_string(),
                            comparator: Comparator::Below,
                            threshold: 80.0,
                        },
                        DeductionCondition::Metric {
                            metric: "schedule_adherence".to_string(),
                            comparator: Comparator::Below,
                            threshold: 0.85,
                        },
                    ],
                },
                points: 3.0,
            },
        ],
        grade_bands: [("D", 0.0), ("C", 70.0), ("B", 80.0), ("A", 90.0)]
            .into_iter()
            .map(|(grade, min_score)| GradeBand {
                grade: grade.to_string(),
                min_score,
            })
            .collect(),
        floor: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(pairs: &[(&str, f64)]) -> SlaInput {
        SlaInput {
            subject: "agent-12".to_string(),
            period: "2026-04".to_string(),
            metrics: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    fn on_target() -> SlaInput {
        input(&[
            ("answer_rate", 0.95),
            ("aht_seconds", 300.0),
            ("schedule_adherence", 0.90),
            ("qa_score", 90.0),
            ("qc_error_rate", 0.05),
            ("critical_errors", 0.0),
        ])
    }

    #[test]
    fn on_target_scores_full_points() {
        let result = score("cebu", &on_target(), &default_config()).unwrap();
        assert_eq!(result.productivity.earned, 60.0);
        assert_eq!(result.quality.earned, 40.0);
        assert_eq!(result.composite, 100.0);
        assert_eq!(result.grade, "A");
        assert!(result.deductions.is_empty());
        assert_eq!(result.productivity.details.len(), 3);
    }

    #[test]
    fn lower_is_better_metrics_invert() {
        let spec = MetricSpec {
            id: "aht_seconds".to_string(),
            direction: MetricDirection::LowerIsBetter,
            target: 300.0,
            points: 20.0,
            max_achievement: 1.2,
        };
        assert_eq!(achievement_ratio(&spec, 400.0), 0.75);
        assert_eq!(achievement_ratio(&spec, 200.0), 1.2);
        assert_eq!(achievement_ratio(&spec, 0.0), 1.2);
    }

    #[test]
    fn composite_of_92_grades_a() {
        let mut metrics = on_target();
        // 61.2 / 90 = 0.68 of 25 points, 8 lost
        metrics.metrics.insert("qa_score".to_string(), 61.2);
        let result = score("cebu", &metrics, &default_config()).unwrap();
        assert_eq!(result.composite, 92.0);
        assert_eq!(result.grade, "A");
    }

    #[test]
    fn deductions_are_itemised() {
        let mut metrics = on_target();
        metrics.metrics.insert("critical_errors".to_string(), 2.0);
        metrics.metrics.insert("qa_score".to_string(), 72.0);
        metrics.metrics.insert("schedule_adherence".to_string(), 0.81);
        let result = score("cebu", &metrics, &default_config()).unwrap();

        let ids: Vec<&str> = result.deductions.iter().map(|d| d.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["critical_error", "quality_and_adherence_miss"]);
        assert_eq!(result.composite, round_to(result.subtotal - 8.0, 2));
    }

    #[test]
    fn floor_bounds_stacked_deductions() {
        let mut config = default_config();
        config.floor = 0.0;
        config.deductions[0].points = 500.0;
        let mut metrics = on_target();
        metrics.metrics.insert("critical_errors".to_string(), 1.0);
        let result = score("cebu", &metrics, &config).unwrap();
        assert_eq!(result.composite, 0.0);
        assert!(result.floor_applied);
        assert_eq!(result.grade, "D");
    }

    #[test]
    fn over_achievement_is_capped_at_bucket_allocation() {
        let mut config = default_config();
        for metric in &mut config.productivity.metrics {
            metric.max_achievement = 1.2;
        }
        let mut metrics = on_target();
        metrics.metrics.insert("answer_rate".to_string(), 1.0);
        metrics.metrics.insert("aht_seconds".to_string(), 200.0);
        let result = score("cebu", &metrics, &config).unwrap();
        assert_eq!(result.productivity.earned, 60.0);
        assert!(result.productivity.capped);
    }

    #[test]
    fn missing_metric_is_reported_by_name() {
        let mut metrics = on_target();
        metrics.metrics.remove("aht_seconds");
        let err = score("cebu", &metrics, &default_config()).unwrap_err();
        assert_eq!(err, EngineError::configuration("sla metrics", "aht_seconds"));
    }

    #[test]
    fn negative_metric_is_out_of_range() {
        let mut metrics = on_target();
        metrics.metrics.insert("answer_rate".to_string(), -0.2);
        let err = score("cebu", &metrics, &default_config()).unwrap_err();
        assert_eq!(err.kind(), "out_of_range");
    }

    #[test]
    fn grade_requires_a_covering_band() {
        let bands = vec![GradeBand {
            grade: "A".to_string(),
            min_score: 90.0,
        }];
        assert_eq!(grade_for(95.0, &bands).unwrap(), "A");
        assert!(grade_for(50.0, &bands).is_err());
    }

    #[test]
    fn each_center_is_scored_against_its_own_config() {
        let mut davao = default_config();
        davao.quality.metrics[0].target = 80.0;
        let policy = SlaPolicy {
            centers: [
                ("cebu".to_string(), default_config()),
                ("davao".to_string(), davao),
            ]
            .into_iter()
            .collect(),
            fallback: None,
        };
        let mut metrics = on_target();
        metrics.metrics.insert("qa_score".to_string(), 80.0);

        let cebu = score("cebu", &metrics, policy.for_center("cebu").unwrap()).unwrap();
        let davao = score("davao", &metrics, policy.for_center("davao").unwrap()).unwrap();
        assert_eq!(cebu.center, "cebu");
        assert_eq!(davao.center, "davao");
        assert!(cebu.quality.earned < davao.quality.earned);
        assert_eq!(davao.quality.earned, 40.0);

        let err = policy.for_center("iloilo").unwrap_err();
        assert_eq!(err, EngineError::configuration("sla centers", "iloilo"));
    }

    #[test]
    fn fallback_covers_unlisted_centers() {
        let policy = default_policy();
        assert!(policy.centers.is_empty());
        assert!(policy.for_center("anywhere").is_ok());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn validation_catches_mismatched_bucket_points() {
        let mut config = default_config();
        config.quality.points = 50.0;
        assert!(config.validate().is_err());
        assert!(default_config().validate().is_ok());
    }
}
