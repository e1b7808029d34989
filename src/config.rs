use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::criteria::{self, CriterionRule};
use crate::error::{EngineError, EngineResult};
use crate::models::{CategoryId, CoachingTier, QcItem, TenureBand};
use crate::sla::{self, SlaPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignificanceConfig {
    pub z_threshold: f64,
    pub min_sample: u64,
    pub degenerate_z: f64,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            z_threshold: 1.645,
            min_sample: 5,
            degenerate_z: 999.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrendConfig {
    pub min_points: usize,
    pub improving_slope: f64,
    pub deteriorating_slope: f64,
    pub min_r_squared: f64,
    pub min_abs_slope: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_points: 3,
            improving_slope: -0.3,
            deteriorating_slope: 0.3,
            min_r_squared: 0.3,
            min_abs_slope: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPolicy {
    pub display_name: String,
    pub severity_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenureBandPolicy {
    pub band: TenureBand,
    pub min_months: u32,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierAggregate {
    Top,
    SumTopN,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierThreshold {
    pub tier: CoachingTier,
    pub min_severity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TierPolicy {
    pub thresholds: Vec<TierThreshold>,
    pub aggregate: TierAggregate,
    pub aggregate_n: usize,
    pub top_n: usize,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            thresholds: vec![
                TierThreshold {
                    tier: CoachingTier::Monitor,
                    min_severity: 0.05,
                },
                TierThreshold {
                    tier: CoachingTier::Coach,
                    min_severity: 0.15,
                },
                TierThreshold {
                    tier: CoachingTier::Intensive,
                    min_severity: 0.30,
                },
            ],
            aggregate: TierAggregate::Top,
            aggregate_n: 3,
            top_n: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnginePolicy {
    /// Equivalent sample size of the cohort prior.
    pub prior_weight: f64,
    pub significance: SignificanceConfig,
    pub trend: TrendConfig,
    pub categories: BTreeMap<CategoryId, CategoryPolicy>,
    pub qc_item_categories: BTreeMap<QcItem, CategoryId>,
    pub qa_item_categories: BTreeMap<String, CategoryId>,
    pub qa_flag_ratio: f64,
    pub tenure_bands: Vec<TenureBandPolicy>,
    pub tiers: TierPolicy,
    pub prescriptions: BTreeMap<CategoryId, BTreeMap<CoachingTier, String>>,
    pub sla: SlaPolicy,
    pub criteria: Vec<CriterionRule>,
}

impl EnginePolicy {
    pub fn category(&self, id: CategoryId) -> EngineResult<&CategoryPolicy> {
        self.categories
            .get(&id)
            .ok_or_else(|| EngineError::configuration("categories", id))
    }

    pub fn category_for_qc(&self, item: QcItem) -> EngineResult<CategoryId> {
        self.qc_item_categories
            .get(&item)
            .copied()
            .ok_or_else(|| EngineError::configuration("qc item categories", item))
    }

    pub fn category_for_qa(&self, item: &str) -> EngineResult<CategoryId> {
        self.qa_item_categories
            .get(item)
            .copied()
            .ok_or_else(|| EngineError::configuration("qa item categories", item))
    }

    pub fn prescription(&self, category: CategoryId, tier: CoachingTier) -> EngineResult<&str> {
        self.prescriptions
            .get(&category)
            .and_then(|by_tier| by_tier.get(&tier))
            .map(String::as_str)
            .ok_or_else(|| {
                EngineError::configuration("prescriptions", format!("{category}/{tier}"))
            })
    }

    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        let policy: EnginePolicy = serde_json::from_str(raw)
            .map_err(|err| EngineError::InvalidPolicy(err.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.prior_weight.is_finite() && self.prior_weight > 0.0) {
            return Err(EngineError::InvalidPolicy(format!(
                "prior weight must be positive, got {}",
                self.prior_weight
            )));
        }

        let sig = &self.significance;
        if !sig.z_threshold.is_finite() || !(sig.degenerate_z.is_finite() && sig.degenerate_z > 0.0)
        {
            return Err(EngineError::InvalidPolicy(
                "significance thresholds must be finite".into(),
            ));
        }

        let trend = &self.trend;
        if trend.min_points < 2 {
            return Err(EngineError::InvalidPolicy(
                "trend fitting needs at least 2 points".into(),
            ));
        }
        if !(trend.improving_slope < trend.deteriorating_slope) {
            return Err(EngineError::InvalidPolicy(
                "improving slope threshold must sit below the deteriorating one".into(),
            ));
        }

        for (id, category) in &self.categories {
            if !(category.severity_weight.is_finite() && category.severity_weight >= 0.0) {
                return Err(EngineError::InvalidPolicy(format!(
                    "severity weight for {id} must be non-negative"
                )));
            }
        }

        if !(self.qa_flag_ratio > 0.0 && self.qa_flag_ratio <= 1.0) {
            return Err(EngineError::InvalidPolicy(format!(
                "qa flag ratio must be in (0, 1], got {}",
                self.qa_flag_ratio
            )));
        }

        self.validate_tenure_bands()?;
        self.validate_tiers()?;

        self.sla.validate()?;
        for rule in &self.criteria {
            rule.validate()?;
        }
        Ok(())
    }

    fn validate_tenure_bands(&self) -> EngineResult<()> {
        let bands = &self.tenure_bands;
        match bands.first() {
            None => return Err(EngineError::InvalidPolicy("no tenure bands".into())),
            Some(first) if first.min_months != 0 => {
                return Err(EngineError::InvalidPolicy(
                    "the first tenure band must start at 0 months".into(),
                ))
            }
            Some(_) => {}
        }
        for pair in bands.windows(2) {
            if pair[1].band <= pair[0].band || pair[1].min_months <= pair[0].min_months {
                return Err(EngineError::InvalidPolicy(
                    "tenure bands must be strictly ascending".into(),
                ));
            }
        }
        if let Some(bad) = bands
            .iter()
            .find(|b| !(b.multiplier.is_finite() && b.multiplier > 0.0))
        {
            return Err(EngineError::InvalidPolicy(format!(
                "tenure multiplier for {:?} must be positive",
                bad.band
            )));
        }
        Ok(())
    }

    fn validate_tiers(&self) -> EngineResult<()> {
        let tiers = &self.tiers;
        if tiers.thresholds.is_empty() {
            return Err(EngineError::InvalidPolicy("no coaching tiers".into()));
        }
        if tiers.top_n == 0 || tiers.aggregate_n == 0 {
            return Err(EngineError::InvalidPolicy(
                "tier top-n and aggregate-n must be at least 1".into(),
            ));
        }
        if tiers.thresholds.iter().any(|t| !t.min_severity.is_finite()) {
            return Err(EngineError::InvalidPolicy(
                "tier thresholds must be finite".into(),
            ));
        }
        for pair in tiers.thresholds.windows(2) {
            if pair[1].tier <= pair[0].tier || pair[1].min_severity <= pair[0].min_severity {
                return Err(EngineError::InvalidPolicy(
                    "tier thresholds must be strictly ascending".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            prior_weight: 10.0,
            significance: SignificanceConfig::default(),
            trend: TrendConfig::default(),
            categories: default_categories(),
            qc_item_categories: default_qc_item_categories(),
            qa_item_categories: default_qa_item_categories(),
            qa_flag_ratio: 1.0,
            tenure_bands: default_tenure_bands(),
            tiers: TierPolicy::default(),
            prescriptions: default_prescriptions(),
            sla: sla::default_policy(),
            criteria: criteria::default_rules(),
        }
    }
}

fn default_categories() -> BTreeMap<CategoryId, CategoryPolicy> {
    [
        (CategoryId::Attitude, "Attitude & empathy", 1.0),
        (CategoryId::ProcessCompliance, "Process compliance", 1.1),
        (CategoryId::SystemHandling, "System handling", 0.9),
        (CategoryId::IdentityVerification, "Identity verification", 1.5),
        (CategoryId::Documentation, "Documentation", 0.8),
        (CategoryId::GuidanceAccuracy, "Guidance accuracy", 1.3),
        (CategoryId::Responsiveness, "Responsiveness", 0.9),
        (CategoryId::EscalationHandling, "Escalation handling", 1.2),
    ]
    .into_iter()
    .map(|(id, name, weight)| {
        (
            id,
            CategoryPolicy {
                display_name: name.to_string(),
                severity_weight: weight,
            },
        )
    })
    .collect()
}

fn default_qc_item_categories() -> BTreeMap<QcItem, CategoryId> {
    QcItem::ALL
        .into_iter()
        .map(|item| {
            let category = match item {
                QcItem::Greeting | QcItem::Closing | QcItem::Courtesy | QcItem::Empathy => {
                    CategoryId::Attitude
                }
                QcItem::HoldProcedure | QcItem::TransferProcedure => CategoryId::ProcessCompliance,
                QcItem::SystemNavigation | QcItem::RecordLookup => CategoryId::SystemHandling,
                QcItem::IdentityCheck | QcItem::ConsentCapture => CategoryId::IdentityVerification,
                QcItem::CallNotes | QcItem::TicketCategorization => CategoryId::Documentation,
                QcItem::InformationAccuracy | QcItem::SolutionCompleteness => {
                    CategoryId::GuidanceAccuracy
                }
                QcItem::DeadAir => CategoryId::Responsiveness,
                QcItem::EscalationProtocol => CategoryId::EscalationHandling,
            };
            (item, category)
        })
        .collect()
}

fn default_qa_item_categories() -> BTreeMap<String, CategoryId> {
    [
        ("opening", CategoryId::Attitude),
        ("soft_skills", CategoryId::Attitude),
        ("hold_transfer", CategoryId::ProcessCompliance),
        ("tools_usage", CategoryId::SystemHandling),
        ("verification", CategoryId::IdentityVerification),
        ("wrap_up_notes", CategoryId::Documentation),
        ("needs_analysis", CategoryId::GuidanceAccuracy),
        ("resolution", CategoryId::GuidanceAccuracy),
        ("pace_and_control", CategoryId::Responsiveness),
        ("escalation", CategoryId::EscalationHandling),
    ]
    .into_iter()
    .map(|(item, category)| (item.to_string(), category))
    .collect()
}

fn default_tenure_bands() -> Vec<TenureBandPolicy> {
    vec![
        TenureBandPolicy {
            band: TenureBand::UnderThreeMonths,
            min_months: 0,
            multiplier: 1.25,
        },
        TenureBandPolicy {
            band: TenureBand::ThreeToSixMonths,
            min_months: 3,
            multiplier: 1.15,
        },
        TenureBandPolicy {
            band: TenureBand::SixToTwelveMonths,
            min_months: 6,
            multiplier: 1.05,
        },
        TenureBandPolicy {
            band: TenureBand::TwelveMonthsPlus,
            min_months: 12,
            multiplier: 1.0,
        },
    ]
}

fn default_prescriptions() -> BTreeMap<CategoryId, BTreeMap<CoachingTier, String>> {
    let table: [(CategoryId, [&str; 3]); 8] = [
        (
            CategoryId::Attitude,
            [
                "Spot-check tone on {category} in the next calibration ({flagged}/{evaluated} calls flagged).",
                "Weekly 1:1 on {category}: replay two flagged calls and practise empathy statements.",
                "Enrol in the soft-skills module and shadow a senior agent; {category} error rate {rate}.",
            ],
        ),
        (
            CategoryId::ProcessCompliance,
            [
                "Monitor hold and transfer steps for {category} ({flagged}/{evaluated} calls flagged).",
                "Walk through the hold/transfer checklist for {category} with the team lead.",
                "Re-certify on call procedures; {category} error rate {rate} requires daily review.",
            ],
        ),
        (
            CategoryId::SystemHandling,
            [
                "Watch system navigation on {category} during routine reviews ({flagged}/{evaluated}).",
                "Pair with a floor mentor on CRM lookups to close the {category} gap.",
                "Schedule hands-on tools retraining; {category} error rate {rate}.",
            ],
        ),
        (
            CategoryId::IdentityVerification,
            [
                "Audit verification steps on upcoming calls for {category} ({flagged}/{evaluated}).",
                "Review the identity and consent script line by line; {category} error rate {rate}.",
                "Suspend unsupervised account changes until {category} re-certification is passed.",
            ],
        ),
        (
            CategoryId::Documentation,
            [
                "Sample call notes for {category} at the next review ({flagged}/{evaluated}).",
                "Review note templates and ticket codes for {category} with the team lead.",
                "Daily note audits for two weeks; {category} error rate {rate}.",
            ],
        ),
        (
            CategoryId::GuidanceAccuracy,
            [
                "Check answer accuracy on {category} in calibration ({flagged}/{evaluated}).",
                "Knowledge-base refresher on the topics behind the {category} misses.",
                "Knowledge re-assessment plus supervised calls; {category} error rate {rate}.",
            ],
        ),
        (
            CategoryId::Responsiveness,
            [
                "Track dead air on {category} in routine reviews ({flagged}/{evaluated}).",
                "Coach call control techniques to reduce {category} findings.",
                "Side-by-side coaching on call pacing; {category} error rate {rate}.",
            ],
        ),
        (
            CategoryId::EscalationHandling,
            [
                "Review escalation decisions for {category} at calibration ({flagged}/{evaluated}).",
                "Walk through the escalation matrix for {category} with the team lead.",
                "Mandatory escalation-protocol retraining; {category} error rate {rate}.",
            ],
        ),
    ];

    table
        .into_iter()
        .map(|(category, texts)| {
            let by_tier = CoachingTier::ALL
                .into_iter()
                .zip(texts)
                .map(|(tier, text)| (tier, text.to_string()))
                .collect();
            (category, by_tier)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        EnginePolicy::default().validate().unwrap();
    }

    #[test]
    fn default_qc_mapping_is_total() {
        let policy = EnginePolicy::default();
        for item in QcItem::ALL {
            assert!(policy.category_for_qc(item).is_ok(), "{item} unmapped");
        }
    }

    #[test]
    fn default_prescriptions_cover_every_category_and_tier() {
        let policy = EnginePolicy::default();
        for category in CategoryId::ALL {
            for tier in CoachingTier::ALL {
                assert!(policy.prescription(category, tier).is_ok());
            }
        }
    }

    #[test]
    fn rejects_non_positive_prior_weight() {
        let policy = EnginePolicy {
            prior_weight: 0.0,
            ..EnginePolicy::default()
        };
        assert!(matches!(
            policy.validate(),
            Err(EngineError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn rejects_descending_tier_thresholds() {
        let mut policy = EnginePolicy::default();
        policy.tiers.thresholds[2].min_severity = 0.01;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn rejects_tenure_bands_not_starting_at_zero() {
        let mut policy = EnginePolicy::default();
        policy.tenure_bands[0].min_months = 1;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn missing_entries_are_configuration_errors() {
        let mut policy = EnginePolicy::default();
        policy.prescriptions.remove(&CategoryId::Documentation);
        let err = policy
            .prescription(CategoryId::Documentation, CoachingTier::Coach)
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let policy = EnginePolicy::from_json_str(r#"{ "priorWeight": 25.0 }"#).unwrap();
        assert_eq!(policy.prior_weight, 25.0);
        assert_eq!(policy.significance, SignificanceConfig::default());
        assert_eq!(policy.categories.len(), CategoryId::ALL.len());
    }

    #[test]
    fn policy_round_trips_through_json() {
        let policy = EnginePolicy::default();
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(EnginePolicy::from_json_str(&json).unwrap(), policy);
    }
}
