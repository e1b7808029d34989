use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// A proportion in `[0, 1]`. Construction is the only validation point.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Rate(f64);

impl Rate {
    pub const ZERO: Rate = Rate(0.0);
    pub const ONE: Rate = Rate(1.0);

    pub fn new(value: f64) -> EngineResult<Self> {
        Self::named("rate", value)
    }

    pub fn named(field: &str, value: f64) -> EngineResult<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(EngineError::out_of_range(field, value, "a finite value in 0..=1"))
        }
    }

    /// Clamp a computed value back into range. Only for arithmetic drift on
    /// values that are already mathematically bounded.
    pub(crate) fn clamped(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Rate {
    type Error = EngineError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Rate::new(value)
    }
}

impl From<Rate> for f64 {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcItem {
    Greeting,
    Closing,
    Courtesy,
    Empathy,
    HoldProcedure,
    TransferProcedure,
    SystemNavigation,
    RecordLookup,
    IdentityCheck,
    ConsentCapture,
    CallNotes,
    TicketCategorization,
    InformationAccuracy,
    SolutionCompleteness,
    DeadAir,
    EscalationProtocol,
}

impl QcItem {
    pub const ALL: [QcItem; 16] = [
        QcItem::Greeting,
        QcItem::Closing,
        QcItem::Courtesy,
        QcItem::Empathy,
        QcItem::HoldProcedure,
        QcItem::TransferProcedure,
        QcItem::SystemNavigation,
        QcItem::RecordLookup,
        QcItem::IdentityCheck,
        QcItem::ConsentCapture,
        QcItem::CallNotes,
        QcItem::TicketCategorization,
        QcItem::InformationAccuracy,
        QcItem::SolutionCompleteness,
        QcItem::DeadAir,
        QcItem::EscalationProtocol,
    ];

    pub fn code(self) -> &'static str {
        match self {
            QcItem::Greeting => "greeting",
            QcItem::Closing => "closing",
            QcItem::Courtesy => "courtesy",
            QcItem::Empathy => "empathy",
            QcItem::HoldProcedure => "hold_procedure",
            QcItem::TransferProcedure => "transfer_procedure",
            QcItem::SystemNavigation => "system_navigation",
            QcItem::RecordLookup => "record_lookup",
            QcItem::IdentityCheck => "identity_check",
            QcItem::ConsentCapture => "consent_capture",
            QcItem::CallNotes => "call_notes",
            QcItem::TicketCategorization => "ticket_categorization",
            QcItem::InformationAccuracy => "information_accuracy",
            QcItem::SolutionCompleteness => "solution_completeness",
            QcItem::DeadAir => "dead_air",
            QcItem::EscalationProtocol => "escalation_protocol",
        }
    }
}

impl fmt::Display for QcItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for QcItem {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        QcItem::ALL
            .into_iter()
            .find(|item| item.code() == needle)
            .ok_or_else(|| EngineError::input("qc item", format!("unknown item code '{needle}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryId {
    Attitude,
    ProcessCompliance,
    SystemHandling,
    IdentityVerification,
    Documentation,
    GuidanceAccuracy,
    Responsiveness,
    EscalationHandling,
}

impl CategoryId {
    pub const ALL: [CategoryId; 8] = [
        CategoryId::Attitude,
        CategoryId::ProcessCompliance,
        CategoryId::SystemHandling,
        CategoryId::IdentityVerification,
        CategoryId::Documentation,
        CategoryId::GuidanceAccuracy,
        CategoryId::Responsiveness,
        CategoryId::EscalationHandling,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CategoryId::Attitude => "attitude",
            CategoryId::ProcessCompliance => "process_compliance",
            CategoryId::SystemHandling => "system_handling",
            CategoryId::IdentityVerification => "identity_verification",
            CategoryId::Documentation => "documentation",
            CategoryId::GuidanceAccuracy => "guidance_accuracy",
            CategoryId::Responsiveness => "responsiveness",
            CategoryId::EscalationHandling => "escalation_handling",
        }
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenureBand {
    UnderThreeMonths,
    ThreeToSixMonths,
    SixToTwelveMonths,
    TwelveMonthsPlus,
}

impl TenureBand {
    pub const ALL: [TenureBand; 4] = [
        TenureBand::UnderThreeMonths,
        TenureBand::ThreeToSixMonths,
        TenureBand::SixToTwelveMonths,
        TenureBand::TwelveMonthsPlus,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachingTier {
    Monitor,
    Coach,
    Intensive,
}

impl CoachingTier {
    pub const ALL: [CoachingTier; 3] = [
        CoachingTier::Monitor,
        CoachingTier::Coach,
        CoachingTier::Intensive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CoachingTier::Monitor => "monitor",
            CoachingTier::Coach => "coach",
            CoachingTier::Intensive => "intensive",
        }
    }
}

impl fmt::Display for CoachingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CohortKey {
    pub center: String,
    pub service: String,
    pub channel: String,
}

impl fmt::Display for CohortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.center, self.service, self.channel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaSubScore {
    pub item: String,
    pub score: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Findings {
    Qc { failed: BTreeSet<QcItem> },
    Qa { scores: Vec<QaSubScore> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRecord {
    pub agent_id: String,
    pub date: NaiveDate,
    pub cohort: CohortKey,
    pub findings: Findings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub evaluated: u64,
    pub flagged: u64,
}

impl CategoryCount {
    pub fn add(&mut self, other: CategoryCount, subject: &str) -> EngineResult<()> {
        let (Some(evaluated), Some(flagged)) = (
            self.evaluated.checked_add(other.evaluated),
            self.flagged.checked_add(other.flagged),
        ) else {
            return Err(EngineError::input(
                subject,
                "category counts overflow when combined",
            ));
        };
        self.evaluated = evaluated;
        self.flagged = flagged;
        Ok(())
    }

    pub fn rate(&self, subject: &str) -> EngineResult<Option<Rate>> {
        if self.flagged > self.evaluated {
            return Err(EngineError::input(
                subject,
                format!(
                    "flagged count {} exceeds evaluated count {}",
                    self.flagged, self.evaluated
                ),
            ));
        }
        if self.evaluated == 0 {
            return Ok(None);
        }
        Ok(Some(Rate::clamped(
            self.flagged as f64 / self.evaluated as f64,
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn include(self, date: NaiveDate) -> Self {
        Self {
            start: self.start.min(date),
            end: self.end.max(date),
        }
    }

    pub fn merge(self, other: DateRange) -> Self {
        self.include(other.start).include(other.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyPoint {
    pub week_index: u32,
    pub value: f64,
    pub eval_count: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaInput {
    pub subject: String,
    pub period: String,
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInput {
    pub agent_id: String,
    pub cohort: CohortKey,
    pub tenure_months: u32,
    #[serde(default)]
    pub period: Option<DateRange>,
    #[serde(default)]
    pub category_counts: BTreeMap<CategoryId, CategoryCount>,
    #[serde(default)]
    pub evaluations: Vec<EvaluationRecord>,
    #[serde(default)]
    pub weekly_series: Vec<WeeklyPoint>,
    #[serde(default)]
    pub sla: Option<SlaInput>,
    #[serde(default)]
    pub criteria_metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInput {
    pub agents: Vec<AgentInput>,
}
