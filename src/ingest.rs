use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use tracing::debug;

use crate::config::EnginePolicy;
use crate::models::{AgentInput, BatchInput, CohortKey, EvaluationRecord, Findings, QcItem};

pub fn load_policy(path: &Path) -> anyhow::Result<EnginePolicy> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read policy {}", path.display()))?;
    let policy = EnginePolicy::from_json_str(&raw)
        .with_context(|| format!("invalid policy in {}", path.display()))?;
    debug!(path = %path.display(), "policy loaded");
    Ok(policy)
}

pub fn load_batch(path: &Path) -> anyhow::Result<BatchInput> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read batch input {}", path.display()))?;
    let batch: BatchInput = serde_json::from_str(&raw)
        .with_context(|| format!("malformed batch input in {}", path.display()))?;
    debug!(path = %path.display(), agents = batch.agents.len(), "batch input loaded");
    Ok(batch)
}

pub fn import_qc_csv(csv_path: &Path) -> anyhow::Result<BatchInput> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        agent_id: String,
        date: NaiveDate,
        center: String,
        service: String,
        channel: String,
        tenure_months: u32,
        #[serde(default)]
        failed_items: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut agents: Vec<AgentInput> = Vec::new();
    let mut positions: BTreeMap<String, usize> = BTreeMap::new();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("bad row {} in {}", line + 2, csv_path.display()))?;

        let failed: BTreeSet<QcItem> = row
            .failed_items
            .as_deref()
            .unwrap_or("")
            .split(';')
            .filter(|code| !code.trim().is_empty())
            .map(|code| code.parse::<QcItem>())
            .collect::<Result<_, _>>()
            .with_context(|| format!("bad failed_items on row {}", line + 2))?;

        let cohort = CohortKey {
            center: row.center,
            service: row.service,
            channel: row.channel,
        };

        let index = *positions.entry(row.agent_id.clone()).or_insert_with(|| {
            agents.push(AgentInput {
                agent_id: row.agent_id.clone(),
                cohort: cohort.clone(),
                tenure_months: row.tenure_months,
                period: None,
                category_counts: BTreeMap::new(),
                evaluations: Vec::new(),
                weekly_series: Vec::new(),
                sla: None,
                criteria_metrics: BTreeMap::new(),
            });
            agents.len() - 1
        });

        let agent = &mut agents[index];
        if agent.cohort != cohort {
            bail!(
                "agent {} appears in cohorts {} and {} (row {})",
                row.agent_id,
                agent.cohort,
                cohort,
                line + 2
            );
        }
        agent.tenure_months = agent.tenure_months.max(row.tenure_months);
        agent.evaluations.push(EvaluationRecord {
            agent_id: row.agent_id,
            date: row.date,
            cohort,
            findings: Findings::Qc { failed },
        });
    }

    debug!(path = %csv_path.display(), agents = agents.len(), "qc evaluations imported");
    Ok(BatchInput { agents })
}
