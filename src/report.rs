use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::flight::{ManeuverPlan, SequenceReport};
use crate::pipeline::PipelineStats;
use crate::safety::SafetyVerdict;

/// Summary of one inspection run, written as JSON.
#[derive(Clone, Debug, Serialize)]
pub struct InspectionReport {
    pub plan: ManeuverPlan,
    pub sequence: SequenceReport,
    pub perception: PipelineStats,
    /// Stable verdict when the run ended.
    pub final_verdict: SafetyVerdict,
    pub completed: bool,
    pub abort_reason: Option<String>,
}

impl InspectionReport {
    pub fn new(
        plan: ManeuverPlan,
        sequence: SequenceReport,
        perception: PipelineStats,
        final_verdict: SafetyVerdict,
    ) -> Self {
        let completed = sequence.is_complete();
        let abort_reason = sequence.abort_reason().map(ToString::to_string);
        Self {
            plan,
            sequence,
            perception,
            final_verdict,
            completed,
            abort_reason,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize inspection report")
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        log::info!("inspection report written to {}", path.display());
        Ok(())
    }
}
