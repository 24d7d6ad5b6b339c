//! Schedule Planner — sequence definition to time-ordered plan.

use chrono::{DateTime, Duration, Utc};

use leadclaw_core::error::{LeadClawError, Result};
use leadclaw_core::types::{PlanEntry, Step};

/// Expand steps into absolute fire times by accumulating delays.
///
/// The running offset starts at zero: the first step fires at `run_start`,
/// and each step's delay pushes back the steps that follow it. Zero-delay
/// bursts are legal and keep their order; nothing is reordered or merged.
/// A negative delay rejects the whole sequence with no partial plan.
pub fn plan(steps: &[Step], run_start: DateTime<Utc>) -> Result<Vec<PlanEntry>> {
    let mut offset = Duration::zero();
    let mut entries = Vec::with_capacity(steps.len());
    for (step_index, step) in steps.iter().enumerate() {
        if step.delay < 0 {
            return Err(LeadClawError::Validation(format!(
                "step {step_index} has negative delay ({} min)",
                step.delay
            )));
        }
        entries.push(PlanEntry {
            step_index,
            fire_at: run_start + offset,
            step: step.clone(),
        });
        offset += Duration::minutes(step.delay);
    }
    Ok(entries)
}
