//! Persisted step schedule.
//!
//! Every planned firing gets a row before its timer is armed. Workers
//! advance rows to `sent`/`failed`; cancellation flips pending rows to
//! `cancelled`; a restart re-arms whatever is still `pending`.

use chrono::{DateTime, Utc};

use leadclaw_core::error::{LeadClawError, Result};
use leadclaw_core::types::{PlanEntry, Step};

use crate::db::Store;

fn persist_err(e: impl std::fmt::Display) -> LeadClawError {
    LeadClawError::Persistence(e.to_string())
}

/// Delivery status of one scheduled step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Sent => "sent",
            StepStatus::Failed => "failed",
            StepStatus::Cancelled => "cancelled",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "sent" => StepStatus::Sent,
            "failed" => StepStatus::Failed,
            "cancelled" => StepStatus::Cancelled,
            _ => StepStatus::Pending,
        }
    }
}

/// One row of the schedule table.
#[derive(Debug, Clone)]
pub struct ScheduledStep {
    pub run_id: String,
    pub phone: String,
    pub sequence: String,
    pub step_index: usize,
    pub step: Step,
    pub fire_at: DateTime<Utc>,
    pub status: StepStatus,
    pub error: Option<String>,
}

impl Store {
    /// Persist all entries of a plan as `pending` rows.
    pub fn insert_plan(
        &self,
        run_id: &str,
        phone: &str,
        sequence: &str,
        entries: &[PlanEntry],
    ) -> Result<()> {
        let conn = self.conn.lock().map_err(persist_err)?;
        let now = Utc::now().to_rfc3339();
        // All rows or none: a partial prefix would be re-armed on the next
        // start for a run whose scheduling call reported failure.
        let tx = conn.unchecked_transaction().map_err(persist_err)?;
        for entry in entries {
            tx.execute(
                "INSERT INTO scheduled_steps
                    (run_id, phone, sequence, step_index, step, fire_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    run_id,
                    phone,
                    sequence,
                    entry.step_index as i64,
                    serde_json::to_string(&entry.step).map_err(persist_err)?,
                    entry.fire_at.to_rfc3339(),
                    now,
                ],
            )
            .map_err(persist_err)?;
        }
        tx.commit().map_err(persist_err)?;
        Ok(())
    }

    /// Mark a step delivered.
    pub fn mark_step_sent(&self, run_id: &str, step_index: usize) -> Result<()> {
        self.set_step_status(run_id, step_index, StepStatus::Sent, None)
    }

    /// Mark a step failed, keeping the error for observability.
    pub fn mark_step_failed(&self, run_id: &str, step_index: usize, error: &str) -> Result<()> {
        self.set_step_status(run_id, step_index, StepStatus::Failed, Some(error))
    }

    fn set_step_status(
        &self,
        run_id: &str,
        step_index: usize,
        status: StepStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().map_err(persist_err)?;
        conn.execute(
            "UPDATE scheduled_steps SET status = ?3, error = ?4
             WHERE run_id = ?1 AND step_index = ?2",
            rusqlite::params![run_id, step_index as i64, status.as_str(), error],
        )
        .map_err(persist_err)?;
        Ok(())
    }

    /// Cancel all pending rows for a recipient across the named sequences.
    /// Returns how many rows were flipped. Fired rows are left alone.
    pub fn cancel_pending(&self, phone: &str, sequences: &[&str]) -> Result<usize> {
        let conn = self.conn.lock().map_err(persist_err)?;
        let mut total = 0usize;
        for seq in sequences {
            total += conn
                .execute(
                    "UPDATE scheduled_steps SET status = 'cancelled'
                     WHERE phone = ?1 AND sequence = ?2 AND status = 'pending'",
                    rusqlite::params![phone, seq],
                )
                .map_err(persist_err)?;
        }
        Ok(total)
    }

    /// All rows still pending — what a restart needs to re-arm.
    pub fn pending_steps(&self) -> Result<Vec<ScheduledStep>> {
        self.query_steps("status = 'pending'", &[])
    }

    /// All rows of one run, in step order. Used by tests and status queries.
    pub fn run_steps(&self, run_id: &str) -> Result<Vec<ScheduledStep>> {
        self.query_steps("run_id = ?1", &[&run_id])
    }

    fn query_steps(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ScheduledStep>> {
        let conn = self.conn.lock().map_err(persist_err)?;
        let sql = format!(
            "SELECT run_id, phone, sequence, step_index, step, fire_at, status, error
             FROM scheduled_steps WHERE {where_clause}
             ORDER BY fire_at, step_index"
        );
        let mut stmt = conn.prepare(&sql).map_err(persist_err)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })
            .map_err(persist_err)?;

        let mut out = Vec::new();
        for row in rows.filter_map(|r| r.ok()) {
            let (run_id, phone, sequence, step_index, step_json, fire_at, status, error) = row;
            let step: Step = serde_json::from_str(&step_json).map_err(persist_err)?;
            let fire_at = DateTime::parse_from_rfc3339(&fire_at)
                .map_err(persist_err)?
                .with_timezone(&Utc);
            out.push(ScheduledStep {
                run_id,
                phone,
                sequence,
                step_index: step_index as usize,
                step,
                fire_at,
                status: StepStatus::parse(&status),
                error,
            });
        }
        Ok(out)
    }
}
