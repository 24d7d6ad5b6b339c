//! Sequence Runner — per-run timers and the cancellation registry.
//!
//! Each plan entry gets its own tokio timer; firing never blocks sibling
//! steps or other recipients' runs. Cancellation is best-effort and keyed by
//! (recipient, sequence name): steps whose fire time has not elapsed are
//! skipped, fired steps stay fired.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{Notify, mpsc};

use leadclaw_core::types::PlanEntry;

use crate::queue::DispatchJob;

/// Shared cancellation state for one run.
pub struct RunState {
    pub run_id: String,
    cancel: Notify,
    cancelled: AtomicBool,
    remaining: AtomicUsize,
}

impl RunState {
    pub fn new(run_id: &str, steps: usize) -> Self {
        Self {
            run_id: run_id.to_string(),
            cancel: Notify::new(),
            cancelled: AtomicBool::new(false),
            remaining: AtomicUsize::new(steps),
        }
    }

    /// Signal every armed timer of this run to skip.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn cancelled_wait(&self) {
        self.cancel.notified().await;
    }

    /// One timer finished (fired or skipped). True when the run is drained.
    fn release(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::SeqCst) == 1
    }
}

type RunKey = (String, String); // (phone, sequence)

/// Active runs, indexed by (recipient, sequence name).
///
/// Several runs may share a key (re-triggering is legal); cancellation
/// signals all of them.
#[derive(Default)]
pub struct RunRegistry {
    inner: Mutex<HashMap<RunKey, Vec<Arc<RunState>>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, phone: &str, sequence: &str, run: Arc<RunState>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .entry((phone.to_string(), sequence.to_string()))
            .or_default()
            .push(run);
    }

    /// Cancel every active run matching the recipient + any of the names.
    /// Returns the number of runs signalled.
    pub fn cancel(&self, phone: &str, sequences: &[&str]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let mut signalled = 0;
        for seq in sequences {
            if let Some(runs) = inner.remove(&(phone.to_string(), seq.to_string())) {
                for run in runs {
                    run.cancel();
                    signalled += 1;
                }
            }
        }
        signalled
    }

    /// Drop a drained run from the index.
    fn forget(&self, phone: &str, sequence: &str, run_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        let key = (phone.to_string(), sequence.to_string());
        if let Some(runs) = inner.get_mut(&key) {
            runs.retain(|r| r.run_id != run_id);
            if runs.is_empty() {
                inner.remove(&key);
            }
        }
    }

    pub fn active_runs(&self) -> usize {
        self.inner.lock().unwrap().values().map(Vec::len).sum()
    }
}

/// Arm one plan entry as an independent timer.
///
/// Past-due fire times (a resumed schedule, a zero offset) fire immediately.
/// The timer pushes the due step onto the dispatch queue; it does not wait
/// for the send to complete, so a slow transport call delays nothing else.
pub(crate) fn arm_entry(
    registry: Arc<RunRegistry>,
    run: Arc<RunState>,
    phone: String,
    sequence: String,
    entry: PlanEntry,
    tx: mpsc::Sender<DispatchJob>,
) {
    tokio::spawn(async move {
        let wait = (entry.fire_at - Utc::now()).to_std().unwrap_or_default();
        let deadline = tokio::time::Instant::now() + wait;

        tokio::select! {
            _ = run.cancelled_wait() => {
                tracing::debug!(
                    "🚫 [{}] step {} for {} skipped (run {} cancelled)",
                    sequence, entry.step_index, phone, run.run_id
                );
            }
            _ = tokio::time::sleep_until(deadline) => {
                if !run.is_cancelled() {
                    let job = DispatchJob {
                        run_id: run.run_id.clone(),
                        phone: phone.clone(),
                        sequence: sequence.clone(),
                        step_index: entry.step_index,
                        step: entry.step,
                    };
                    if tx.send(job).await.is_err() {
                        tracing::warn!(
                            "dispatch queue closed; step {} for {} dropped",
                            entry.step_index, phone
                        );
                    }
                }
            }
        }

        if run.release() {
            registry.forget(&phone, &sequence, &run.run_id);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_cancel_matches_key() {
        let registry = RunRegistry::new();
        let run = Arc::new(RunState::new("run-1", 2));
        registry.register("5215512345678", "WebEnviada", run.clone());

        // Wrong sequence name: nothing signalled.
        assert_eq!(registry.cancel("5215512345678", &["LinkAbierto"]), 0);
        assert!(!run.is_cancelled());

        assert_eq!(registry.cancel("5215512345678", &["WebEnviada"]), 1);
        assert!(run.is_cancelled());
        assert_eq!(registry.active_runs(), 0);
    }

    #[test]
    fn test_registry_forget_on_drain() {
        let registry = RunRegistry::new();
        let run = Arc::new(RunState::new("run-1", 1));
        registry.register("5215512345678", "WebEnviada", run.clone());
        assert_eq!(registry.active_runs(), 1);

        assert!(run.release());
        registry.forget("5215512345678", "WebEnviada", "run-1");
        assert_eq!(registry.active_runs(), 0);
    }
}
