//! Dispatch engine — scheduling entry points and the bulk coordinator.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use leadclaw_core::config::DispatchConfig;
use leadclaw_core::error::{LeadClawError, Result};
use leadclaw_core::phone;
use leadclaw_core::traits::Transport;
use leadclaw_core::types::{BatchResult, PlanEntry, RecipientResult, Step};
use leadclaw_store::Store;

use crate::channel::ChannelDispatcher;
use crate::planner;
use crate::queue::{self, DispatchJob};
use crate::runner::{self, RunRegistry, RunState};

/// What a batch fans out: an inline step list shared verbatim across all
/// recipients, or a named sequence resolved once from the store.
pub enum BatchSource {
    Inline(Vec<Step>),
    Named(String),
}

/// Owns the run registry, the dispatch queue, and the worker pool.
pub struct DispatchEngine {
    store: Arc<Store>,
    registry: Arc<RunRegistry>,
    tx: mpsc::Sender<DispatchJob>,
}

impl DispatchEngine {
    /// Build the engine and spawn its worker pool.
    pub fn new(store: Arc<Store>, transport: Arc<dyn Transport>, config: &DispatchConfig) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let dispatcher = Arc::new(ChannelDispatcher::new(transport));
        queue::spawn_workers(config.workers, rx, dispatcher, store.clone());
        Arc::new(Self {
            store,
            registry: Arc::new(RunRegistry::new()),
            tx,
        })
    }

    /// Schedule one run of an inline step list for one recipient.
    /// Returns the run id once every timer is armed — it does not wait for
    /// any step to fire.
    pub fn schedule_steps(
        &self,
        raw_phone: &str,
        label: &str,
        steps: &[Step],
        start_at: DateTime<Utc>,
    ) -> Result<String> {
        if steps.is_empty() {
            return Err(LeadClawError::Validation(
                "sequence has no steps".into(),
            ));
        }
        let phone = phone::canonical_digits(raw_phone)?;
        let entries = planner::plan(steps, start_at)?;
        let run_id = uuid::Uuid::new_v4().to_string();

        // Rows first, timers second: a crash between the two leaves pending
        // rows that resume_pending() re-arms.
        self.store.insert_plan(&run_id, &phone, label, &entries)?;
        self.arm_run(&run_id, &phone, label, entries);

        tracing::info!(
            "📤 [{}] run {} armed for {} ({} steps, starts {})",
            label,
            run_id,
            phone,
            steps.len(),
            start_at.to_rfc3339()
        );
        Ok(run_id)
    }

    /// Resolve a named sequence and schedule it for one recipient.
    pub fn schedule_sequence(
        &self,
        raw_phone: &str,
        name: &str,
        start_at: DateTime<Utc>,
    ) -> Result<String> {
        let steps = self
            .store
            .get_sequence(name)?
            .ok_or_else(|| LeadClawError::NotFound(format!("sequence '{name}'")))?;
        self.schedule_steps(raw_phone, name, &steps, start_at)
    }

    /// Schedule a single text message, outside any tracked sequence.
    /// Used by the lifecycle follow-ups.
    pub fn schedule_message(
        &self,
        raw_phone: &str,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<String> {
        self.schedule_steps(raw_phone, "direct", &[Step::text(text)], at)
    }

    /// Cancel pending steps for a recipient across the named sequences.
    /// Fired steps are not retracted. Returns how many steps were skipped.
    pub fn cancel(&self, raw_phone: &str, sequences: &[&str]) -> Result<usize> {
        let phone = phone::canonical_digits(raw_phone)?;
        let skipped = self.store.cancel_pending(&phone, sequences)?;
        let runs = self.registry.cancel(&phone, sequences);
        if runs > 0 || skipped > 0 {
            tracing::info!(
                "🚫 cancelled {} run(s) / {} pending step(s) for {} in {:?}",
                runs,
                skipped,
                phone,
                sequences
            );
        }
        Ok(skipped)
    }

    /// Bulk Coordinator: fan a step list or named sequence out over a
    /// recipient list, one run per recipient.
    ///
    /// Returns immediately with per-recipient *scheduling* outcomes; actual
    /// delivery is observable only through the schedule table and the logs.
    /// An unknown sequence name fails the whole batch before any timer is
    /// armed.
    pub fn run_batch(&self, phones: &[String], source: BatchSource) -> Result<BatchResult> {
        if phones.is_empty() {
            return Err(LeadClawError::Validation("phones list is empty".into()));
        }
        let (label, steps) = match source {
            BatchSource::Inline(steps) => {
                if steps.is_empty() {
                    return Err(LeadClawError::Validation("messages list is empty".into()));
                }
                ("bulk".to_string(), steps)
            }
            BatchSource::Named(name) => {
                let steps = self
                    .store
                    .get_sequence(&name)?
                    .ok_or_else(|| LeadClawError::NotFound(format!("sequence '{name}'")))?;
                (name, steps)
            }
        };

        let start = Utc::now();
        let results: Vec<RecipientResult> = phones
            .iter()
            .map(|p| match self.schedule_steps(p, &label, &steps, start) {
                Ok(_) => RecipientResult {
                    phone: p.clone(),
                    success: true,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!("⚠️ [{}] scheduling failed for {p}: {e}", label);
                    RecipientResult {
                        phone: p.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect();

        Ok(BatchResult::from_results(results))
    }

    /// Re-arm every pending schedule row. Called once at startup; past-due
    /// rows fire immediately. Returns the number of re-armed steps.
    pub fn resume_pending(&self) -> Result<usize> {
        let pending = self.store.pending_steps()?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut by_run: HashMap<String, Vec<_>> = HashMap::new();
        for row in pending {
            by_run.entry(row.run_id.clone()).or_default().push(row);
        }

        let mut total = 0;
        for (run_id, rows) in by_run {
            let phone = rows[0].phone.clone();
            let sequence = rows[0].sequence.clone();
            let entries: Vec<PlanEntry> = rows
                .into_iter()
                .map(|r| PlanEntry {
                    step_index: r.step_index,
                    fire_at: r.fire_at,
                    step: r.step,
                })
                .collect();
            total += entries.len();
            tracing::info!(
                "🔁 [{}] resuming run {} for {} ({} pending step(s))",
                sequence,
                run_id,
                phone,
                entries.len()
            );
            self.arm_run(&run_id, &phone, &sequence, entries);
        }
        Ok(total)
    }

    /// Number of runs with timers still armed.
    pub fn active_runs(&self) -> usize {
        self.registry.active_runs()
    }

    fn arm_run(&self, run_id: &str, phone: &str, sequence: &str, entries: Vec<PlanEntry>) {
        let run = Arc::new(RunState::new(run_id, entries.len()));
        self.registry.register(phone, sequence, run.clone());
        for entry in entries {
            runner::arm_entry(
                self.registry.clone(),
                run.clone(),
                phone.to_string(),
                sequence.to_string(),
                entry,
                self.tx.clone(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use leadclaw_core::types::StepKind;
    use leadclaw_store::StepStatus;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Transport fake: records every call, optionally failing on a content
    /// marker.
    #[derive(Default)]
    struct FakeTransport {
        calls: Mutex<Vec<(String, String)>>, // (phone, content)
        fail_marker: Option<String>,
    }

    impl FakeTransport {
        fn failing_on(marker: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_marker: Some(marker.to_string()),
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn send(&self, phone: &str, content: &str) -> Result<()> {
            if let Some(marker) = &self.fail_marker {
                if content.contains(marker.as_str()) {
                    return Err(LeadClawError::Dispatch("simulated transport failure".into()));
                }
            }
            self.calls
                .lock()
                .unwrap()
                .push((phone.to_string(), content.to_string()));
            Ok(())
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn name(&self) -> &str {
            "fake"
        }
        async fn send_text(&self, phone: &str, text: &str) -> Result<()> {
            self.send(phone, text)
        }
        async fn send_image(&self, phone: &str, url: &str, _caption: Option<&str>) -> Result<()> {
            self.send(phone, url)
        }
        async fn send_voice_note(&self, phone: &str, url: &str, _ptt: bool) -> Result<()> {
            self.send(phone, url)
        }
        async fn send_video(&self, phone: &str, url: &str, _caption: Option<&str>) -> Result<()> {
            self.send(phone, url)
        }
        async fn send_video_note(&self, phone: &str, url: &str, _seconds: Option<u32>) -> Result<()> {
            self.send(phone, url)
        }
    }

    fn engine_with(transport: Arc<FakeTransport>) -> (Arc<DispatchEngine>, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let engine = DispatchEngine::new(store.clone(), transport, &DispatchConfig::default());
        (engine, store)
    }

    fn timed_step(content: &str, delay: i64) -> Step {
        let mut s = Step::text(content);
        s.delay = delay;
        s
    }

    /// Let armed timers and queue workers run without advancing the clock.
    async fn drain() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_returns_immediately_delivery_happens_later() {
        let transport = Arc::new(FakeTransport::default());
        let (engine, store) = engine_with(transport.clone());
        store
            .put_sequence(
                "WebEnviada",
                &[timed_step("paso uno", 5), timed_step("paso dos", 0)],
            )
            .unwrap();

        let phones = vec![
            "5215511111111".to_string(),
            "5215522222222".to_string(),
            "5215533333333".to_string(),
        ];
        let batch = engine
            .run_batch(&phones, BatchSource::Named("WebEnviada".into()))
            .unwrap();

        // Scheduling success reported before anything is delivered.
        assert_eq!(batch.total, 3);
        assert_eq!(batch.success, 3);
        assert_eq!(batch.failed, 0);

        // Step 0 fires at run start for all three recipients.
        drain().await;
        assert_eq!(transport.count(), 3);

        // Step 1 only fires after the 5 simulated minutes elapse.
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        drain().await;
        assert_eq!(transport.count(), 3);

        tokio::time::advance(Duration::from_secs(61)).await;
        drain().await;
        assert_eq!(transport.count(), 6);
        let second_wave: Vec<_> = transport
            .sent()
            .into_iter()
            .filter(|(_, c)| c == "paso dos")
            .collect();
        assert_eq!(second_wave.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_sequence_fails_batch_without_arming_timers() {
        let transport = Arc::new(FakeTransport::default());
        let (engine, store) = engine_with(transport.clone());

        let err = engine
            .run_batch(
                &["5215511111111".to_string()],
                BatchSource::Named("NoExiste".into()),
            )
            .unwrap_err();
        assert!(matches!(err, LeadClawError::NotFound(_)));
        assert_eq!(engine.active_runs(), 0);
        assert!(store.pending_steps().unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(3600)).await;
        drain().await;
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_any_fire_means_zero_sends() {
        let transport = Arc::new(FakeTransport::default());
        let (engine, store) = engine_with(transport.clone());

        let run_id = engine
            .schedule_steps(
                "5215511111111",
                "WebEnviada",
                &[timed_step("uno", 2), timed_step("dos", 3)],
                Utc::now() + chrono::Duration::minutes(1),
            )
            .unwrap();
        drain().await;

        let skipped = engine.cancel("5215511111111", &["WebEnviada"]).unwrap();
        assert_eq!(skipped, 2);

        tokio::time::advance(Duration::from_secs(30 * 60)).await;
        drain().await;
        assert_eq!(transport.count(), 0);
        assert!(
            store
                .run_steps(&run_id)
                .unwrap()
                .iter()
                .all(|r| r.status == StepStatus::Cancelled)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_k_fires_means_exactly_k_sends() {
        let transport = Arc::new(FakeTransport::default());
        let (engine, _store) = engine_with(transport.clone());

        engine
            .schedule_steps(
                "5215511111111",
                "WebEnviada",
                &[timed_step("uno", 5), timed_step("dos", 5), timed_step("tres", 0)],
                Utc::now(),
            )
            .unwrap();

        // Step 0 fires immediately.
        drain().await;
        assert_eq!(transport.count(), 1);

        // Cancel between step 0 and step 1.
        engine.cancel("5215511111111", &["WebEnviada"]).unwrap();
        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        drain().await;

        // Fired steps stay fired; nothing else goes out.
        assert_eq!(transport.count(), 1);
        assert_eq!(transport.sent()[0].1, "uno");
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_failure_is_isolated() {
        let transport = Arc::new(FakeTransport::failing_on("falla"));
        let (engine, store) = engine_with(transport.clone());

        let run_id = engine
            .schedule_steps(
                "5215511111111",
                "bulk",
                &[
                    timed_step("uno", 0),
                    timed_step("esto falla", 0),
                    timed_step("tres", 0),
                ],
                Utc::now(),
            )
            .unwrap();
        drain().await;

        // Both healthy steps delivered despite the middle one failing.
        let delivered: Vec<_> = transport.sent().into_iter().map(|(_, c)| c).collect();
        assert_eq!(delivered, vec!["uno".to_string(), "tres".to_string()]);

        // The failure is attributed to its own step index.
        let rows = store.run_steps(&run_id).unwrap();
        assert_eq!(rows[0].status, StepStatus::Sent);
        assert_eq!(rows[1].status, StepStatus::Failed);
        assert!(rows[1].error.as_deref().unwrap().contains("simulated"));
        assert_eq!(rows[2].status, StepStatus::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_kind_fails_its_own_step_only() {
        let transport = Arc::new(FakeTransport::default());
        let (engine, store) = engine_with(transport.clone());

        let mut weird = timed_step("???", 0);
        weird.kind = StepKind::Unknown;
        let run_id = engine
            .schedule_steps(
                "5215511111111",
                "bulk",
                &[timed_step("uno", 0), weird, timed_step("tres", 0)],
                Utc::now(),
            )
            .unwrap();
        drain().await;

        assert_eq!(transport.count(), 2);
        let rows = store.run_steps(&run_id).unwrap();
        assert_eq!(rows[1].status, StepStatus::Failed);
        assert!(rows[1].error.as_deref().unwrap().contains("unsupported step type"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_delay_schedules_nothing() {
        let transport = Arc::new(FakeTransport::default());
        let (engine, store) = engine_with(transport.clone());

        let err = engine
            .schedule_steps(
                "5215511111111",
                "bulk",
                &[timed_step("uno", 0), timed_step("dos", -5)],
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, LeadClawError::Validation(_)));
        assert!(store.pending_steps().unwrap().is_empty());
        drain().await;
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_recipient_does_not_poison_batch() {
        let transport = Arc::new(FakeTransport::default());
        let (engine, _store) = engine_with(transport.clone());

        let batch = engine
            .run_batch(
                &["5215511111111".to_string(), "no-es-telefono".to_string()],
                BatchSource::Inline(vec![timed_step("hola", 0)]),
            )
            .unwrap();
        assert_eq!(batch.total, 2);
        assert_eq!(batch.success, 1);
        assert_eq!(batch.failed, 1);
        assert!(batch.results[1].error.is_some());

        drain().await;
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_rearms_pending_rows() {
        let transport = Arc::new(FakeTransport::default());
        let (engine, store) = engine_with(transport.clone());

        // Simulate rows left behind by a previous process: one past due,
        // one in the future.
        let now = Utc::now();
        let entries = vec![
            PlanEntry {
                step_index: 0,
                fire_at: now - chrono::Duration::minutes(10),
                step: Step::text("atrasado"),
            },
            PlanEntry {
                step_index: 1,
                fire_at: now + chrono::Duration::minutes(3),
                step: Step::text("futuro"),
            },
        ];
        store
            .insert_plan("run-old", "5215511111111", "WebEnviada", &entries)
            .unwrap();

        assert_eq!(engine.resume_pending().unwrap(), 2);
        drain().await;
        // Past-due step fires immediately.
        assert_eq!(transport.count(), 1);
        assert_eq!(transport.sent()[0].1, "atrasado");

        tokio::time::advance(Duration::from_secs(200)).await;
        drain().await;
        assert_eq!(transport.count(), 2);
    }
}
