//! Bounded dispatch queue and worker pool.
//!
//! Timers do not call the transport directly: due steps are pushed onto a
//! bounded mpsc queue drained by a small pool of workers. The bound gives
//! backpressure when the transport is slow; per-step outcomes land in the
//! schedule table and the logs.

use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use leadclaw_core::types::Step;
use leadclaw_store::Store;

use crate::channel::ChannelDispatcher;

/// One due step, ready for the worker pool.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub run_id: String,
    pub phone: String,
    pub sequence: String,
    pub step_index: usize,
    pub step: Step,
}

/// Spawn `count` workers draining the queue. Workers run for the life of
/// the process; the pool stops when the send side is dropped.
pub(crate) fn spawn_workers(
    count: usize,
    rx: mpsc::Receiver<DispatchJob>,
    dispatcher: Arc<ChannelDispatcher>,
    store: Arc<Store>,
) {
    let rx = Arc::new(Mutex::new(rx));
    for worker_id in 0..count.max(1) {
        let rx = rx.clone();
        let dispatcher = dispatcher.clone();
        let store = store.clone();
        tokio::spawn(async move {
            loop {
                let job = { rx.lock().await.recv().await };
                let Some(job) = job else { break };
                handle_job(worker_id, &dispatcher, &store, job).await;
            }
        });
    }
}

async fn handle_job(worker_id: usize, dispatcher: &ChannelDispatcher, store: &Store, job: DispatchJob) {
    match dispatcher.dispatch(&job.phone, &job.step).await {
        Ok(()) => {
            tracing::info!(
                "📨 [{}] step {} ({}) → {} sent",
                job.sequence,
                job.step_index,
                job.step.kind,
                job.phone
            );
            if let Err(e) = store.mark_step_sent(&job.run_id, job.step_index) {
                tracing::warn!("schedule row update failed for run {}: {e}", job.run_id);
            }
        }
        Err(e) => {
            // Failure attribution: recipient + step index + channel type.
            // Never retried, never propagated — siblings keep firing.
            tracing::warn!(
                "⚠️ [{}] step {} ({}) → {} failed on worker {}: {e}",
                job.sequence,
                job.step_index,
                job.step.kind,
                job.phone,
                worker_id
            );
            if let Err(e) = store.mark_step_failed(&job.run_id, job.step_index, &e.to_string()) {
                tracing::warn!("schedule row update failed for run {}: {e}", job.run_id);
            }
        }
    }
}
