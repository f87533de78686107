use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use flow_core::{Context, ErrorCategory, FlowError, FlowId, FlowVisitor, Source};
use tokio::task::JoinHandle;

use crate::first_error::FirstErrorCell;
use crate::inflight::InFlight;
use crate::panic::join_panic_as_error;
use crate::requeue::WakeSignal;

/// Owns the live producer loop for every active source and the count of
/// loops still running, so the scheduler can learn "sources exhausted"
/// without polling each source individually.
pub struct SourceRunnerGroup<Id, V> {
    live: Arc<AtomicI64>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    inflight: InFlight<Id, V>,
    wake: WakeSignal,
    first_error: FirstErrorCell,
}

impl<Id, V> SourceRunnerGroup<Id, V>
where
    Id: FlowId,
    V: FlowVisitor,
{
    pub fn new(inflight: InFlight<Id, V>, wake: WakeSignal, first_error: FirstErrorCell) -> Self {
        Self {
            live: Arc::new(AtomicI64::new(0)),
            handles: Mutex::new(Vec::new()),
            inflight,
            wake,
            first_error,
        }
    }

    /// Spawns the producer loop for `source` and increments the live count.
    pub fn start(&self, ctx: Context, source: Arc<dyn Source<Id, V>>) {
        self.live.fetch_add(1, Ordering::SeqCst);

        let live = Arc::clone(&self.live);
        let inflight = self.inflight.clone();
        let wake = self.wake.clone();
        let first_error = self.first_error.clone();

        let handle = tokio::spawn(async move {
            let outcome = run_loop(&ctx, source.as_ref(), &inflight).await;
            if let Err(err) = outcome {
                first_error.report(err);
            }
            live.fetch_sub(1, Ordering::SeqCst);
            // Every exit — success, error, or cancellation — re-enters the
            // scheduler's quiescence check promptly.
            wake.notify();
        });

        self.handles.lock().expect("source handle list poisoned").push(handle);
    }

    pub fn exhausted(&self) -> bool {
        self.live.load(Ordering::Acquire) <= 0
    }

    /// Joins every spawned producer loop, folding any panic into a latched
    /// [`ErrorCategory::Panic`] error.
    pub async fn join_all(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().expect("source handle list poisoned"));
        for handle in handles {
            if let Err(err) = join_panic_as_error(handle.await.map(Ok)) {
                self.first_error.report(err);
            }
        }
    }
}

async fn run_loop<Id, V>(
    ctx: &Context,
    source: &(dyn Source<Id, V> + 'static),
    inflight: &InFlight<Id, V>,
) -> Result<(), FlowError>
where
    Id: FlowId,
    V: FlowVisitor,
{
    loop {
        if ctx.is_cancelled() {
            return Ok(());
        }

        let (batch, more) = source
            .next(ctx)
            .await
            .map_err(|err| FlowError::new(ErrorCategory::Source, err.message().to_string()).with_cause(err))?;

        for message in batch {
            if ctx.is_cancelled() {
                return Ok(());
            }
            if !inflight.send(ctx, message).await {
                return Ok(());
            }
        }

        if !more {
            return Ok(());
        }
    }
}
