use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use flow_core::{ArcMessage, BoxMessage, Context, ErrorCategory, FlowError, FlowId, FlowResult, FlowVisitor};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::first_error::FirstErrorCell;
use crate::inflight::InFlight;
use crate::panic::join_panic_as_error;
use crate::registry::EndpointRegistry;
use crate::requeue::{RequeueQueue, WakeSignal};

/// The bounded worker pool that drains the requeue queue and the in-flight
/// channel, runs message chains, and detects quiescence.
pub struct ActorPool<Id, V> {
    registry: Arc<EndpointRegistry<Id, V>>,
    inflight: InFlight<Id, V>,
    requeue: Arc<RequeueQueue<Id, V>>,
    wake: WakeSignal,
    visitor: Arc<V>,
    first_error: FirstErrorCell,
    concurrency: Arc<Semaphore>,
    active_workers: Arc<AtomicI64>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<Id, V> ActorPool<Id, V>
where
    Id: FlowId,
    V: FlowVisitor,
{
    pub fn new(
        registry: Arc<EndpointRegistry<Id, V>>,
        inflight: InFlight<Id, V>,
        requeue: Arc<RequeueQueue<Id, V>>,
        wake: WakeSignal,
        visitor: Arc<V>,
        first_error: FirstErrorCell,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            inflight,
            requeue,
            wake,
            visitor,
            first_error,
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
            active_workers: Arc::new(AtomicI64::new(0)),
            worker_handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the scheduler loop itself. The returned handle resolves once
    /// the loop reaches quiescence or `ctx` is cancelled. Worker chains
    /// dispatched along the way are tracked separately — join them with
    /// [`Self::join_workers`] after this handle resolves.
    pub fn spawn(self: Arc<Self>, ctx: Context) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(ctx).await })
    }

    async fn run(&self, ctx: Context) {
        let mut rx = self.inflight.take_receiver();

        loop {
            if let Some(message) = self.requeue.pop() {
                self.dispatch(&ctx, message);
                continue;
            }

            if self.registry.exhausted()
                && self.inflight.load() <= 0
                && self.active_workers.load(Ordering::Acquire) <= 0
            {
                return;
            }

            tokio::select! {
                biased;
                _ = ctx.cancelled() => return,
                _ = self.wake.notified() => continue,
                received = rx.recv() => {
                    match received {
                        Some(message) => {
                            self.inflight.decr();
                            self.dispatch(&ctx, message);
                        }
                        None => continue,
                    }
                }
            }
        }
    }

    /// Awaits every worker chain spawned so far. Call after the scheduler
    /// handle resolves — by then no further chains are dispatched, so the
    /// handle list is stable.
    pub async fn join_workers(&self) {
        let handles = std::mem::take(&mut *self.worker_handles.lock().expect("worker handle list poisoned"));
        for handle in handles {
            // Outer dispatch tasks never panic themselves (see dispatch's
            // doc comment); a join error here would be a bug in the pool,
            // not a user callback failure, so it is only logged.
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "actor pool worker task failed to join");
            }
        }
    }

    /// Dispatches one chain to a worker slot.
    ///
    /// The active-worker count is incremented here, synchronously, before
    /// the worker task is even spawned — mirroring `submit` in the ground
    /// truth, where `ap.active.Add(1)` runs in the scheduler goroutine
    /// before the loop re-checks quiescence. Deferring the increment into
    /// the spawned task would leave a window, between a message being
    /// popped and its worker actually running, where the scheduler could
    /// observe `active_workers == 0` and wrongly conclude quiescence.
    ///
    /// The chain itself runs in a nested `tokio::spawn` so that a panic
    /// inside a user callback (`activate`/`accept`/`drain`) surfaces as a
    /// `JoinError` this function can fold into [`ErrorCategory::Panic`]
    /// (the structured-recovery collaborator spec'd in §6) — the outer
    /// task, which owns the permit and the active-worker count, always
    /// reaches its accounting step regardless of what the inner task does.
    fn dispatch(&self, ctx: &Context, message: BoxMessage<Id, V>) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);

        let permit_fut = Arc::clone(&self.concurrency).acquire_owned();
        let registry = Arc::clone(&self.registry);
        let requeue = Arc::clone(&self.requeue);
        let wake = self.wake.clone();
        let visitor = Arc::clone(&self.visitor);
        let first_error = self.first_error.clone();
        let active_workers = Arc::clone(&self.active_workers);
        let ctx = ctx.clone();

        let handle = tokio::spawn(async move {
            let permit = match permit_fut.await {
                Ok(permit) => permit,
                Err(_) => {
                    if active_workers.fetch_sub(1, Ordering::SeqCst) == 1 {
                        wake.notify();
                    }
                    return;
                }
            };

            let chain_ctx = ctx.clone();
            let inner = tokio::spawn(async move {
                run_chain(&chain_ctx, message, &registry, &requeue, &wake, &visitor).await
            });

            if let Err(err) = join_panic_as_error(inner.await) {
                first_error.report(err);
            }

            drop(permit);
            if active_workers.fetch_sub(1, Ordering::SeqCst) == 1 {
                wake.notify();
            }
        });

        self.worker_handles.lock().expect("worker handle list poisoned").push(handle);
    }
}

async fn run_chain<Id, V>(
    ctx: &Context,
    mut message: BoxMessage<Id, V>,
    registry: &EndpointRegistry<Id, V>,
    requeue: &RequeueQueue<Id, V>,
    wake: &WakeSignal,
    visitor: &V,
) -> FlowResult<()>
where
    Id: FlowId,
    V: FlowVisitor,
{
    loop {
        for id in message.activate(ctx).await {
            registry.activate(ctx, id).await?;
        }

        let targets = message.drain_to(ctx).await;
        if !targets.is_empty() {
            let shared: ArcMessage<Id, V> = Arc::from(message);
            for id in targets {
                registry.drain_to(ctx, Arc::clone(&shared), id).await?;
            }
            return Ok(());
        }

        let mut successors = message
            .accept(ctx, visitor)
            .await
            .map_err(|err| FlowError::new(ErrorCategory::Accept, err.message().to_string()).with_cause(err))?;

        match successors.len() {
            0 => return Ok(()),
            1 => {
                message = successors.pop().expect("length checked above");
            }
            _ => {
                let last = successors.pop().expect("length checked above");
                requeue.push_many(successors);
                wake.notify();
                message = last;
            }
        }
    }
}
