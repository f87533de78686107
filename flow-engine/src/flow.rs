use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use flow_core::{Context, ErrorCategory, FlowError, FlowId, FlowResult, FlowVisitor};
use tokio::task::JoinHandle;

use crate::first_error::FirstErrorCell;
use crate::inflight::InFlight;
use crate::registry::{EndpointRegistry, Registration};
use crate::requeue::{RequeueQueue, WakeSignal};
use crate::scheduler::ActorPool;

enum RunState<Id, V> {
    /// The fast path: no eager source or duplex was registered, so there
    /// was nothing to drive. `Wait` returns success immediately.
    NotDriven,
    /// `activate_eager` failed during `Run`; `Run` already returned this
    /// error to its caller, and `Wait` reports the same failure.
    Failed(FlowError),
    Driving(Driving<Id, V>),
}

struct Driving<Id, V> {
    ctx: Context,
    registry: Arc<EndpointRegistry<Id, V>>,
    scheduler: Arc<ActorPool<Id, V>>,
    scheduler_handle: JoinHandle<()>,
    first_error: FirstErrorCell,
}

/// The assembled, runnable flow. Build one with [`crate::builder::Builder`].
pub struct Flow<Id, V> {
    registrations: Mutex<Option<Vec<Registration<Id, V>>>>,
    visitor: Arc<V>,
    concurrency: usize,
    started: AtomicBool,
    state: Mutex<Option<RunState<Id, V>>>,
}

impl<Id, V> Flow<Id, V>
where
    Id: FlowId,
    V: FlowVisitor,
{
    pub(crate) fn new(registrations: Vec<Registration<Id, V>>, visitor: V, concurrency: usize) -> Self {
        Self {
            registrations: Mutex::new(Some(registrations)),
            visitor: Arc::new(visitor),
            concurrency,
            started: AtomicBool::new(false),
            state: Mutex::new(None),
        }
    }

    /// Starts all eager endpoints and the scheduler. Rejects a second call
    /// with [`ErrorCategory::AlreadyRunning`].
    ///
    /// If this returns an error, `Wait` must not be called — the flow
    /// never reached a drivable state.
    pub async fn run(&self, parent_ctx: &Context) -> FlowResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(FlowError::new(ErrorCategory::AlreadyRunning, "flow is already running"));
        }

        let registrations = self
            .registrations
            .lock()
            .expect("registrations mutex poisoned")
            .take()
            .expect("Run invoked exactly once after the AlreadyRunning guard passed");

        let has_eager_driver = registrations.iter().any(|r| r.eager && r.source.is_some());
        if !has_eager_driver {
            *self.state.lock().expect("state mutex poisoned") = Some(RunState::NotDriven);
            return Ok(());
        }

        let child_ctx = parent_ctx.child();
        let first_error = FirstErrorCell::new(child_ctx.clone());
        let inflight = InFlight::new();
        let requeue = Arc::new(RequeueQueue::new());
        let wake = WakeSignal::new();

        let source_runners = crate::source_runner::SourceRunnerGroup::new(inflight.clone(), wake.clone(), first_error.clone());
        let registry = Arc::new(EndpointRegistry::new(registrations, source_runners, first_error.clone()));

        if let Err(err) = registry.activate_eager(&child_ctx).await {
            child_ctx.cancel();
            *self.state.lock().expect("state mutex poisoned") = Some(RunState::Failed(err.shallow_clone()));
            return Err(err);
        }

        let scheduler = Arc::new(ActorPool::new(
            Arc::clone(&registry),
            inflight,
            requeue,
            wake,
            Arc::clone(&self.visitor),
            first_error.clone(),
            self.concurrency,
        ));
        let scheduler_handle = Arc::clone(&scheduler).spawn(child_ctx.clone());

        *self.state.lock().expect("state mutex poisoned") = Some(RunState::Driving(Driving {
            ctx: child_ctx,
            registry,
            scheduler,
            scheduler_handle,
            first_error,
        }));

        Ok(())
    }

    /// Blocks until the flow reaches a terminal state; returns the first
    /// latched error, a `Cancelled` error if the parent context was
    /// cancelled with no internal failure, or `Ok(())`.
    pub async fn wait(&self) -> FlowResult<()> {
        let state = self.state.lock().expect("state mutex poisoned").take();

        match state {
            None | Some(RunState::NotDriven) => Ok(()),
            Some(RunState::Failed(err)) => Err(err),
            Some(RunState::Driving(driving)) => self.wait_driving(driving).await,
        }
    }

    async fn wait_driving(&self, driving: Driving<Id, V>) -> FlowResult<()> {
        let _ = driving.scheduler_handle.await;
        driving.scheduler.join_workers().await;

        driving.registry.sink_runners().close_all();
        driving.registry.sink_runners().join_all().await;
        driving.registry.source_runners().join_all().await;

        if let Some(err) = driving.first_error.take() {
            driving.registry.close_all(&driving.ctx).await;
            return Err(err);
        }

        if driving.ctx.is_cancelled() {
            driving.registry.close_all(&driving.ctx).await;
            return Err(FlowError::new(ErrorCategory::Cancelled, "context cancelled"));
        }

        let fresh_ctx = Context::new();
        driving.registry.close_all(&fresh_ctx).await;
        Ok(())
    }
}
