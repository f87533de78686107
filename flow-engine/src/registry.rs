use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use flow_core::{ArcMessage, Context, Endpoint, ErrorCategory, FlowError, FlowId, FlowResult, FlowVisitor, Sink, Source};
use tokio::sync::mpsc;

use crate::first_error::FirstErrorCell;
use crate::sink_runner::SinkRunnerGroup;
use crate::source_runner::SourceRunnerGroup;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EndpointState {
    Inactive,
    Active,
    Closed,
}

/// Three independent capability views coerced from the same concrete
/// endpoint at registration time — never from one trait object to
/// another. This is how a duplex (`T: Source<Id, V> + Sink<Id, V>`) ends
/// up registered once under one ID while the registry can still dispatch
/// to its source and sink roles separately.
struct EndpointEntry<Id, V> {
    endpoint: Arc<dyn Endpoint<Id>>,
    source: Option<Arc<dyn Source<Id, V>>>,
    sink: Option<Arc<dyn Sink<Id, V>>>,
}

/// One registration, as handed to [`EndpointRegistry::new`] by the
/// builder. `eager` decides whether the endpoint is activated at flow
/// start or left pending until a message names it in `activate()`.
pub struct Registration<Id, V> {
    pub id: Id,
    pub endpoint: Arc<dyn Endpoint<Id>>,
    pub source: Option<Arc<dyn Source<Id, V>>>,
    pub sink: Option<Arc<dyn Sink<Id, V>>>,
    pub eager: bool,
}

/// The catalog of every endpoint in the graph: activation state, the lazy
/// lookup map, and the source/sink runner groups that actually do the
/// data-plane work once an endpoint goes active.
pub struct EndpointRegistry<Id, V> {
    entries: HashMap<Id, EndpointEntry<Id, V>>,
    eager_ids: Vec<Id>,
    states: Mutex<HashMap<Id, EndpointState>>,
    lazy_pending: Mutex<HashSet<Id>>,
    sink_receivers: Mutex<HashMap<Id, mpsc::Receiver<ArcMessage<Id, V>>>>,
    source_runners: SourceRunnerGroup<Id, V>,
    sink_runners: SinkRunnerGroup<Id, V>,
}

impl<Id, V> EndpointRegistry<Id, V>
where
    Id: FlowId,
    V: FlowVisitor,
{
    pub fn new(
        registrations: Vec<Registration<Id, V>>,
        source_runners: SourceRunnerGroup<Id, V>,
        first_error: FirstErrorCell,
    ) -> Self {
        let sink_ids: Vec<Id> = registrations
            .iter()
            .filter(|r| r.sink.is_some())
            .map(|r| r.id.clone())
            .collect();
        let (sink_runners, sink_receivers) = SinkRunnerGroup::new(sink_ids, first_error);

        let mut entries = HashMap::with_capacity(registrations.len());
        let mut states = HashMap::with_capacity(registrations.len());
        let mut lazy_pending = HashSet::new();
        let mut eager_ids = Vec::new();

        for registration in registrations {
            let Registration {
                id,
                endpoint,
                source,
                sink,
                eager,
            } = registration;

            states.insert(id.clone(), EndpointState::Inactive);
            if eager {
                eager_ids.push(id.clone());
            } else {
                lazy_pending.insert(id.clone());
            }
            entries.insert(id, EndpointEntry { endpoint, source, sink });
        }

        Self {
            entries,
            eager_ids,
            states: Mutex::new(states),
            lazy_pending: Mutex::new(lazy_pending),
            sink_receivers: Mutex::new(sink_receivers),
            source_runners,
            sink_runners,
        }
    }

    /// Activates every eager endpoint and starts its source/sink loops.
    /// Called once from `Flow::run`, before the scheduler starts.
    pub async fn activate_eager(&self, ctx: &Context) -> FlowResult<()> {
        let ids = self.eager_ids.clone();
        for id in ids {
            self.do_activate(ctx, id).await?;
        }
        Ok(())
    }

    /// Lazily activates `id` if it is still pending; a no-op (success) if
    /// it was already activated or does not exist.
    pub async fn activate(&self, ctx: &Context, id: Id) -> FlowResult<()> {
        let was_pending = self.lazy_pending.lock().expect("lazy map poisoned").remove(&id);
        if !was_pending {
            return Ok(());
        }
        self.do_activate(ctx, id).await
    }

    async fn do_activate(&self, ctx: &Context, id: Id) -> FlowResult<()> {
        let Some(entry) = self.entries.get(&id) else {
            return Ok(());
        };

        entry
            .endpoint
            .activate(ctx)
            .await
            .map_err(|err| FlowError::new(ErrorCategory::Activate, err.message().to_string()).with_cause(err))?;

        self.states
            .lock()
            .expect("endpoint state map poisoned")
            .insert(id.clone(), EndpointState::Active);

        if let Some(source) = &entry.source {
            self.source_runners.start(ctx.clone(), Arc::clone(source));
        }
        if let Some(sink) = &entry.sink {
            let rx = self
                .sink_receivers
                .lock()
                .expect("sink receiver map poisoned")
                .remove(&id)
                .expect("a registered sink must have a pre-allocated receiver");
            self.sink_runners.start(ctx.clone(), Arc::clone(sink), rx);
        }

        Ok(())
    }

    /// Routes `message` to sink `id`, activating it first if it is still
    /// lazy. Errors with category `Drain` if no sink is registered under
    /// `id`.
    pub async fn drain_to(&self, ctx: &Context, message: ArcMessage<Id, V>, id: Id) -> FlowResult<()> {
        let has_sink = self.entries.get(&id).is_some_and(|entry| entry.sink.is_some());
        if !has_sink {
            return Err(FlowError::new(ErrorCategory::Drain, format!("no such sink: {id:?}")));
        }
        self.activate(ctx, id.clone()).await?;
        self.sink_runners.send(ctx, &id, message).await
    }

    pub fn exhausted(&self) -> bool {
        self.source_runners.exhausted()
    }

    pub fn source_runners(&self) -> &SourceRunnerGroup<Id, V> {
        &self.source_runners
    }

    pub fn sink_runners(&self) -> &SinkRunnerGroup<Id, V> {
        &self.sink_runners
    }

    /// Closes every endpoint that reached `Active`. Close errors are
    /// swallowed — the flow is already terminating and the first latched
    /// error already explains why.
    pub async fn close_all(&self, ctx: &Context) {
        let active_ids: Vec<Id> = {
            let states = self.states.lock().expect("endpoint state map poisoned");
            states
                .iter()
                .filter(|(_, state)| **state == EndpointState::Active)
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in active_ids {
            if let Some(entry) = self.entries.get(&id) {
                if let Err(err) = entry.endpoint.close(ctx).await {
                    tracing::warn!(id = ?id, error = %err, "endpoint close failed during shutdown, dropping error");
                }
            }
            self.states
                .lock()
                .expect("endpoint state map poisoned")
                .insert(id, EndpointState::Closed);
        }
    }
}
