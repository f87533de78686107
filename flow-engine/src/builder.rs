use std::sync::Arc;

use flow_core::{Duplex, Endpoint, FlowId, FlowVisitor, Sink, Source};

use crate::flow::Flow;
use crate::registry::Registration;

/// Accumulates eager/lazy source, sink and duplex registrations, the
/// per-flow visitor, and the concurrency hint, then builds a [`Flow`].
///
/// `activate_source`/`activate_sink`/`activate_duplex` register *eager*
/// endpoints (started when the flow runs); `source`/`sink`/`duplex`
/// register *lazy* ones (started only once a message names their ID in
/// its `activate` set).
pub struct Builder<Id, V> {
    registrations: Vec<Registration<Id, V>>,
    visitor: V,
    concurrency: usize,
}

impl<Id, V> Builder<Id, V>
where
    Id: FlowId,
    V: FlowVisitor,
{
    pub fn new(visitor: V) -> Self {
        Self {
            registrations: Vec::new(),
            visitor,
            concurrency: 1,
        }
    }

    pub fn activate_source<S>(self, source: Arc<S>) -> Self
    where
        S: Source<Id, V>,
    {
        self.register_source(source, true)
    }

    pub fn source<S>(self, source: Arc<S>) -> Self
    where
        S: Source<Id, V>,
    {
        self.register_source(source, false)
    }

    pub fn activate_sink<S>(self, sink: Arc<S>) -> Self
    where
        S: Sink<Id, V>,
    {
        self.register_sink(sink, true)
    }

    pub fn sink<S>(self, sink: Arc<S>) -> Self
    where
        S: Sink<Id, V>,
    {
        self.register_sink(sink, false)
    }

    pub fn activate_duplex<D>(self, duplex: Arc<D>) -> Self
    where
        D: Duplex<Id, V>,
    {
        self.register_duplex(duplex, true)
    }

    pub fn duplex<D>(self, duplex: Arc<D>) -> Self
    where
        D: Duplex<Id, V>,
    {
        self.register_duplex(duplex, false)
    }

    /// Clamped to at least 1 at [`build`](Self::build), matching the
    /// spec's "no validation beyond assigning a concurrency of 1 when
    /// unset" — an explicit 0 is treated the same as unset rather than
    /// rejected.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn build(self) -> Flow<Id, V> {
        Flow::new(self.registrations, self.visitor, self.concurrency.max(1))
    }

    fn register_source<S>(mut self, source: Arc<S>, eager: bool) -> Self
    where
        S: Source<Id, V>,
    {
        let id = source.id();
        let endpoint: Arc<dyn Endpoint<Id>> = source.clone();
        let source_view: Arc<dyn Source<Id, V>> = source;
        self.registrations.push(Registration {
            id,
            endpoint,
            source: Some(source_view),
            sink: None,
            eager,
        });
        self
    }

    fn register_sink<S>(mut self, sink: Arc<S>, eager: bool) -> Self
    where
        S: Sink<Id, V>,
    {
        let id = sink.id();
        let endpoint: Arc<dyn Endpoint<Id>> = sink.clone();
        let sink_view: Arc<dyn Sink<Id, V>> = sink;
        self.registrations.push(Registration {
            id,
            endpoint,
            source: None,
            sink: Some(sink_view),
            eager,
        });
        self
    }

    fn register_duplex<D>(mut self, duplex: Arc<D>, eager: bool) -> Self
    where
        D: Duplex<Id, V>,
    {
        let id = duplex.id();
        let endpoint: Arc<dyn Endpoint<Id>> = duplex.clone();
        let source_view: Arc<dyn Source<Id, V>> = duplex.clone();
        let sink_view: Arc<dyn Sink<Id, V>> = duplex;
        self.registrations.push(Registration {
            id,
            endpoint,
            source: Some(source_view),
            sink: Some(sink_view),
            eager,
        });
        self
    }
}
