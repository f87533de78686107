use async_trait::async_trait;

use crate::context::Context;
use crate::error::FlowResult;
use crate::message::{ArcMessage, BoxMessage};

/// A named participant in the graph. `Source`, `Sink` and a type registered
/// as duplex all implement this trait independently of their data-plane
/// role — lifecycle (`activate`/`close`) is shared state, capability
/// (`next`/`drain`) is additive.
///
/// Implementations should make `activate` and `close` idempotent-safe to
/// call is the registry's job, not the endpoint's: the registry guarantees
/// at most one `activate` and at most one `close` call reach a given
/// endpoint instance (see `flow-engine::registry::EndpointRegistry`), so
/// implementors may assume each method fires exactly once.
#[async_trait]
pub trait Endpoint<Id>: Send + Sync + 'static {
    fn id(&self) -> Id;

    async fn activate(&self, ctx: &Context) -> FlowResult<()>;

    async fn close(&self, ctx: &Context) -> FlowResult<()>;
}

/// An endpoint that produces batches of messages.
#[async_trait]
pub trait Source<Id, V>: Endpoint<Id> {
    /// Produce the next batch. `more = false` signals end-of-stream for
    /// this source; the source loop does not call `next` again afterward.
    async fn next(&self, ctx: &Context) -> FlowResult<(Vec<BoxMessage<Id, V>>, bool)>;
}

/// An endpoint that consumes a delivered batch.
#[async_trait]
pub trait Sink<Id, V>: Endpoint<Id> {
    /// Drain one delivered batch (always a singleton batch in the current
    /// engine, but the signature keeps batch framing so a future batching
    /// sink runner can widen it without breaking this trait).
    ///
    /// Takes [`ArcMessage`] rather than [`BoxMessage`]: a message whose
    /// `drain_to` names several sinks is delivered to each of them as a
    /// clone of the same `Arc`, not re-transformed per target.
    async fn drain(&self, ctx: &Context, batch: Vec<ArcMessage<Id, V>>) -> FlowResult<()>;
}

/// A marker for types that are both a [`Source`] and a [`Sink`] under one
/// shared `Endpoint` identity and lifecycle. There is nothing to implement
/// beyond `Source + Sink`; this exists so call sites can write `T: Duplex<Id,
/// V>` instead of repeating the two-trait bound.
pub trait Duplex<Id, V>: Source<Id, V> + Sink<Id, V> {}

impl<Id, V, T> Duplex<Id, V> for T where T: Source<Id, V> + Sink<Id, V> {}
