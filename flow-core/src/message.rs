use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::FlowResult;

/// An opaque key used to group messages that must be processed in order
/// relative to one another.
///
/// The current scheduler does not read this field at all — it ships on
/// [`MessageOptions`] purely so that a future per-key ordering scheduler can
/// be introduced without changing the `Message` contract. See spec.md's
/// "serial-key hint" design note.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SerialKey(Arc<str>);

impl SerialKey {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SerialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static, per-message configuration. Reserved for future scheduling hints;
/// the core engine reads no field on this type.
#[derive(Clone, Debug, Default)]
pub struct MessageOptions {
    serial_key: Option<SerialKey>,
}

impl MessageOptions {
    pub fn with_serial_key(mut self, key: SerialKey) -> Self {
        self.serial_key = Some(key);
        self
    }

    pub fn serial_key(&self) -> Option<&SerialKey> {
        self.serial_key.as_ref()
    }
}

/// A type-erased, boxed message. Every message the engine moves through
/// sources, the scheduler, and sinks is ultimately stored behind this alias
/// so that graphs can be built from heterogeneous message types that all
/// transform into one another through [`Message::accept`].
pub type BoxMessage<Id, V> = Box<dyn Message<Id, V>>;

/// A message shared across one or more sink deliveries.
///
/// `drain_to` may name more than one sink; the engine answers this by
/// converting the owned [`BoxMessage`] into an `Arc` once, at the point it
/// learns delivery (not transformation) is next, and cloning the `Arc`
/// per target. A message is never both drained and passed to
/// [`Message::accept`] (the trait's contract forbids it), so this
/// conversion never needs to go back the other way.
pub type ArcMessage<Id, V> = Arc<dyn Message<Id, V>>;

/// A unit of work carrying a destination discipline.
///
/// Every method is a query with respect to the engine's visible state:
/// `options`, `activate` and `drain_to` are read-only and may be called any
/// number of times; `accept` consumes the message (`self: Box<Self>`) and
/// is only ever called once per message, and only when `drain_to` returned
/// empty. A message whose `drain_to` is non-empty MUST NOT be passed to
/// `accept` — the scheduler enforces this ordering, not the trait.
#[async_trait]
pub trait Message<Id, V>: Send + 'static {
    /// Static configuration for this message. Defaults to no serial key.
    fn options(&self) -> MessageOptions {
        MessageOptions::default()
    }

    /// Endpoints the engine must lazily bring online before this message is
    /// processed further. Defaults to none.
    async fn activate(&self, ctx: &Context) -> Vec<Id> {
        let _ = ctx;
        Vec::new()
    }

    /// Sink destinations. A non-empty result means "deliver me, do not
    /// transform me" — `accept` will not be called for this message.
    /// Defaults to none (i.e. this message is always transformed).
    async fn drain_to(&self, ctx: &Context) -> Vec<Id> {
        let _ = ctx;
        Vec::new()
    }

    /// The transform step. Invoked only when `drain_to` returned empty.
    /// Returns the messages that re-enter the pipeline in this message's
    /// place — zero successors terminates this branch, one successor is
    /// tail-chained by the worker without returning to the scheduler, and
    /// two or more are fanned out (see `flow-engine`'s scheduler).
    async fn accept(self: Box<Self>, ctx: &Context, visitor: &V) -> FlowResult<Vec<BoxMessage<Id, V>>>;
}
