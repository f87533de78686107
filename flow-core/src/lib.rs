//! Contract types for the `flow` dataflow engine.
//!
//! `flow-core` carries no scheduling logic of its own — it defines the
//! typed surface a graph of sources, sinks and duplex endpoints is built
//! against (see [`message`] and [`endpoint`]), the error taxonomy every
//! subsystem reports through ([`error`]), and the cancellation context
//! threaded through every call ([`context`]). The scheduler, registries and
//! runner groups that actually drive a graph live in the `flow-engine`
//! crate, which depends on this one.

mod context;
mod endpoint;
mod error;
mod ids;
mod message;

pub mod prelude;

pub use context::Context;
pub use endpoint::{Duplex, Endpoint, Sink, Source};
pub use error::{ErrorCategory, FlowError, FlowResult};
pub use ids::{EndpointId, FlowId, FlowVisitor};
pub use message::{ArcMessage, BoxMessage, Message, MessageOptions, SerialKey};
