//! Re-exports the types most call sites need to implement or drive a flow.

pub use crate::context::Context;
pub use crate::endpoint::{Duplex, Endpoint, Sink, Source};
pub use crate::error::{ErrorCategory, FlowError, FlowResult};
pub use crate::ids::{EndpointId, FlowId, FlowVisitor};
pub use crate::message::{ArcMessage, BoxMessage, Message, MessageOptions, SerialKey};
