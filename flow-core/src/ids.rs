use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// The bound every endpoint/message ID type must satisfy.
///
/// Blanket-implemented for anything that already satisfies the bound, so
/// this exists purely to collapse the repeated `Id: Clone + Eq + Hash +
/// Debug + Send + Sync + 'static` where-clause that would otherwise appear
/// on every generic item in `flow-engine`.
pub trait FlowId: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> FlowId for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// The bound a per-flow visitor value must satisfy — shared behind an `Arc`
/// across every worker, so it only needs to cross thread boundaries.
pub trait FlowVisitor: Send + Sync + 'static {}

impl<T> FlowVisitor for T where T: Send + Sync + 'static {}

/// A stable identifier for a registered endpoint (source, sink, or duplex).
///
/// The engine is generic over the ID type used by a given graph (`Id:
/// Clone + Eq + Hash + Send + Sync + Debug + 'static`, see
/// [`crate::Endpoint`]); `EndpointId` is the convenience type most call
/// sites reach for, a cheaply-cloneable interned string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(Arc<str>);

impl EndpointId {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EndpointId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
