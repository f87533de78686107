use tokio_util::sync::CancellationToken;

/// The cancellation context threaded through every engine call.
///
/// `Context` wraps a [`CancellationToken`]: cancelling a context cancels
/// every [`child`](Context::child) derived from it, but cancelling a child
/// never reaches back up to its parent. `Flow::run` derives exactly one
/// child from the caller-supplied parent context (spec: "derive a
/// cancellable child context from parentCtx") and cancels that child — never
/// the parent — the first time an internal failure latches.
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    /// A fresh, uncancelled root context.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Derive a child that observes this context's cancellation but can
    /// also be cancelled independently without affecting its parent.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Cancel this context. Returns `true` the first time it transitions
    /// into the cancelled state, `false` if it was already cancelled.
    pub fn cancel(&self) -> bool {
        let was_cancelled = self.token.is_cancelled();
        self.token.cancel();
        !was_cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once this context (or an ancestor) is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}
