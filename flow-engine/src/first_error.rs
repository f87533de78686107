use std::sync::{Arc, Mutex};

use flow_core::{Context, FlowError};

/// The once-guarded single-error slot shared by every subsystem (source
/// runners, workers, sink runners) that can fail a running flow.
///
/// The first call to [`report`](Self::report) stores the error and cancels
/// the associated context; every later call is a no-op. This is what makes
/// "first-error-wins" deterministic even when several subsystems fail
/// concurrently.
#[derive(Clone)]
pub struct FirstErrorCell {
    inner: Arc<Inner>,
}

struct Inner {
    slot: Mutex<Option<FlowError>>,
    ctx: Context,
}

impl FirstErrorCell {
    /// `ctx` is the child context this cell cancels on first report — never
    /// the caller's parent context (see [`Context`]'s cancellation rules).
    pub fn new(ctx: Context) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(None),
                ctx,
            }),
        }
    }

    /// Reports `err`. Only the first call across the life of this cell has
    /// any effect; it stores the error and cancels the context.
    pub fn report(&self, err: FlowError) {
        let mut slot = self.inner.slot.lock().expect("first-error slot poisoned");
        if slot.is_none() {
            tracing::warn!(category = %err.category(), message = %err.message(), "flow latched first error");
            *slot = Some(err);
            drop(slot);
            self.inner.ctx.cancel();
        }
    }

    /// Takes the latched error, if any. Intended to be called exactly once,
    /// from `Flow::wait`.
    pub fn take(&self) -> Option<FlowError> {
        self.inner.slot.lock().expect("first-error slot poisoned").take()
    }

    pub fn is_set(&self) -> bool {
        self.inner.slot.lock().expect("first-error slot poisoned").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::ErrorCategory;

    #[tokio::test]
    async fn second_report_is_dropped() {
        let ctx = Context::new();
        let cell = FirstErrorCell::new(ctx.clone());

        cell.report(FlowError::new(ErrorCategory::Source, "first"));
        cell.report(FlowError::new(ErrorCategory::Drain, "second"));

        assert!(ctx.is_cancelled());
        let latched = cell.take().expect("an error should be latched");
        assert_eq!(latched.category(), ErrorCategory::Source);
        assert_eq!(latched.message(), "first");
        assert!(cell.take().is_none());
    }
}
