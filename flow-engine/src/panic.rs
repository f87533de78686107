use flow_core::{ErrorCategory, FlowError, FlowResult};

/// This is the engine's structured-recovery collaborator (spec'd as an
/// external utility the core merely consumes): rather than a
/// `catch_unwind`-based wrapper around a synchronous callback, every user
/// callback here already runs inside its own `tokio::spawn`'d task, so
/// `JoinHandle::await` already tells us whether the task panicked —
/// `JoinError::is_panic` is the whole mechanism.
///
/// Maps a `JoinHandle::await` result into the chain's `FlowResult`,
/// collapsing the panic/cancel distinction from `JoinError` into
/// [`ErrorCategory::Panic`] (a cooperative task cancellation never happens
/// in this engine outside of panics, since nothing calls `abort`).
pub fn join_panic_as_error(outcome: Result<FlowResult<()>, tokio::task::JoinError>) -> FlowResult<()> {
    match outcome {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => Err(FlowError::new(
            ErrorCategory::Panic,
            format!("task panicked: {join_err}"),
        )),
        Err(join_err) => Err(FlowError::new(
            ErrorCategory::Panic,
            format!("task did not complete: {join_err}"),
        )),
    }
}
