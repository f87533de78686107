use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use flow_core::{ArcMessage, Context, ErrorCategory, FlowError, FlowId, FlowResult, FlowVisitor, Sink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::first_error::FirstErrorCell;
use crate::panic::join_panic_as_error;

/// One capacity-1 channel per sink ID (eager and lazy alike), allocated up
/// front so that a lazily-activated sink's channel already exists the first
/// time a message is routed to it — only the consumer loop is deferred.
pub struct SinkRunnerGroup<Id, V> {
    senders: Mutex<HashMap<Id, mpsc::Sender<ArcMessage<Id, V>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    first_error: FirstErrorCell,
}

impl<Id, V> SinkRunnerGroup<Id, V>
where
    Id: FlowId,
    V: FlowVisitor,
{
    /// Allocates one channel per ID in `sink_ids`. Returns the group plus
    /// the receiving halves, keyed by ID, for the caller to hand to
    /// [`start`](Self::start) as each sink is activated.
    pub fn new(
        sink_ids: impl IntoIterator<Item = Id>,
        first_error: FirstErrorCell,
    ) -> (Self, HashMap<Id, mpsc::Receiver<ArcMessage<Id, V>>>) {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for id in sink_ids {
            let (tx, rx) = mpsc::channel(1);
            senders.insert(id.clone(), tx);
            receivers.insert(id, rx);
        }
        (
            Self {
                senders: Mutex::new(senders),
                handles: Mutex::new(Vec::new()),
                first_error,
            },
            receivers,
        )
    }

    /// Spawns the consumer loop for one sink's channel.
    pub fn start(&self, ctx: Context, sink: Arc<dyn Sink<Id, V>>, mut rx: mpsc::Receiver<ArcMessage<Id, V>>) {
        let first_error = self.first_error.clone();
        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(err) = sink.drain(&ctx, vec![message]).await {
                    let wrapped = FlowError::new(ErrorCategory::Drain, err.message().to_string()).with_cause(err);
                    first_error.report(wrapped);
                    return;
                }
            }
        });
        self.handles.lock().expect("sink handle list poisoned").push(handle);
    }

    /// Non-selective send honoring `ctx` cancellation: if cancelled before
    /// the send lands, the message is dropped (the flow is terminating).
    /// If the sink's consumer loop has already died (e.g. its `drain`
    /// panicked) the channel's receiver is gone; that is reported as a
    /// `Drain` failure rather than silently dropping the message.
    pub async fn send(&self, ctx: &Context, id: &Id, message: ArcMessage<Id, V>) -> FlowResult<()> {
        let tx = {
            let senders = self.senders.lock().expect("sink sender map poisoned");
            senders
                .get(id)
                .cloned()
                .ok_or_else(|| FlowError::new(ErrorCategory::Drain, format!("no such sink: {id:?}")))?
        };
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Ok(()),
            result = tx.send(message) => result.map_err(|_| {
                FlowError::new(ErrorCategory::Drain, format!("sink consumer loop gone: {id:?}"))
            }),
        }
    }

    /// Closes every sink channel exactly once by dropping every sender,
    /// which lets each consumer loop observe the close on its next `recv`.
    pub fn close_all(&self) {
        self.senders.lock().expect("sink sender map poisoned").clear();
    }

    pub async fn join_all(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().expect("sink handle list poisoned"));
        for handle in handles {
            if let Err(err) = join_panic_as_error(handle.await.map(Ok)) {
                self.first_error.report(err);
            }
        }
    }
}
