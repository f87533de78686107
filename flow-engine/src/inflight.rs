use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use flow_core::{BoxMessage, Context, FlowId, FlowVisitor};
use tokio::sync::mpsc;

/// The unbuffered hand-off from source runners to the scheduler, plus the
/// counter of messages dispatched-but-not-yet-consumed.
///
/// `tokio::sync::mpsc` has no true zero-capacity channel, so this uses a
/// capacity-1 channel as the closest buffered approximation of a
/// rendezvous: a sender's `send` still only returns once a slot is free,
/// which is the property the scheduler's quiescence check depends on.
pub struct InFlight<Id, V> {
    inner: Arc<Inner<Id, V>>,
}

struct Inner<Id, V> {
    tx: mpsc::Sender<BoxMessage<Id, V>>,
    rx: Mutex<Option<mpsc::Receiver<BoxMessage<Id, V>>>>,
    dispatched: AtomicI64,
}

impl<Id, V> Clone for InFlight<Id, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Id, V> InFlight<Id, V>
where
    Id: FlowId,
    V: FlowVisitor,
{
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            inner: Arc::new(Inner {
                tx,
                rx: Mutex::new(Some(rx)),
                dispatched: AtomicI64::new(0),
            }),
        }
    }

    /// Hands `msg` off. Blocks until the scheduler accepts it or `ctx` is
    /// cancelled. Returns `false` on cancellation or if the receiver was
    /// already dropped (the flow is tearing down).
    pub async fn send(&self, ctx: &Context, msg: BoxMessage<Id, V>) -> bool {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => false,
            result = self.inner.tx.send(msg) => {
                if result.is_ok() {
                    self.inner.dispatched.fetch_add(1, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Takes ownership of the receiving half. Must be called exactly once,
    /// by the scheduler, before the flow starts running.
    pub fn take_receiver(&self) -> mpsc::Receiver<BoxMessage<Id, V>> {
        self.inner
            .rx
            .lock()
            .expect("in-flight receiver mutex poisoned")
            .take()
            .expect("InFlight::take_receiver called more than once")
    }

    /// The number of messages dispatched by sources but not yet consumed by
    /// a worker.
    pub fn load(&self) -> i64 {
        self.inner.dispatched.load(Ordering::Acquire)
    }

    /// Must be called exactly once after a worker reads a message handed
    /// off by [`send`](Self::send).
    pub fn decr(&self) {
        self.inner.dispatched.fetch_sub(1, Ordering::AcqRel);
    }
}
