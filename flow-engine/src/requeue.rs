use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use flow_core::BoxMessage;
use tokio::sync::Notify;

/// A capacity-1 wake: coalesces any number of [`notify`](Self::notify)
/// calls between two [`notified`](Self::notified) awaits into a single
/// permit. Dropped wakes are harmless by design — every waiter re-checks
/// its own termination condition on each loop iteration, so a wake that
/// arrives just before the waiter starts waiting is not lost (tokio's
/// `Notify` stores at most one permit for exactly this reason).
#[derive(Clone, Default)]
pub struct WakeSignal {
    notify: Arc<Notify>,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// The mutex-guarded FIFO of messages deferred by fan-out (`accept`
/// returning two or more successors). Drained with priority over the
/// in-flight channel by the scheduler.
pub struct RequeueQueue<Id, V> {
    queue: Mutex<VecDeque<BoxMessage<Id, V>>>,
}

impl<Id, V> RequeueQueue<Id, V> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_many(&self, messages: impl IntoIterator<Item = BoxMessage<Id, V>>) {
        let mut queue = self.queue.lock().expect("requeue queue mutex poisoned");
        queue.extend(messages);
    }

    pub fn pop(&self) -> Option<BoxMessage<Id, V>> {
        self.queue.lock().expect("requeue queue mutex poisoned").pop_front()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.lock().expect("requeue queue mutex poisoned").len()
    }
}
