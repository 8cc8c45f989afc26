use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

#[derive(Default)]
struct Shared {
    cancelled: AtomicBool,

    next_id: AtomicU64,
    wakers: Mutex<HashMap<u64, Waker>>,
}

impl Shared {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);

        for (_, waker) in self.wakers.lock().drain() {
            waker.wake()
        }
    }
}

/// The sending half, fires the paired `ShutdownSignal`s when cancelled or
/// dropped.
pub struct Trigger {
    shared: Arc<Shared>,
}

impl Trigger {
    pub fn cancel(self) {
        // `Drop` does the work
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        self.shared.cancel();
    }
}

/// Resolves once the paired `Trigger` is cancelled or dropped, and stays
/// resolved after that, so polling it again is fine.
pub struct ShutdownSignal {
    shared: Arc<Shared>,
    id: u64,
}

impl ShutdownSignal {
    pub fn new() -> (Trigger, ShutdownSignal) {
        let shared = Arc::new(Shared::default());
        let trigger = Trigger {
            shared: Arc::clone(&shared),
        };
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);

        (trigger, ShutdownSignal { shared, id })
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }
}

impl Clone for ShutdownSignal {
    fn clone(&self) -> Self {
        let shared = Arc::clone(&self.shared);
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);

        ShutdownSignal { shared, id }
    }
}

impl Drop for ShutdownSignal {
    fn drop(&mut self) {
        self.shared.wakers.lock().remove(&self.id);
    }
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.is_cancelled() {
            return Poll::Ready(());
        }

        self.shared.wakers.lock().insert(self.id, cx.waker().clone());

        // the trigger may have fired between the check and the insert
        if self.is_cancelled() {
            return Poll::Ready(());
        }

        Poll::Pending
    }
}
