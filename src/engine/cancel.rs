// src/engine/cancel.rs

//! Cooperative cancellation tokens.
//!
//! A token is a shared flag plus a [`Notify`]. Tokens form a tree: a child
//! (or a merged token) fires when any of its parents fires, and can also be
//! cancelled on its own without affecting the parents.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn fire(self: &Arc<Self>) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();

        let children = {
            let mut guard = self
                .children
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.fire();
        }
    }
}

#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.inner.fire();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token has fired. Returns immediately if it
    /// already has.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent `cancel`
            // cannot slip between the check and the await.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// A token that fires with `self` but can also be cancelled alone.
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        self.attach(&child);
        child
    }

    /// A token that fires as soon as any of `tokens` fires.
    pub fn merge(tokens: &[&CancelToken]) -> CancelToken {
        let merged = CancelToken::new();
        for token in tokens {
            token.attach(&merged);
        }
        merged
    }

    fn attach(&self, child: &CancelToken) {
        let mut children = self
            .inner
            .children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // The flag is set before `fire` takes this lock, so checking it
        // under the lock cannot miss a concurrent cancellation.
        if self.is_cancelled() {
            drop(children);
            child.cancel();
            return;
        }
        children.retain(|weak| weak.strong_count() > 0);
        children.push(Arc::downgrade(&child.inner));
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
