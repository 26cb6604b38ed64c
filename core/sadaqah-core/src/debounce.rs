//! Settle-then-fetch helper for inputs that change on every keystroke.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Runs `on_settle` with the latest key once it has stopped changing for
/// `delay`. Intermediate keys are never looked up.
pub struct Debouncer<K> {
    input: watch::Sender<K>,
    task: JoinHandle<()>,
}

impl<K> Debouncer<K>
where
    K: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn spawn<F, Fut>(initial: K, delay: Duration, on_settle: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (input, mut rx) = watch::channel(initial);
        let task = tokio::spawn(async move {
            loop {
                if rx.changed().await.is_err() {
                    return;
                }
                loop {
                    tokio::select! {
                        biased;
                        changed = rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                        _ = sleep(delay) => break,
                    }
                }
                let key = rx.borrow_and_update().clone();
                tokio::spawn(on_settle(key));
            }
        });
        Self { input, task }
    }

    /// Records a new key. Setting the current key again does not restart
    /// the quiet period.
    pub fn set(&self, key: K) {
        self.input.send_if_modified(|current| {
            if *current == key {
                false
            } else {
                *current = key;
                true
            }
        });
    }

    pub fn current(&self) -> K {
        self.input.borrow().clone()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
