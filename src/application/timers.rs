// Cancellable one-shot timers that post a message to their owner's inbox
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One pending timer per key. Scheduling a key again replaces the old timer,
/// and every pending timer is aborted when the registry is dropped.
pub struct Timers<K, M>
where
    K: Eq + Hash + Copy,
    M: Send + 'static,
{
    tx: mpsc::Sender<M>,
    pending: HashMap<K, JoinHandle<()>>,
}

impl<K, M> Timers<K, M>
where
    K: Eq + Hash + Copy,
    M: Send + 'static,
{
    pub fn new(tx: mpsc::Sender<M>) -> Self {
        Self {
            tx,
            pending: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, key: K, delay: Duration, message: M) {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(message).await;
        });
        if let Some(previous) = self.pending.insert(key, handle) {
            previous.abort();
        }
    }

    pub fn cancel(&mut self, key: K) {
        if let Some(handle) = self.pending.remove(&key) {
            handle.abort();
        }
    }

    pub fn is_pending(&self, key: K) -> bool {
        self.pending
            .get(&key)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }
}

impl<K, M> Drop for Timers<K, M>
where
    K: Eq + Hash + Copy,
    M: Send + 'static,
{
    fn drop(&mut self) {
        self.cancel_all();
    }
}
