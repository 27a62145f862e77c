//! Cancellation bag for long-running observation tasks
//!
//! Components that subscribe to event streams own a [`DisposableBag`]. Every
//! observation task is spawned through the bag, so tearing the component down
//! cancels all of its subscriptions in one step.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Tracked set of cancellable tasks
pub struct DisposableBag {
    /// Name used in logs
    name: String,

    /// Unique key counter for anonymous tasks
    next_task_id: AtomicUsize,

    /// Tracked task handles by key
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,

    /// Token shared by the current generation of tasks
    cancel_token: Mutex<CancellationToken>,
}

impl DisposableBag {
    /// Create an empty bag
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_task_id: AtomicUsize::new(0),
            tasks: Mutex::new(HashMap::new()),
            cancel_token: Mutex::new(CancellationToken::new()),
        }
    }

    /// Spawn an anonymous tracked task, returning its key
    pub fn spawn<F>(&self, future: F) -> String
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = format!("task-{}", self.next_task_id.fetch_add(1, Ordering::SeqCst));
        self.spawn_keyed(key.clone(), future);
        key
    }

    /// Spawn a task under `key`, aborting any task already stored there
    pub fn spawn_keyed<F>(&self, key: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let token = self.cancel_token.lock().clone();
        let bag_name = self.name.clone();
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = future => {
                    trace!(bag = %bag_name, task = %task_key, "Task completed");
                }
                _ = token.cancelled() => {
                    trace!(bag = %bag_name, task = %task_key, "Task cancelled");
                }
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|_, handle| !handle.is_finished());
        if let Some(previous) = tasks.insert(key, handle) {
            previous.abort();
        }
    }

    /// Abort and forget the task stored under `key`
    pub fn remove(&self, key: &str) -> bool {
        match self.tasks.lock().remove(key) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Whether a still-running task is stored under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.tasks
            .lock()
            .get(key)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Number of tasks that have not finished yet
    pub fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Cancel every tracked task
    ///
    /// The bag stays usable; tasks spawned afterwards belong to a fresh
    /// cancellation generation.
    pub fn cancel_all(&self) {
        let previous = {
            let mut token = self.cancel_token.lock();
            std::mem::replace(&mut *token, CancellationToken::new())
        };
        previous.cancel();

        let drained: Vec<JoinHandle<()>> = self.tasks.lock().drain().map(|(_, h)| h).collect();
        if !drained.is_empty() {
            debug!(bag = %self.name, count = drained.len(), "Cancelling tracked tasks");
        }
        for handle in drained {
            handle.abort();
        }
    }
}

impl Drop for DisposableBag {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl std::fmt::Debug for DisposableBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposableBag")
            .field("name", &self.name)
            .field("tasks", &self.tasks.lock().len())
            .finish()
    }
}
