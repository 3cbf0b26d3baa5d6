//! Per-wallet delayed tasks.
//!
//! Debounce timers and scheduled retries share the same bookkeeping: at
//! most one task per key, replacing a task aborts the old one, and a task
//! that fires removes itself only if it is still the registered one.

use std::collections::HashMap;
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::Instant;

struct ScheduledTask<M> {
    id: u64,
    due_at: Instant,
    meta: M,
    handle: AbortHandle,
}

/// Map of wallet to its single pending delayed task.
///
/// Not synchronized; the owner keeps it behind its own lock so that
/// "take the timer" and "mark the wallet in flight" happen together.
pub struct KeyedTimers<M> {
    tasks: HashMap<String, ScheduledTask<M>>,
}

impl<M> KeyedTimers<M> {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// Registers a task, aborting and returning the metadata of any task it
    /// replaces.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        id: u64,
        due_at: Instant,
        meta: M,
        handle: AbortHandle,
    ) -> Option<M> {
        let previous = self.tasks.insert(
            key.into(),
            ScheduledTask {
                id,
                due_at,
                meta,
                handle,
            },
        );
        previous.map(|task| {
            task.handle.abort();
            task.meta
        })
    }

    /// Removes the task for `key` if it is still task `id`.
    ///
    /// Called by the task itself when it fires; a stale task finds a newer id
    /// and leaves the map alone.
    pub fn take_if_current(&mut self, key: &str, id: u64) -> Option<M> {
        match self.tasks.get(key) {
            Some(task) if task.id == id => self.tasks.remove(key).map(|task| task.meta),
            _ => None,
        }
    }

    /// Aborts and removes the task for `key`.
    pub fn cancel(&mut self, key: &str) -> Option<M> {
        self.tasks.remove(key).map(|task| {
            task.handle.abort();
            task.meta
        })
    }

    /// Aborts and removes every task. Returns how many were removed.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.tasks.len();
        for (_, task) in self.tasks.drain() {
            task.handle.abort();
        }
        count
    }

    pub fn get(&self, key: &str) -> Option<&M> {
        self.tasks.get(key).map(|task| &task.meta)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Time left before the task for `key` fires, zero if overdue.
    pub fn remaining(&self, key: &str) -> Option<Duration> {
        self.tasks
            .get(key)
            .map(|task| task.due_at.saturating_duration_since(Instant::now()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &M)> {
        self.tasks.iter().map(|(key, task)| (key.as_str(), &task.meta))
    }
}

impl<M> Default for KeyedTimers<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_join() -> tokio::task::JoinHandle<()> {
        tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
    }

    fn idle_task() -> AbortHandle {
        idle_join().abort_handle()
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_replaces_and_aborts_previous() {
        let mut timers = KeyedTimers::new();
        let first = idle_join();
        let due = Instant::now() + Duration::from_secs(1);

        assert!(timers
            .insert("W1", 1, due, "first", first.abort_handle())
            .is_none());
        let replaced = timers.insert("W1", 2, due, "second", idle_task());

        assert_eq!(replaced, Some("first"));
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.get("W1"), Some(&"second"));
        assert!(first.await.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_task_cannot_take_newer_entry() {
        let mut timers = KeyedTimers::new();
        let due = Instant::now() + Duration::from_secs(1);
        timers.insert("W1", 1, due, 10u32, idle_task());
        timers.insert("W1", 2, due, 20u32, idle_task());

        assert_eq!(timers.take_if_current("W1", 1), None);
        assert!(timers.contains("W1"));
        assert_eq!(timers.take_if_current("W1", 2), Some(20));
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_counts_and_clears() {
        let mut timers = KeyedTimers::new();
        let due = Instant::now() + Duration::from_secs(1);
        timers.insert("W1", 1, due, (), idle_task());
        timers.insert("W2", 2, due, (), idle_task());

        assert_eq!(timers.cancel("W3"), None);
        assert_eq!(timers.cancel_all(), 2);
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down() {
        let mut timers = KeyedTimers::new();
        timers.insert(
            "W1",
            1,
            Instant::now() + Duration::from_secs(5),
            (),
            idle_task(),
        );

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(timers.remaining("W1"), Some(Duration::from_secs(3)));
        assert_eq!(timers.remaining("W2"), None);
    }
}
