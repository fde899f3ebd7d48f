//! In-process task queue with the same lease semantics as the Postgres one.
//!
//! Used by tests and single-process deployments. State lives behind a
//! `std::sync::Mutex` that is never held across an await.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use biopilot_core::types::{new_id, DbId, Timestamp};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::QueueError;
use crate::message::{Delivery, TaskMessage};
use crate::task_queue::TaskQueue;

#[derive(Debug)]
struct Entry {
    message: TaskMessage,
    available_at: Instant,
    leased_until: Option<Instant>,
    leased_by: Option<String>,
    delivery_count: i32,
    enqueued_at: Timestamp,
    seq: u64,
}

impl Entry {
    fn visible(&self, now: Instant) -> bool {
        self.available_at <= now && self.leased_until.map_or(true, |until| until <= now)
    }

    /// Earliest instant at which this entry could become visible.
    fn visible_from(&self) -> Instant {
        match self.leased_until {
            Some(until) => until.max(self.available_at),
            None => self.available_at,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<DbId, Entry>,
    by_job: HashMap<DbId, DbId>,
    next_seq: u64,
}

enum Claim {
    Ready(Delivery),
    WaitUntil(Instant),
    Empty,
}

impl State {
    fn claim(&mut self, consumer: &str, now: Instant, lease: Duration) -> Claim {
        let next = self
            .entries
            .iter()
            .filter(|(_, e)| e.visible(now))
            .min_by_key(|(_, e)| (e.available_at, e.seq))
            .map(|(id, _)| *id);

        match next {
            Some(id) => match self.entries.get_mut(&id) {
                Some(entry) => {
                    entry.leased_until = Some(now + lease);
                    entry.leased_by = Some(consumer.to_string());
                    entry.delivery_count += 1;
                    Claim::Ready(Delivery {
                        message_id: id,
                        message: entry.message.clone(),
                        delivery_count: entry.delivery_count,
                        enqueued_at: entry.enqueued_at,
                    })
                }
                None => Claim::Empty,
            },
            None => match self.entries.values().map(Entry::visible_from).min() {
                Some(at) => Claim::WaitUntil(at),
                None => Claim::Empty,
            },
        }
    }
}

/// Task queue kept entirely in memory.
pub struct MemoryTaskQueue {
    state: Mutex<State>,
    notify: Notify,
    lease: Duration,
}

impl MemoryTaskQueue {
    pub fn new(lease: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            lease,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delivery count of the outstanding message for a job, if any.
    pub fn delivery_count(&self, job_id: DbId) -> Option<i32> {
        let state = self.lock();
        let id = state.by_job.get(&job_id)?;
        state.entries.get(id).map(|e| e.delivery_count)
    }

    /// Whether a job has an un-acked message.
    pub fn contains_job(&self, job_id: DbId) -> bool {
        self.lock().by_job.contains_key(&job_id)
    }

    /// Make a leased message visible again right away, as if its holder
    /// died and the lease ran out.
    pub fn expire_lease(&self, message_id: DbId) {
        if let Some(entry) = self.lock().entries.get_mut(&message_id) {
            entry.leased_until = Some(Instant::now());
        }
        self.notify.notify_waiters();
    }
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue_delayed(
        &self,
        message: &TaskMessage,
        delay: Duration,
    ) -> Result<DbId, QueueError> {
        let id = {
            let mut state = self.lock();
            if let Some(existing) = state.by_job.get(&message.job_id) {
                return Ok(*existing);
            }
            let id = new_id();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.insert(
                id,
                Entry {
                    message: message.clone(),
                    available_at: Instant::now() + delay,
                    leased_until: None,
                    leased_by: None,
                    delivery_count: 0,
                    enqueued_at: chrono::Utc::now(),
                    seq,
                },
            );
            state.by_job.insert(message.job_id, id);
            id
        };
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn dequeue(
        &self,
        consumer: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Delivery>, QueueError> {
        loop {
            // Created before inspecting state so a concurrent enqueue is not missed.
            let notified = self.notify.notified();

            let wait = match self.lock().claim(consumer, Instant::now(), self.lease) {
                Claim::Ready(delivery) => return Ok(Some(delivery)),
                Claim::WaitUntil(at) => Some(at),
                Claim::Empty => None,
            };

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = notified => {}
                _ = sleep_until(wait) => {}
            }
        }
    }

    async fn ack(&self, message_id: DbId) -> Result<(), QueueError> {
        let mut state = self.lock();
        if let Some(entry) = state.entries.remove(&message_id) {
            state.by_job.remove(&entry.message.job_id);
        }
        Ok(())
    }

    async fn nack(&self, message_id: DbId, delay: Duration) -> Result<(), QueueError> {
        if let Some(entry) = self.lock().entries.get_mut(&message_id) {
            entry.leased_until = None;
            entry.leased_by = None;
            entry.available_at = Instant::now() + delay;
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn extend_lease(&self, message_id: DbId, consumer: &str) -> Result<bool, QueueError> {
        let mut state = self.lock();
        match state.entries.get_mut(&message_id) {
            Some(entry) if entry.leased_by.as_deref() == Some(consumer) => {
                entry.leased_until = Some(Instant::now() + self.lease);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.lock().entries.len() as u64)
    }
}
