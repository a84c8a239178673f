use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::engine::EngineError;
use crate::limits::MAX_QUEUE_LEN;
use crate::model::BookingRequest;

/// FIFO of pending booking requests, shared by producers and the worker pool.
pub struct RequestQueue {
    items: Mutex<VecDeque<BookingRequest>>,
    ready: Notify,
    capacity: usize,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::with_capacity(MAX_QUEUE_LEN)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            capacity,
        }
    }

    pub fn push(&self, request: BookingRequest) -> Result<(), EngineError> {
        {
            let mut items = self.items.lock();
            if items.len() >= self.capacity {
                return Err(EngineError::LimitExceeded("request queue full"));
            }
            items.push_back(request);
            metrics::gauge!(crate::observability::QUEUE_DEPTH).set(items.len() as f64);
        }
        self.ready.notify_one();
        Ok(())
    }

    pub fn pop(&self) -> Option<BookingRequest> {
        let mut items = self.items.lock();
        let request = items.pop_front();
        metrics::gauge!(crate::observability::QUEUE_DEPTH).set(items.len() as f64);
        request
    }

    /// Remove everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<BookingRequest> {
        let mut items = self.items.lock();
        metrics::gauge!(crate::observability::QUEUE_DEPTH).set(0.0);
        items.drain(..).collect()
    }

    /// Put undispatched requests back at the head, keeping their order ahead of
    /// anything pushed since they were drained.
    pub fn requeue_front(&self, requests: Vec<BookingRequest>) {
        if requests.is_empty() {
            return;
        }
        {
            let mut items = self.items.lock();
            for request in requests.into_iter().rev() {
                items.push_front(request);
            }
            metrics::gauge!(crate::observability::QUEUE_DEPTH).set(items.len() as f64);
        }
        self.ready.notify_one();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
        metrics::gauge!(crate::observability::QUEUE_DEPTH).set(0.0);
    }

    /// Return once the queue is non-empty or `poll_interval` elapses, whichever
    /// comes first. Wakeups come from `push`; the interval is only a fallback.
    pub async fn wait_for_work(&self, poll_interval: Duration) {
        if !self.is_empty() {
            return;
        }
        let _ = tokio::time::timeout(poll_interval, self.ready.notified()).await;
    }
}
