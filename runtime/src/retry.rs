// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bounded per-agent queue of failed URLs.
//!
//! Backed by a bounded tokio channel. Enqueueing uses `try_send` and never
//! blocks: a full queue drops the item.

use std::sync::Mutex;
use tokio::sync::mpsc;

/// Items held per agent.
pub const RETRY_QUEUE_CAPACITY: usize = 10;

/// Failures after which an item is dropped for good.
pub const MAX_RETRIES: u32 = 10;

/// A URL waiting for another fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryItem {
    pub url: String,
    pub retried_times: u32,
}

impl RetryItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retried_times: 0,
        }
    }
}

/// What happened to an item after a failed retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Requeued(u32),
    /// The retry ceiling was reached.
    Exhausted,
    /// The queue was full.
    Dropped,
}

pub struct RetryQueue {
    tx: mpsc::Sender<RetryItem>,
    rx: Mutex<mpsc::Receiver<RetryItem>>,
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::with_capacity(RETRY_QUEUE_CAPACITY)
    }
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Add an item unless the queue is full. Returns whether it was accepted.
    pub fn try_enqueue(&self, item: RetryItem) -> bool {
        self.tx.try_send(item).is_ok()
    }

    pub fn try_pop(&self) -> Option<RetryItem> {
        self.rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .try_recv()
            .ok()
    }

    /// Count a failed attempt and requeue the item unless it is exhausted.
    pub fn record_failure(&self, mut item: RetryItem) -> RetryOutcome {
        item.retried_times += 1;
        if item.retried_times >= MAX_RETRIES {
            return RetryOutcome::Exhausted;
        }
        let times = item.retried_times;
        if self.try_enqueue(item) {
            RetryOutcome::Requeued(times)
        } else {
            RetryOutcome::Dropped
        }
    }

    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}
