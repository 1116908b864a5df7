// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of PlexMesh.
//
// PlexMesh is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// PlexMesh is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PlexMesh. If not, see <https://www.gnu.org/licenses/>.

//! Mailbox module
//!
//! ## Ordering guarantee
//! The mailbox is the carrier of the per-actor serialization contract:
//! messages come out in enqueue order, and the single pump task draining a
//! mailbox processes one message at a time. Nothing here reorders.
//!
//! ## Close semantics
//! `close()` flips the mailbox to rejecting new mail and hands back every
//! message still queued, so the deactivation path can fail them
//! individually. A consumer blocked in `dequeue()` wakes up and observes
//! the closed state.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use ulid::Ulid;

/// Mailbox configuration.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Maximum queued messages before enqueue fails with [`MailboxError::Full`].
    pub capacity: usize,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        MailboxConfig { capacity: 10_000 }
    }
}

/// Mailbox errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MailboxError {
    /// Mailbox has reached capacity and cannot accept more messages
    #[error("mailbox is full")]
    Full,

    /// Mailbox was closed by deactivation; new mail is rejected
    #[error("mailbox is closed")]
    Closed,
}

/// Message queued for an activation.
///
/// The `correlation` field carries the mesh-level message id of the
/// invocation so the result frame can echo it.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Unique message ID.
    pub id: String,
    /// Mesh correlation id echoed by the invocation result.
    pub correlation: u64,
    /// Method to invoke on the activation.
    pub method: String,
    /// Serialized arguments.
    pub payload: Vec<u8>,
    /// Message metadata.
    pub metadata: HashMap<String, String>,
    /// Timestamp when the message was enqueued locally.
    created_at: Instant,
}

impl Message {
    /// Create a new message.
    pub fn new(correlation: u64, method: impl Into<String>, payload: Vec<u8>) -> Self {
        Message {
            id: Ulid::new().to_string(),
            correlation,
            method: method.into(),
            payload,
            metadata: Default::default(),
            created_at: Instant::now(),
        }
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: String, value: String) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// Time spent queued so far.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

/// Mailbox statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStats {
    /// Messages accepted.
    pub total_enqueued: u64,
    /// Messages handed to the consumer.
    pub total_dequeued: u64,
    /// Messages rejected (full or closed).
    pub total_rejected: u64,
    /// Messages currently queued.
    pub current_size: usize,
}

/// FIFO mailbox with close/drain semantics.
///
/// ## Example
/// ```rust,ignore
/// let mailbox = Mailbox::new(MailboxConfig::default(), "IGreeter/a".to_string());
/// mailbox.enqueue(Message::new(1, "hello", vec![])).await?;
/// let msg = mailbox.dequeue().await; // Some(..)
/// ```
pub struct Mailbox {
    config: MailboxConfig,
    /// Identifier for logging, usually the activation reference.
    mailbox_id: String,
    queue: Mutex<VecDeque<Message>>,
    stats: Mutex<MailboxStats>,
    notify: Notify,
    closed: AtomicBool,
}

impl Mailbox {
    /// Create a new mailbox.
    pub fn new(config: MailboxConfig, mailbox_id: String) -> Self {
        Mailbox {
            config,
            mailbox_id,
            queue: Mutex::new(VecDeque::new()),
            stats: Mutex::new(MailboxStats::default()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a message.
    ///
    /// ## Errors
    /// - [`MailboxError::Closed`] once `close()` has run
    /// - [`MailboxError::Full`] at capacity
    pub async fn enqueue(&self, message: Message) -> Result<(), MailboxError> {
        if self.closed.load(Ordering::Acquire) {
            self.count_rejected().await;
            return Err(MailboxError::Closed);
        }
        {
            let mut queue = self.queue.lock().await;
            // Re-check under the lock so enqueue/close cannot interleave.
            if self.closed.load(Ordering::Acquire) {
                drop(queue);
                self.count_rejected().await;
                return Err(MailboxError::Closed);
            }
            if queue.len() >= self.config.capacity {
                drop(queue);
                self.count_rejected().await;
                return Err(MailboxError::Full);
            }
            queue.push_back(message);
        }
        {
            let mut stats = self.stats.lock().await;
            stats.total_enqueued += 1;
            stats.current_size += 1;
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Dequeue the next message in enqueue order.
    ///
    /// Returns `None` once the mailbox is closed and empty.
    pub async fn dequeue(&self) -> Option<Message> {
        loop {
            {
                let mut queue = self.queue.lock().await;
                if let Some(message) = queue.pop_front() {
                    drop(queue);
                    let mut stats = self.stats.lock().await;
                    stats.total_dequeued += 1;
                    stats.current_size = stats.current_size.saturating_sub(1);
                    return Some(message);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Close the mailbox and drain whatever is still queued.
    ///
    /// After close, `enqueue` fails with [`MailboxError::Closed`] and a
    /// blocked `dequeue` returns `None`. The drained messages are returned
    /// so the caller can fail each one explicitly.
    pub async fn close(&self) -> Vec<Message> {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<Message> = {
            let mut queue = self.queue.lock().await;
            queue.drain(..).collect()
        };
        if !drained.is_empty() {
            debug!(
                mailbox = %self.mailbox_id,
                drained = drained.len(),
                "mailbox closed with queued messages"
            );
            let mut stats = self.stats.lock().await;
            stats.current_size = 0;
        }
        self.notify.notify_waiters();
        drained
    }

    /// Whether `close()` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Messages currently queued.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    /// Mailbox identifier, usually the activation reference.
    pub fn id(&self) -> &str {
        &self.mailbox_id
    }

    /// Statistics snapshot.
    pub async fn stats(&self) -> MailboxStats {
        self.stats.lock().await.clone()
    }

    async fn count_rejected(&self) {
        let mut stats = self.stats.lock().await;
        stats.total_rejected += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let mailbox = Mailbox::new(MailboxConfig::default(), "test@local".to_string());
        for i in 0..5u64 {
            mailbox
                .enqueue(Message::new(i, "m", vec![i as u8]))
                .await
                .unwrap();
        }
        for i in 0..5u64 {
            let msg = mailbox.dequeue().await.unwrap();
            assert_eq!(msg.correlation, i);
        }
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let mailbox = Arc::new(Mailbox::new(MailboxConfig::default(), "test".to_string()));
        let consumer = {
            let mailbox = mailbox.clone();
            tokio::spawn(async move { mailbox.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        mailbox.enqueue(Message::new(9, "m", vec![])).await.unwrap();

        let msg = consumer.await.unwrap().unwrap();
        assert_eq!(msg.correlation, 9);
    }

    #[tokio::test]
    async fn test_capacity_enforced() {
        let mailbox = Mailbox::new(MailboxConfig { capacity: 2 }, "test".to_string());
        mailbox.enqueue(Message::new(1, "m", vec![])).await.unwrap();
        mailbox.enqueue(Message::new(2, "m", vec![])).await.unwrap();

        let err = mailbox.enqueue(Message::new(3, "m", vec![])).await;
        assert!(matches!(err, Err(MailboxError::Full)));

        let stats = mailbox.stats().await;
        assert_eq!(stats.total_enqueued, 2);
        assert_eq!(stats.total_rejected, 1);
    }

    #[tokio::test]
    async fn test_close_rejects_and_drains() {
        let mailbox = Mailbox::new(MailboxConfig::default(), "test".to_string());
        mailbox.enqueue(Message::new(1, "m", vec![])).await.unwrap();
        mailbox.enqueue(Message::new(2, "m", vec![])).await.unwrap();

        let drained = mailbox.close().await;
        assert_eq!(drained.len(), 2);
        assert!(mailbox.is_closed());

        let err = mailbox.enqueue(Message::new(3, "m", vec![])).await;
        assert!(matches!(err, Err(MailboxError::Closed)));
        assert!(mailbox.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_consumer() {
        let mailbox = Arc::new(Mailbox::new(MailboxConfig::default(), "test".to_string()));
        let consumer = {
            let mailbox = mailbox.clone();
            tokio::spawn(async move { mailbox.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        mailbox.close().await;

        assert!(consumer.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_track_flow() {
        let mailbox = Mailbox::new(MailboxConfig::default(), "test".to_string());
        mailbox.enqueue(Message::new(1, "m", vec![])).await.unwrap();
        mailbox.enqueue(Message::new(2, "m", vec![])).await.unwrap();
        mailbox.dequeue().await.unwrap();

        let stats = mailbox.stats().await;
        assert_eq!(stats.total_enqueued, 2);
        assert_eq!(stats.total_dequeued, 1);
        assert_eq!(stats.current_size, 1);
    }
}
