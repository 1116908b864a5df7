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

//! Cooperative tick scheduler
//!
//! ## Purpose
//! One loop drives all periodic work. Each iteration runs the composite
//! tick, then sleeps until the next boundary. An overrunning tick skips the
//! sleep so the next one starts immediately; ticks never stack, at most one
//! is in progress. A handler returning [`TickOutcome::Stop`] (the
//! lease-fatal path) ends the loop; any other failure is the handler's own
//! business and must not escape it.

use async_trait::async_trait;
use plexmesh_core::ClientError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

/// What the composite tick tells the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep ticking.
    Continue,
    /// Stop the loop; used by the lease-fatal path.
    Stop,
}

/// The work executed once per tick.
#[async_trait]
pub trait TickHandler: Send + Sync {
    /// Run one composite tick.
    async fn tick(&self) -> TickOutcome;
}

/// Fixed-rate cooperative scheduler.
pub struct Ticker {
    running: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Ticker {
    /// Idle ticker.
    pub fn new() -> Self {
        Ticker {
            running: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
            task: Mutex::new(None),
        }
    }

    /// Start ticking `handler` every `tick_rate`.
    ///
    /// ## Errors
    /// [`ClientError::InvalidState`] when the ticker is already running.
    pub async fn start(
        &self,
        tick_rate: Duration,
        handler: Arc<dyn TickHandler>,
    ) -> Result<(), ClientError> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Err(ClientError::InvalidState(
                "ticker is already running".to_string(),
            ));
        }
        self.running.store(true, Ordering::Release);

        let running = self.running.clone();
        let stop_notify = self.stop_notify.clone();
        *task = Some(tokio::spawn(async move {
            while running.load(Ordering::Acquire) {
                let started = tokio::time::Instant::now();
                match handler.tick().await {
                    TickOutcome::Continue => {}
                    TickOutcome::Stop => {
                        running.store(false, Ordering::Release);
                        break;
                    }
                }
                let elapsed = started.elapsed();
                if elapsed < tick_rate {
                    tokio::select! {
                        _ = tokio::time::sleep(tick_rate - elapsed) => {}
                        _ = stop_notify.notified() => {}
                    }
                }
                // Overrun: skip the sleep, start the next tick at once.
            }
            debug!("ticker loop ended");
        }));
        Ok(())
    }

    /// Ask the loop to stop after the tick in progress; does not wait.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    /// Wait for the loop task to finish.
    pub async fn join(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Request a stop and wait for it.
    pub async fn stop(&self) {
        self.request_stop();
        self.join().await;
    }

    /// Whether the loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Mutex as TokioMutex;

    struct CountingHandler {
        ticks: AtomicUsize,
        in_progress: AtomicUsize,
        max_in_progress: AtomicUsize,
        delay: Duration,
        stop_after: Option<usize>,
    }

    #[async_trait]
    impl TickHandler for CountingHandler {
        async fn tick(&self) -> TickOutcome {
            let current = self.in_progress.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_progress.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_progress.fetch_sub(1, Ordering::SeqCst);

            let count = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            match self.stop_after {
                Some(n) if count >= n => TickOutcome::Stop,
                _ => TickOutcome::Continue,
            }
        }
    }

    fn handler(delay: Duration, stop_after: Option<usize>) -> Arc<CountingHandler> {
        Arc::new(CountingHandler {
            ticks: AtomicUsize::new(0),
            in_progress: AtomicUsize::new(0),
            max_in_progress: AtomicUsize::new(0),
            delay,
            stop_after,
        })
    }

    #[tokio::test]
    async fn test_ticks_at_configured_rate() {
        let ticker = Ticker::new();
        let h = handler(Duration::ZERO, None);
        ticker
            .start(Duration::from_millis(20), h.clone())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(110)).await;
        ticker.stop().await;

        let ticks = h.ticks.load(Ordering::SeqCst);
        assert!(ticks >= 3, "expected at least 3 ticks, got {}", ticks);
        assert_eq!(h.max_in_progress.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overrun_does_not_stack_ticks() {
        let ticker = Ticker::new();
        // Each tick takes 3x the tick rate.
        let h = handler(Duration::from_millis(30), None);
        ticker
            .start(Duration::from_millis(10), h.clone())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        ticker.stop().await;

        assert_eq!(h.max_in_progress.load(Ordering::SeqCst), 1);
        assert!(h.ticks.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_stop_outcome_ends_loop() {
        let ticker = Ticker::new();
        let h = handler(Duration::ZERO, Some(2));
        ticker
            .start(Duration::from_millis(5), h.clone())
            .await
            .unwrap();

        ticker.join().await;
        assert_eq!(h.ticks.load(Ordering::SeqCst), 2);
        assert!(!ticker.is_running());
    }

    #[tokio::test]
    async fn test_double_start_is_an_error() {
        let ticker = Ticker::new();
        let h = handler(Duration::ZERO, None);
        ticker
            .start(Duration::from_millis(50), h.clone())
            .await
            .unwrap();

        let err = ticker.start(Duration::from_millis(50), h).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidState(_)));
        ticker.stop().await;
    }

    #[tokio::test]
    async fn test_stop_cuts_the_sleep_short() {
        let ticker = Ticker::new();
        let h = handler(Duration::ZERO, None);
        ticker
            .start(Duration::from_secs(60), h.clone())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let started = tokio::time::Instant::now();
        ticker.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    /// Composite ordering: subcomponents run in the order the handler
    /// invokes them, one tick at a time.
    struct OrderedHandler {
        log: Arc<TokioMutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl TickHandler for OrderedHandler {
        async fn tick(&self) -> TickOutcome {
            let mut log = self.log.lock().await;
            log.push("connection");
            log.push("node_leaser");
            log.push("message_handler");
            log.push("execution");
            TickOutcome::Stop
        }
    }

    #[tokio::test]
    async fn test_composite_order_is_preserved() {
        let log = Arc::new(TokioMutex::new(Vec::new()));
        let ticker = Ticker::new();
        ticker
            .start(
                Duration::from_millis(5),
                Arc::new(OrderedHandler { log: log.clone() }),
            )
            .await
            .unwrap();
        ticker.join().await;

        assert_eq!(
            *log.lock().await,
            vec!["connection", "node_leaser", "message_handler", "execution"]
        );
    }
}
