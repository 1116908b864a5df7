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

//! Message stream lifecycle
//!
//! ## Purpose
//! Opens the bidirectional stream after join, pumps inbound frames to the
//! message handler (responses) and the invocation system (requests), and
//! re-establishes the stream when the transport drops it while the client
//! is connected. Reconnects preserve the node identity and in-flight
//! pending calls: outbound frames are held in the queue until the stream
//! recovers, each call still bounded by its own deadline.
//!
//! ## Reconnect policy
//! Exponential backoff from 250ms, doubling per failed attempt, capped at
//! 5s with ±10% jitter. Attempts stop once the node lease has expired; the
//! lease-failure path owns recovery from there.

use crate::invocation::InvocationSystem;
use crate::message_handler::MessageHandler;
use crate::metrics::ClientMetrics;
use crate::transport::{MeshStream, Transport};
use plexmesh_core::wire::Frame;
use plexmesh_core::{ClientError, ClientState, Clock, LocalNode, TransportError};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const RECONNECT_BASE: Duration = Duration::from_millis(250);
const RECONNECT_CAP: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ReconnectState {
    attempts: u32,
    next_attempt_at: Option<Instant>,
}

struct ConnectionInner {
    transport: Arc<dyn Transport>,
    endpoint: String,
    local_node: Arc<LocalNode>,
    clock: Arc<dyn Clock>,
    message_handler: Arc<MessageHandler>,
    invocations: Arc<InvocationSystem>,
    metrics: Arc<ClientMetrics>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    stream: RwLock<Option<Arc<dyn MeshStream>>>,
    healthy: AtomicBool,
    running: AtomicBool,
    stream_ready: Notify,
    reconnect: Mutex<ReconnectState>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the message stream and its pump tasks.
pub struct ConnectionHandler {
    inner: Arc<ConnectionInner>,
}

impl ConnectionHandler {
    /// Create the handler; `outbound_rx` is the queue the message handler
    /// and execution system write frames into.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: String,
        local_node: Arc<LocalNode>,
        clock: Arc<dyn Clock>,
        message_handler: Arc<MessageHandler>,
        invocations: Arc<InvocationSystem>,
        metrics: Arc<ClientMetrics>,
        outbound_rx: mpsc::UnboundedReceiver<Frame>,
    ) -> Self {
        ConnectionHandler {
            inner: Arc::new(ConnectionInner {
                transport,
                endpoint,
                local_node,
                clock,
                message_handler,
                invocations,
                metrics,
                outbound_rx: Mutex::new(Some(outbound_rx)),
                stream: RwLock::new(None),
                healthy: AtomicBool::new(false),
                running: AtomicBool::new(false),
                stream_ready: Notify::new(),
                reconnect: Mutex::new(ReconnectState::default()),
                reader_task: Mutex::new(None),
                writer_task: Mutex::new(None),
            }),
        }
    }

    /// Open the stream for the joined node and start the pumps.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        let node_id = inner
            .local_node
            .snapshot()
            .await
            .node_info
            .map(|info| info.id)
            .ok_or(TransportError::NotConnected)?;

        let stream = inner
            .transport
            .open_stream(&inner.endpoint, &node_id)
            .await
            .map_err(ClientError::Transport)?;

        inner.running.store(true, Ordering::Release);
        ConnectionInner::install_stream(inner, stream).await;
        ConnectionInner::spawn_writer(inner).await;
        info!(endpoint = %inner.endpoint, node_id = %node_id, "message stream established");
        Ok(())
    }

    /// Per-tick liveness check; one reconnect attempt when the backoff
    /// window allows it.
    pub async fn tick(&self) {
        let inner = &self.inner;
        if !inner.running.load(Ordering::Acquire) {
            return;
        }
        if inner.local_node.client_state().await != ClientState::Connected {
            return;
        }
        if inner.healthy.load(Ordering::Acquire) {
            let mut reconnect = inner.reconnect.lock().await;
            reconnect.attempts = 0;
            reconnect.next_attempt_at = None;
            return;
        }

        let now = inner.clock.now();
        {
            let reconnect = inner.reconnect.lock().await;
            if let Some(at) = reconnect.next_attempt_at {
                if now < at {
                    return;
                }
            }
        }

        let snapshot = inner.local_node.snapshot().await;
        let Some(info) = snapshot.node_info else {
            return;
        };
        if info.lease.expired(now) {
            // Past lease expiry the membership is gone anyway; the node
            // leaser raises the fatal path on this same tick.
            return;
        }

        match inner.transport.open_stream(&inner.endpoint, &info.id).await {
            Ok(stream) => {
                ConnectionInner::install_stream(inner, stream).await;
                inner.metrics.record_reconnect();
                let mut reconnect = inner.reconnect.lock().await;
                reconnect.attempts = 0;
                reconnect.next_attempt_at = None;
                info!("message stream re-established");
            }
            Err(err) => {
                let mut reconnect = inner.reconnect.lock().await;
                reconnect.attempts = reconnect.attempts.saturating_add(1);
                let exp = RECONNECT_BASE
                    .saturating_mul(2u32.saturating_pow(reconnect.attempts.min(8)));
                let jitter = rand::thread_rng().gen_range(0.9..=1.1);
                let backoff = exp.min(RECONNECT_CAP).mul_f64(jitter);
                reconnect.next_attempt_at = Some(now + backoff);
                warn!(
                    attempt = reconnect.attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "reconnect attempt failed"
                );
            }
        }
    }

    /// Close the stream cleanly. Subsequent inbound frames are discarded.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        inner.running.store(false, Ordering::Release);
        if let Some(handle) = inner.reader_task.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = inner.writer_task.lock().await.take() {
            handle.abort();
        }
        if let Some(stream) = inner.stream.write().await.take() {
            stream.close().await;
        }
        inner.healthy.store(false, Ordering::Release);
        inner.stream_ready.notify_waiters();
        debug!("message stream closed");
    }

    /// Whether the stream is currently believed healthy.
    pub fn is_healthy(&self) -> bool {
        self.inner.healthy.load(Ordering::Acquire)
    }
}

impl ConnectionInner {
    async fn install_stream(inner: &Arc<ConnectionInner>, stream: Arc<dyn MeshStream>) {
        if let Some(previous) = inner.reader_task.lock().await.take() {
            previous.abort();
        }
        *inner.stream.write().await = Some(stream.clone());
        inner.healthy.store(true, Ordering::Release);

        let this = inner.clone();
        let handle = tokio::spawn(async move {
            while let Some(frame) = stream.recv().await {
                this.route_inbound(frame).await;
            }
            this.healthy.store(false, Ordering::Release);
            debug!("message stream reader ended");
        });
        *inner.reader_task.lock().await = Some(handle);
        inner.stream_ready.notify_waiters();
    }

    async fn route_inbound(&self, frame: Frame) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        match frame {
            Frame::InvocationResult(result) => {
                self.message_handler.on_inbound_response(result).await;
            }
            Frame::Invocation(invocation) => {
                self.invocations.dispatch_inbound(invocation).await;
            }
            other => {
                warn!(kind = other.kind(), "unexpected frame on message stream");
            }
        }
    }

    /// The writer drains the outbound queue into the live stream, holding
    /// each frame until a healthy stream accepts it.
    async fn spawn_writer(inner: &Arc<ConnectionInner>) {
        let mut guard = inner.writer_task.lock().await;
        if guard.is_some() {
            return;
        }
        let Some(mut outbound_rx) = inner.outbound_rx.lock().await.take() else {
            return;
        };
        let this = inner.clone();
        *guard = Some(tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                loop {
                    if !this.running.load(Ordering::Acquire) {
                        return;
                    }
                    // Arm the wakeup before re-checking health so a
                    // reconnect between the check and the await is not
                    // lost.
                    let ready = this.stream_ready.notified();
                    if this.healthy.load(Ordering::Acquire) {
                        let stream = this.stream.read().await.clone();
                        if let Some(stream) = stream {
                            match stream.send(frame.clone()).await {
                                Ok(()) => break,
                                Err(err) => {
                                    warn!(error = %err, "outbound frame write failed");
                                    this.healthy.store(false, Ordering::Release);
                                    continue;
                                }
                            }
                        }
                    }
                    ready.await;
                }
            }
        }));
    }
}
