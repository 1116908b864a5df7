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

//! Outbound correlation table
//!
//! ## Purpose
//! Owns `pending`: the map from message id to the completion sink of an
//! outbound call awaiting its response. A pending call is completed exactly
//! once, by whichever comes first of the inbound demultiplex and the
//! per-tick timeout sweep; removal from the map under the table lock is
//! what makes the two mutually exclusive. Responses with no pending entry
//! are dropped and counted as stray.

use crate::metrics::ClientMetrics;
use crate::transport::MessageIds;
use chrono::Utc;
use plexmesh_core::wire::{Frame, InvocationFrame, InvocationOutcome, InvocationResultFrame};
use plexmesh_core::{
    AddressableReference, Clock, InvocationError, LocalNode, TransportError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

/// Completion sink for one outbound call.
pub struct PendingCall {
    deadline: Instant,
    sink: oneshot::Sender<Result<Vec<u8>, InvocationError>>,
}

/// Correlation table plus timeout sweep for outbound invocations.
pub struct MessageHandler {
    pending: Mutex<HashMap<u64, PendingCall>>,
    ids: Arc<MessageIds>,
    outbound: mpsc::UnboundedSender<Frame>,
    local_node: Arc<LocalNode>,
    clock: Arc<dyn Clock>,
    metrics: Arc<ClientMetrics>,
}

impl MessageHandler {
    /// Create a handler writing frames into `outbound`.
    pub fn new(
        ids: Arc<MessageIds>,
        outbound: mpsc::UnboundedSender<Frame>,
        local_node: Arc<LocalNode>,
        clock: Arc<dyn Clock>,
        metrics: Arc<ClientMetrics>,
    ) -> Self {
        MessageHandler {
            pending: Mutex::new(HashMap::new()),
            ids,
            outbound,
            local_node,
            clock,
            metrics,
        }
    }

    /// Register a pending call and write the invocation frame.
    ///
    /// Returns the receiver the caller awaits. The frame is queued towards
    /// the stream; if the stream is down it is held until recovery, subject
    /// to this call's own deadline.
    pub async fn send(
        &self,
        target: AddressableReference,
        method: String,
        args: Vec<u8>,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<Result<Vec<u8>, InvocationError>>, InvocationError> {
        let message_id = self.ids.next();
        let deadline = self.clock.now() + timeout;
        let (sink, receiver) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            pending.insert(message_id, PendingCall { deadline, sink });
        }

        let source = self
            .local_node
            .snapshot()
            .await
            .node_info
            .map(|info| info.id);
        let frame = Frame::Invocation(InvocationFrame {
            message_id,
            source,
            target,
            method,
            args,
            budget_ms: timeout.as_millis() as u64,
            timestamp: Utc::now(),
        });

        if self.outbound.send(frame).is_err() {
            self.pending.lock().await.remove(&message_id);
            return Err(TransportError::StreamClosed.into());
        }
        self.metrics.record_invocation_sent();
        Ok(receiver)
    }

    /// Complete the pending call matching an inbound response.
    ///
    /// A response with no pending entry (already timed out, or duplicated
    /// by the mesh) is discarded and counted.
    pub async fn on_inbound_response(&self, frame: InvocationResultFrame) {
        let call = self.pending.lock().await.remove(&frame.message_id);
        match call {
            Some(call) => {
                let result = match frame.outcome {
                    InvocationOutcome::Ok(payload) => Ok(payload),
                    InvocationOutcome::Err { kind, message } => {
                        Err(InvocationError::Remote { kind, message })
                    }
                };
                // Send failure means the caller went away; nothing to do.
                let _ = call.sink.send(result);
                self.metrics.record_response();
            }
            None => {
                self.metrics.record_stray_response();
                debug!(message_id = frame.message_id, "dropping stray response");
            }
        }
    }

    /// Expire pending calls whose deadline has passed.
    ///
    /// The walk is amortized: invocation counts are bounded by application
    /// concurrency, not tick throughput.
    pub async fn tick(&self) {
        let now = self.clock.now();
        let expired: Vec<PendingCall> = {
            let mut pending = self.pending.lock().await;
            let ids: Vec<u64> = pending
                .iter()
                .filter(|(_, call)| call.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id))
                .collect()
        };
        if expired.is_empty() {
            return;
        }
        warn!(count = expired.len(), "timing out expired outbound calls");
        for call in expired {
            let _ = call.sink.send(Err(InvocationError::Timeout));
            self.metrics.record_timeout();
        }
    }

    /// Fail every remaining pending call. Used by `stop()` so the table is
    /// empty once shutdown returns.
    pub async fn fail_all_pending(&self) {
        let drained: Vec<PendingCall> = {
            let mut pending = self.pending.lock().await;
            pending.drain().map(|(_, call)| call).collect()
        };
        for call in drained {
            let _ = call.sink.send(Err(TransportError::StreamClosed.into()));
        }
    }

    /// Number of calls currently awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}
