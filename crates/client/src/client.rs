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

//! Client orchestrator
//!
//! ## Purpose
//! Top-level lifecycle. `start()` runs the linear startup: capability scan,
//! definition setup, capability advertisement, cluster join with retry,
//! stream connect, then ticking. The composite tick fans out in a fixed
//! order: connection recovery precedes lease renewal so renewal has a live
//! channel; message timeouts precede the execution sweep so responses
//! complete before idleness is judged. `stop()` runs the drain sequence and
//! leaves the client in its terminal state.
//!
//! ## Unhandled-failure policy
//! `NodeLeaseRenewalFailed` while connected fires the host handler once,
//! transitions to STOPPING, and drains. Every other error is logged and
//! swallowed inside its component; nothing else unwinds the ticker.

use crate::addressable_leaser::AddressableLeaser;
use crate::capabilities::{CapabilityScanner, Deactivator, DefinitionDirectory};
use crate::config::MeshClientConfig;
use crate::connection::ConnectionHandler;
use crate::execution::ExecutionSystem;
use crate::invocation::InvocationSystem;
use crate::message_handler::MessageHandler;
use crate::metrics::{ClientMetrics, ClientMetricsSnapshot};
use crate::node_leaser::NodeLeaser;
use crate::proxy::AddressableProxy;
use crate::ticker::{TickHandler, TickOutcome, Ticker};
use async_trait::async_trait;
use plexmesh_core::{
    AddressableReference, ClientError, ClientState, InterfaceId, Key, NodeId, NodeStatus,
};
use plexmesh_core::LocalNode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Host callback fired when the node lease is irrecoverably lost.
pub type NodeLeaseRenewalFailedHandler = Arc<dyn Fn() + Send + Sync>;

/// Outcome of one named stop phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopPhase {
    /// Phase name.
    pub name: &'static str,
    /// Whether the phase ran to completion.
    pub completed: bool,
}

/// Record of a completed `stop()` sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Phases in execution order.
    pub phases: Vec<StopPhase>,
    /// Activations abandoned at the stop deadline.
    pub abandoned_activations: usize,
}

impl StopReport {
    fn record(&mut self, name: &'static str) {
        self.phases.push(StopPhase {
            name,
            completed: true,
        });
    }
}

pub(crate) struct ClientInner {
    pub(crate) config: MeshClientConfig,
    pub(crate) local_node: Arc<LocalNode>,
    pub(crate) scanner: CapabilityScanner,
    pub(crate) definitions: Arc<DefinitionDirectory>,
    pub(crate) node_leaser: Arc<NodeLeaser>,
    #[allow(dead_code)]
    pub(crate) addressable_leaser: AddressableLeaser,
    pub(crate) message_handler: Arc<MessageHandler>,
    pub(crate) execution: Arc<ExecutionSystem>,
    pub(crate) invocations: Arc<InvocationSystem>,
    pub(crate) connection: Arc<ConnectionHandler>,
    pub(crate) ticker: Ticker,
    pub(crate) metrics: Arc<ClientMetrics>,
    pub(crate) lease_failure_handler: Option<NodeLeaseRenewalFailedHandler>,
    pub(crate) lease_failure_fired: AtomicBool,
    pub(crate) stopping_guard: AtomicBool,
    pub(crate) stop_report: Mutex<Option<StopReport>>,
}

struct CompositeTick {
    inner: Arc<ClientInner>,
}

#[async_trait]
impl TickHandler for CompositeTick {
    async fn tick(&self) -> TickOutcome {
        let inner = &self.inner;
        inner.connection.tick().await;
        if let Err(err) = inner.node_leaser.tick().await {
            if matches!(err, ClientError::NodeLeaseRenewalFailed) {
                return ClientInner::handle_lease_failure(inner);
            }
            warn!(error = %err, "node leaser tick failed");
        }
        inner.message_handler.tick().await;
        inner.execution.tick().await;
        TickOutcome::Continue
    }
}

impl ClientInner {
    fn handle_lease_failure(inner: &Arc<ClientInner>) -> TickOutcome {
        if !inner.lease_failure_fired.swap(true, Ordering::SeqCst) {
            error!("node lease irrecoverably lost; stopping client");
            if let Some(handler) = &inner.lease_failure_handler {
                handler();
            }
            let this = inner.clone();
            tokio::spawn(async move {
                if let Err(err) = this.shutdown(None).await {
                    warn!(error = %err, "lease-loss shutdown failed");
                }
            });
        }
        TickOutcome::Stop
    }

    async fn shutdown(
        &self,
        deactivator: Option<Arc<dyn Deactivator>>,
    ) -> Result<StopReport, ClientError> {
        if self.stopping_guard.swap(true, Ordering::SeqCst) {
            return self.await_existing_stop().await;
        }

        let state = self.local_node.client_state().await;
        if state == ClientState::Connected {
            self.local_node.try_transition(ClientState::Stopping).await?;
        } else {
            self.stopping_guard.store(false, Ordering::SeqCst);
            return Err(ClientError::InvalidState(format!(
                "stop() called while {}",
                state
            )));
        }

        info!("stopping mesh client");
        let mut report = StopReport::default();

        // No new tick may start while we drain.
        self.ticker.request_stop();

        self.node_leaser.leave_cluster().await;
        report.record("leave_cluster");

        report.abandoned_activations = self.execution.stop(deactivator).await;
        report.record("drain_activations");

        self.ticker.join().await;
        report.record("stop_ticker");

        self.connection.disconnect().await;
        report.record("disconnect");

        self.message_handler.fail_all_pending().await;
        report.record("fail_pending");

        self.local_node
            .manipulate(|mut status| {
                status.node_info = None;
                status.capabilities.clear();
                status.client_state = ClientState::Stopped;
                status
            })
            .await;
        report.record("reset_node");

        info!("mesh client stopped");
        *self.stop_report.lock().await = Some(report.clone());
        Ok(report)
    }

    /// A second `stop()` (or a stop racing the lease-loss path) waits for
    /// the one already in flight.
    async fn await_existing_stop(&self) -> Result<StopReport, ClientError> {
        let deadline = tokio::time::Instant::now() + self.config.stop_deadline * 2;
        loop {
            if let Some(report) = self.stop_report.lock().await.clone() {
                return Ok(report);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::InvalidState(
                    "stop already in progress".to_string(),
                ));
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

/// The mesh client: a node in the virtual-actor mesh.
///
/// Build one with [`crate::builder::MeshClientBuilder`], `start()` it, then
/// hand out proxies. The client is both a server (hosting activations the
/// mesh routes here) and a caller (invoking remote actors through typed
/// proxies).
pub struct MeshClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for MeshClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshClient").finish_non_exhaustive()
    }
}

impl MeshClient {
    pub(crate) fn from_inner(inner: Arc<ClientInner>) -> Self {
        MeshClient { inner }
    }

    /// Start the client: scan, advertise, join (with retry), connect, tick.
    ///
    /// ## Errors
    /// - [`ClientError::InvalidState`] when called twice or after stop
    /// - [`ClientError::ClusterJoinFailed`] after exhausting join retries;
    ///   the local node is back at IDLE and `start()` may be retried
    pub async fn start(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        inner.local_node.try_transition(ClientState::Connecting).await?;
        info!(
            namespace = %inner.config.namespace,
            endpoint = %inner.config.endpoint,
            "starting mesh client"
        );

        let scan = inner.scanner.scan()?;
        // A retried start after a failed join finds definitions already
        // installed; setup stays single-shot.
        if !inner.definitions.is_initialized().await {
            inner.definitions.setup_definitions(scan).await?;
        }
        let capabilities = inner.definitions.generate_capabilities().await;
        info!(count = capabilities.len(), "advertising capabilities");
        inner
            .local_node
            .manipulate(move |mut status| {
                status.capabilities = capabilities;
                status
            })
            .await;

        let attempts = inner.config.join_attempts.max(1);
        let mut joined = false;
        for attempt in 1..=attempts {
            // The retry loop is cancelable by moving the node out of
            // CONNECTING from another task.
            if inner.local_node.client_state().await != ClientState::Connecting {
                return Err(ClientError::InvalidState(
                    "start() cancelled by a state change".to_string(),
                ));
            }
            match inner.node_leaser.join_cluster(&inner.config.namespace).await {
                Ok(_) => {
                    joined = true;
                    break;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "cluster join attempt failed");
                    if attempt < attempts {
                        tokio::time::sleep(inner.config.join_delay).await;
                    }
                }
            }
        }
        if !joined {
            inner.local_node.reset().await;
            return Err(ClientError::ClusterJoinFailed { attempts });
        }

        if let Err(err) = inner.connection.connect().await {
            inner.node_leaser.leave_cluster().await;
            inner.local_node.reset().await;
            return Err(err);
        }

        inner.local_node.try_transition(ClientState::Connected).await?;
        inner
            .ticker
            .start(
                inner.config.tick_rate,
                Arc::new(CompositeTick {
                    inner: inner.clone(),
                }),
            )
            .await?;
        info!("mesh client connected");
        Ok(())
    }

    /// Stop the client: leave, drain activations, stop ticking, disconnect.
    pub async fn stop(&self) -> Result<StopReport, ClientError> {
        self.inner.shutdown(None).await
    }

    /// Stop with a deactivator override applied to the drain.
    pub async fn stop_with(
        &self,
        deactivator: Arc<dyn Deactivator>,
    ) -> Result<StopReport, ClientError> {
        self.inner.shutdown(Some(deactivator)).await
    }

    /// Proxy for the actor identified by `(interface, key)`.
    pub fn proxy(
        &self,
        interface: impl Into<InterfaceId>,
        key: impl Into<Key>,
    ) -> AddressableProxy {
        AddressableProxy::new(
            AddressableReference::new(interface, key),
            self.inner.invocations.clone(),
            self.inner.config.invocation_timeout,
        )
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ClientState {
        self.inner.local_node.client_state().await
    }

    /// Mesh-assigned identity, once joined.
    pub async fn node_id(&self) -> Option<NodeId> {
        self.inner
            .local_node
            .snapshot()
            .await
            .node_info
            .map(|info| info.id)
    }

    /// Snapshot of node-level status.
    pub async fn status(&self) -> NodeStatus {
        self.inner.local_node.snapshot().await
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> ClientMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Outbound calls currently awaiting a response.
    pub async fn pending_invocations(&self) -> usize {
        self.inner.message_handler.pending_count().await
    }

    /// Live activations hosted by this node.
    pub async fn activation_count(&self) -> usize {
        self.inner.execution.activation_count().await
    }

    /// Report of the stop sequence, once `stop()` has completed.
    pub async fn stop_report(&self) -> Option<StopReport> {
        self.inner.stop_report.lock().await.clone()
    }
}
