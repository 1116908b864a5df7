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

//! In-process mesh for tests
//!
//! The simplest and fastest environment for exercising the client: a
//! scripted directory plus loopback message routing, all in one process.
//! Invocations a client sends come back to whichever joined node advertises
//! the target interface, so a single client talks to actors it hosts itself
//! through the full pipeline.
//!
//! Failure injection covers the scenarios the runtime must survive: join
//! rejection, renewal loss, suppressed responses, dropped invocations, and
//! killed streams.

use crate::transport::{MeshStream, Transport};
use async_trait::async_trait;
use plexmesh_core::wire::{
    AddressableLeaseOutcome, AddressableLeaseResponse, Frame, InvocationOutcome,
    InvocationResultFrame, JoinOutcome, JoinResponse, LeaveResponse, RenewOutcome, RenewResponse,
};
use plexmesh_core::{
    AddressableReference, InterfaceId, LeaseTerms, NodeId, TransportError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;

struct MeshNode {
    capabilities: HashSet<InterfaceId>,
    sender: Option<mpsc::UnboundedSender<Frame>>,
}

struct MeshState {
    node_lease_terms: StdRwLock<LeaseTerms>,
    addressable_lease_terms: StdRwLock<LeaseTerms>,
    reject_joins: AtomicBool,
    fail_renewals: AtomicBool,
    suppress_responses: AtomicBool,
    drop_invocations: AtomicBool,
    next_node: AtomicU64,
    joins: AtomicU64,
    renewals: AtomicU64,
    nodes: RwLock<HashMap<NodeId, MeshNode>>,
    placements: RwLock<HashMap<AddressableReference, NodeId>>,
    origins: RwLock<HashMap<u64, NodeId>>,
}

/// Scripted mesh directory plus loopback transport.
pub struct InProcessMesh {
    state: Arc<MeshState>,
}

impl InProcessMesh {
    /// Mesh with 10s node leases and 10s addressable leases.
    pub fn new() -> Self {
        InProcessMesh {
            state: Arc::new(MeshState {
                node_lease_terms: StdRwLock::new(LeaseTerms::with_ttl(Duration::from_secs(10))),
                addressable_lease_terms: StdRwLock::new(LeaseTerms::with_ttl(
                    Duration::from_secs(10),
                )),
                reject_joins: AtomicBool::new(false),
                fail_renewals: AtomicBool::new(false),
                suppress_responses: AtomicBool::new(false),
                drop_invocations: AtomicBool::new(false),
                next_node: AtomicU64::new(0),
                joins: AtomicU64::new(0),
                renewals: AtomicU64::new(0),
                nodes: RwLock::new(HashMap::new()),
                placements: RwLock::new(HashMap::new()),
                origins: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Lease terms granted on join and renewal.
    pub fn set_node_lease(&self, terms: LeaseTerms) {
        *self.state.node_lease_terms.write().expect("lock poisoned") = terms;
    }

    /// Lease terms granted for addressables.
    pub fn set_addressable_lease(&self, terms: LeaseTerms) {
        *self
            .state
            .addressable_lease_terms
            .write()
            .expect("lock poisoned") = terms;
    }

    /// Refuse every join request.
    pub fn reject_joins(&self, on: bool) {
        self.state.reject_joins.store(on, Ordering::SeqCst);
    }

    /// Answer every renewal with lease-lost.
    pub fn fail_renewals(&self, on: bool) {
        self.state.fail_renewals.store(on, Ordering::SeqCst);
    }

    /// Swallow invocation results so callers time out.
    pub fn suppress_responses(&self, on: bool) {
        self.state.suppress_responses.store(on, Ordering::SeqCst);
    }

    /// Swallow invocations before they reach a host.
    pub fn drop_invocations(&self, on: bool) {
        self.state.drop_invocations.store(on, Ordering::SeqCst);
    }

    /// Drop every node's stream sender, simulating a transport outage.
    pub async fn kill_streams(&self) {
        let mut nodes = self.state.nodes.write().await;
        for node in nodes.values_mut() {
            node.sender = None;
        }
    }

    /// Join requests observed.
    pub fn join_count(&self) -> u64 {
        self.state.joins.load(Ordering::SeqCst)
    }

    /// Renewal requests observed.
    pub fn renewal_count(&self) -> u64 {
        self.state.renewals.load(Ordering::SeqCst)
    }
}

impl Default for InProcessMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshState {
    async fn handle_request(&self, frame: Frame) -> Result<Frame, TransportError> {
        match frame {
            Frame::Join(req) => {
                self.joins.fetch_add(1, Ordering::SeqCst);
                if self.reject_joins.load(Ordering::SeqCst) {
                    return Ok(Frame::JoinAck(JoinResponse {
                        message_id: req.message_id,
                        outcome: JoinOutcome::Rejected {
                            reason: "joins disabled".to_string(),
                        },
                    }));
                }
                let n = self.next_node.fetch_add(1, Ordering::SeqCst) + 1;
                let node_id = NodeId::new(format!("node-{}", n));
                self.nodes.write().await.insert(
                    node_id.clone(),
                    MeshNode {
                        capabilities: req.capabilities.into_iter().collect(),
                        sender: None,
                    },
                );
                let lease = *self.node_lease_terms.read().expect("lock poisoned");
                Ok(Frame::JoinAck(JoinResponse {
                    message_id: req.message_id,
                    outcome: JoinOutcome::Granted { node_id, lease },
                }))
            }
            Frame::Renew(req) => {
                self.renewals.fetch_add(1, Ordering::SeqCst);
                let outcome = if self.fail_renewals.load(Ordering::SeqCst)
                    || !self.nodes.read().await.contains_key(&req.node_id)
                {
                    RenewOutcome::Lost {
                        reason: "membership revoked".to_string(),
                    }
                } else {
                    RenewOutcome::Renewed {
                        lease: *self.node_lease_terms.read().expect("lock poisoned"),
                    }
                };
                Ok(Frame::RenewAck(RenewResponse {
                    message_id: req.message_id,
                    outcome,
                }))
            }
            Frame::Leave(req) => {
                self.nodes.write().await.remove(&req.node_id);
                self.placements
                    .write()
                    .await
                    .retain(|_, owner| owner != &req.node_id);
                Ok(Frame::LeaveAck(LeaveResponse {
                    message_id: req.message_id,
                }))
            }
            Frame::Lease(req) => {
                let owner = self.resolve_host(&req.reference).await;
                let outcome = match owner {
                    Some(owner) => AddressableLeaseOutcome::Granted {
                        owner,
                        lease: *self.addressable_lease_terms.read().expect("lock poisoned"),
                    },
                    None => AddressableLeaseOutcome::Denied {
                        reason: format!("no node advertises {}", req.reference.interface),
                    },
                };
                Ok(Frame::LeaseAck(AddressableLeaseResponse {
                    message_id: req.message_id,
                    outcome,
                }))
            }
            other => Err(TransportError::Protocol(format!(
                "{} is not a directory request",
                other.kind()
            ))),
        }
    }

    /// Existing placement wins; otherwise any node advertising the
    /// interface gets the actor.
    async fn resolve_host(&self, reference: &AddressableReference) -> Option<NodeId> {
        let nodes = self.nodes.read().await;
        let mut placements = self.placements.write().await;
        if let Some(owner) = placements.get(reference) {
            if nodes.contains_key(owner) {
                return Some(owner.clone());
            }
            placements.remove(reference);
        }
        let owner = nodes
            .iter()
            .find(|(_, node)| node.capabilities.contains(&reference.interface))
            .map(|(id, _)| id.clone())?;
        placements.insert(reference.clone(), owner.clone());
        Some(owner)
    }

    async fn route_from(&self, origin: &NodeId, frame: Frame) {
        match frame {
            Frame::Invocation(mut invocation) => {
                if self.drop_invocations.load(Ordering::SeqCst) {
                    return;
                }
                let host = self.resolve_host(&invocation.target).await;
                match host {
                    Some(host) => {
                        self.origins
                            .write()
                            .await
                            .insert(invocation.message_id, origin.clone());
                        invocation.source = Some(origin.clone());
                        let message_id = invocation.message_id;
                        if !self.deliver(&host, Frame::Invocation(invocation)).await {
                            self.origins.write().await.remove(&message_id);
                            self.deliver(
                                origin,
                                error_result(message_id, "transport", "host unreachable"),
                            )
                            .await;
                        }
                    }
                    None => {
                        self.deliver(
                            origin,
                            error_result(
                                invocation.message_id,
                                "activation_failed",
                                "no node hosts the target interface",
                            ),
                        )
                        .await;
                    }
                }
            }
            Frame::InvocationResult(result) => {
                if self.suppress_responses.load(Ordering::SeqCst) {
                    return;
                }
                let destination = self.origins.write().await.remove(&result.message_id);
                if let Some(destination) = destination {
                    self.deliver(&destination, Frame::InvocationResult(result))
                        .await;
                }
            }
            other => {
                debug!(kind = other.kind(), "mesh ignoring stream frame");
            }
        }
    }

    async fn deliver(&self, node_id: &NodeId, frame: Frame) -> bool {
        let nodes = self.nodes.read().await;
        match nodes.get(node_id).and_then(|node| node.sender.as_ref()) {
            Some(sender) => sender.send(frame).is_ok(),
            None => false,
        }
    }
}

fn error_result(message_id: u64, kind: &str, message: &str) -> Frame {
    Frame::InvocationResult(InvocationResultFrame {
        message_id,
        outcome: InvocationOutcome::Err {
            kind: kind.to_string(),
            message: message.to_string(),
        },
    })
}

struct InProcessStream {
    state: Arc<MeshState>,
    node_id: NodeId,
    inbound: Mutex<mpsc::UnboundedReceiver<Frame>>,
    open: AtomicBool,
}

#[async_trait]
impl MeshStream for InProcessStream {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::StreamClosed);
        }
        self.state.route_from(&self.node_id, frame).await;
        Ok(())
    }

    async fn recv(&self) -> Option<Frame> {
        self.inbound.lock().await.recv().await
    }

    async fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

#[async_trait]
impl Transport for InProcessMesh {
    async fn request(&self, _endpoint: &str, frame: Frame) -> Result<Frame, TransportError> {
        self.state.handle_request(frame).await
    }

    async fn open_stream(
        &self,
        _endpoint: &str,
        node_id: &NodeId,
    ) -> Result<Arc<dyn MeshStream>, TransportError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        {
            let mut nodes = self.state.nodes.write().await;
            let node = nodes.get_mut(node_id).ok_or_else(|| {
                TransportError::ConnectFailed(format!("node {} has not joined", node_id))
            })?;
            node.sender = Some(sender);
        }
        Ok(Arc::new(InProcessStream {
            state: self.state.clone(),
            node_id: node_id.clone(),
            inbound: Mutex::new(receiver),
            open: AtomicBool::new(true),
        }))
    }
}
