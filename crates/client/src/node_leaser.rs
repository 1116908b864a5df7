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

//! Node membership lease
//!
//! ## Purpose
//! Acquires, renews, and releases the node's membership lease with the
//! mesh directory. Renewal runs on the tick cadence; a failed attempt is
//! not retried within the tick because the next tick is the retry. Expiry
//! is the hard bound: once `now` passes the lease's `expires_at` without a
//! successful renewal, the leaser raises
//! [`ClientError::NodeLeaseRenewalFailed`] and the orchestrator's policy
//! takes over.

use crate::transport::DirectoryChannel;
use plexmesh_core::wire::{JoinOutcome, RenewOutcome};
use plexmesh_core::{
    ClientError, ClientState, Clock, InterfaceId, LeaseWindow, LocalNode, NodeInfo,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Manages the node's membership lease.
pub struct NodeLeaser {
    directory: Arc<DirectoryChannel>,
    local_node: Arc<LocalNode>,
    clock: Arc<dyn Clock>,
    renewal_margin: f64,
}

impl NodeLeaser {
    /// Create a leaser over the given directory channel. `renewal_margin`
    /// is the lease fraction that should remain when renewal starts, for
    /// terms that leave the margin to the client.
    pub fn new(
        directory: Arc<DirectoryChannel>,
        local_node: Arc<LocalNode>,
        clock: Arc<dyn Clock>,
        renewal_margin: f64,
    ) -> Self {
        NodeLeaser {
            directory,
            local_node,
            clock,
            renewal_margin,
        }
    }

    /// Issue one join request advertising the node's capabilities.
    ///
    /// On success the assigned identity and lease land in the local node.
    /// Retry policy belongs to the caller (the orchestrator).
    ///
    /// ## Errors
    /// - [`ClientError::JoinRejected`] when the directory refuses
    /// - [`ClientError::Transport`] on channel failure
    pub async fn join_cluster(&self, namespace: &str) -> Result<NodeInfo, ClientError> {
        let snapshot = self.local_node.snapshot().await;
        let capabilities: Vec<InterfaceId> = snapshot.capabilities.into_iter().collect();

        match self.directory.join(namespace, capabilities).await? {
            JoinOutcome::Granted { node_id, lease } => {
                let window =
                    LeaseWindow::from_terms_with_margin(self.clock.now(), &lease, self.renewal_margin);
                let info = NodeInfo {
                    id: node_id,
                    lease: window,
                };
                let stored = info.clone();
                self.local_node
                    .manipulate(move |mut status| {
                        status.node_info = Some(stored);
                        status
                    })
                    .await;
                info!(node_id = %info.id, namespace, "joined cluster");
                Ok(info)
            }
            JoinOutcome::Rejected { reason } => Err(ClientError::JoinRejected(reason)),
        }
    }

    /// Per-tick renewal check.
    ///
    /// Renews once `now >= renew_at`. A transient channel failure before
    /// expiry is logged and left for the next tick; the lease being lost or
    /// expired surfaces [`ClientError::NodeLeaseRenewalFailed`].
    pub async fn tick(&self) -> Result<(), ClientError> {
        let snapshot = self.local_node.snapshot().await;
        if snapshot.client_state != ClientState::Connected {
            return Ok(());
        }
        let Some(info) = snapshot.node_info else {
            return Ok(());
        };

        let now = self.clock.now();
        if info.lease.expired(now) {
            error!(node_id = %info.id, "node lease expired before renewal");
            return Err(ClientError::NodeLeaseRenewalFailed);
        }
        if !info.lease.due_for_renewal(now) {
            return Ok(());
        }

        match self.directory.renew(&info.id).await {
            Ok(RenewOutcome::Renewed { lease }) => {
                let window = LeaseWindow::from_terms_with_margin(now, &lease, self.renewal_margin);
                self.local_node
                    .manipulate(move |mut status| {
                        if let Some(node_info) = status.node_info.as_mut() {
                            node_info.lease = window;
                        }
                        status
                    })
                    .await;
                debug!(node_id = %info.id, "node lease renewed");
                Ok(())
            }
            Ok(RenewOutcome::Lost { reason }) => {
                error!(node_id = %info.id, reason, "node lease lost");
                Err(ClientError::NodeLeaseRenewalFailed)
            }
            Err(err) => {
                if info.lease.expired(self.clock.now()) {
                    error!(node_id = %info.id, error = %err, "node lease expired during failed renewal");
                    Err(ClientError::NodeLeaseRenewalFailed)
                } else {
                    warn!(node_id = %info.id, error = %err, "lease renewal attempt failed; retrying next tick");
                    Ok(())
                }
            }
        }
    }

    /// Best-effort departure notice. Idempotent: errors are logged and a
    /// node that never joined is a no-op.
    pub async fn leave_cluster(&self) {
        let snapshot = self.local_node.snapshot().await;
        let Some(info) = snapshot.node_info else {
            debug!("leave_cluster: not joined, nothing to do");
            return;
        };
        match self.directory.leave(&info.id).await {
            Ok(()) => info!(node_id = %info.id, "left cluster"),
            Err(err) => warn!(node_id = %info.id, error = %err, "leave_cluster failed; ignoring"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MeshStream, MessageIds, Transport};
    use async_trait::async_trait;
    use plexmesh_core::wire::{
        Frame, JoinResponse, LeaveResponse, RenewResponse,
    };
    use plexmesh_core::{LeaseTerms, ManualClock, NodeId, TransportError};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    /// Directory stub granting fixed lease terms.
    struct StubDirectory {
        lease: LeaseTerms,
        reject_join: AtomicBool,
        lose_lease: AtomicBool,
        fail_channel: AtomicBool,
        renewals: AtomicU32,
        leaves: AtomicU32,
    }

    impl StubDirectory {
        fn new(lease: LeaseTerms) -> Self {
            StubDirectory {
                lease,
                reject_join: AtomicBool::new(false),
                lose_lease: AtomicBool::new(false),
                fail_channel: AtomicBool::new(false),
                renewals: AtomicU32::new(0),
                leaves: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for StubDirectory {
        async fn request(&self, _endpoint: &str, frame: Frame) -> Result<Frame, TransportError> {
            if self.fail_channel.load(Ordering::SeqCst) {
                return Err(TransportError::SendFailed("stub outage".to_string()));
            }
            Ok(match frame {
                Frame::Join(req) => Frame::JoinAck(JoinResponse {
                    message_id: req.message_id,
                    outcome: if self.reject_join.load(Ordering::SeqCst) {
                        JoinOutcome::Rejected {
                            reason: "namespace full".to_string(),
                        }
                    } else {
                        JoinOutcome::Granted {
                            node_id: NodeId::new("node-1"),
                            lease: self.lease,
                        }
                    },
                }),
                Frame::Renew(req) => {
                    self.renewals.fetch_add(1, Ordering::SeqCst);
                    Frame::RenewAck(RenewResponse {
                        message_id: req.message_id,
                        outcome: if self.lose_lease.load(Ordering::SeqCst) {
                            RenewOutcome::Lost {
                                reason: "evicted".to_string(),
                            }
                        } else {
                            RenewOutcome::Renewed { lease: self.lease }
                        },
                    })
                }
                Frame::Leave(req) => {
                    self.leaves.fetch_add(1, Ordering::SeqCst);
                    Frame::LeaveAck(LeaveResponse {
                        message_id: req.message_id,
                    })
                }
                other => {
                    return Err(TransportError::Protocol(format!(
                        "stub cannot answer {}",
                        other.kind()
                    )))
                }
            })
        }

        async fn open_stream(
            &self,
            _endpoint: &str,
            _node_id: &NodeId,
        ) -> Result<Arc<dyn MeshStream>, TransportError> {
            Err(TransportError::ConnectFailed("stub".to_string()))
        }
    }

    fn leaser_with(
        directory: Arc<StubDirectory>,
        clock: Arc<ManualClock>,
    ) -> (NodeLeaser, Arc<LocalNode>) {
        let local_node = Arc::new(LocalNode::new());
        let channel = Arc::new(DirectoryChannel::new(
            directory,
            "mesh".to_string(),
            Arc::new(MessageIds::new()),
        ));
        (
            NodeLeaser::new(channel, local_node.clone(), clock, 0.5),
            local_node,
        )
    }

    async fn connect(local_node: &LocalNode) {
        local_node.try_transition(ClientState::Connecting).await.unwrap();
        local_node.try_transition(ClientState::Connected).await.unwrap();
    }

    #[tokio::test]
    async fn test_join_writes_node_info() {
        let directory = Arc::new(StubDirectory::new(LeaseTerms::with_ttl(
            Duration::from_secs(10),
        )));
        let clock = Arc::new(ManualClock::new());
        let (leaser, local_node) = leaser_with(directory, clock);

        let info = leaser.join_cluster("default").await.unwrap();
        assert_eq!(info.id.as_str(), "node-1");

        let snapshot = local_node.snapshot().await;
        assert_eq!(snapshot.node_info.unwrap().id.as_str(), "node-1");
    }

    #[tokio::test]
    async fn test_join_rejection_surfaces() {
        let directory = Arc::new(StubDirectory::new(LeaseTerms::with_ttl(
            Duration::from_secs(10),
        )));
        directory.reject_join.store(true, Ordering::SeqCst);
        let clock = Arc::new(ManualClock::new());
        let (leaser, local_node) = leaser_with(directory, clock);

        let err = leaser.join_cluster("default").await.unwrap_err();
        assert!(matches!(err, ClientError::JoinRejected(_)));
        assert!(local_node.snapshot().await.node_info.is_none());
    }

    #[tokio::test]
    async fn test_tick_renews_when_due() {
        let directory = Arc::new(StubDirectory::new(LeaseTerms::new(
            Duration::from_secs(10),
            Duration::from_secs(4),
        )));
        let clock = Arc::new(ManualClock::new());
        let (leaser, local_node) = leaser_with(directory.clone(), clock.clone());
        leaser.join_cluster("default").await.unwrap();
        connect(&local_node).await;

        leaser.tick().await.unwrap();
        assert_eq!(directory.renewals.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_secs(5));
        leaser.tick().await.unwrap();
        assert_eq!(directory.renewals.load(Ordering::SeqCst), 1);

        // Renewal re-anchored the window, so the next tick is quiet again.
        leaser.tick().await.unwrap();
        assert_eq!(directory.renewals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lost_lease_raises_renewal_failed() {
        let directory = Arc::new(StubDirectory::new(LeaseTerms::new(
            Duration::from_secs(10),
            Duration::from_secs(2),
        )));
        let clock = Arc::new(ManualClock::new());
        let (leaser, local_node) = leaser_with(directory.clone(), clock.clone());
        leaser.join_cluster("default").await.unwrap();
        connect(&local_node).await;

        directory.lose_lease.store(true, Ordering::SeqCst);
        clock.advance(Duration::from_secs(3));
        let err = leaser.tick().await.unwrap_err();
        assert!(matches!(err, ClientError::NodeLeaseRenewalFailed));
    }

    #[tokio::test]
    async fn test_expiry_is_the_hard_bound() {
        let directory = Arc::new(StubDirectory::new(LeaseTerms::new(
            Duration::from_secs(4),
            Duration::from_secs(2),
        )));
        let clock = Arc::new(ManualClock::new());
        let (leaser, local_node) = leaser_with(directory.clone(), clock.clone());
        leaser.join_cluster("default").await.unwrap();
        connect(&local_node).await;

        // Transient channel outage while renewal is due: tolerated.
        directory.fail_channel.store(true, Ordering::SeqCst);
        clock.advance(Duration::from_secs(3));
        leaser.tick().await.unwrap();

        // Still down past expiry: fatal.
        clock.advance(Duration::from_secs(2));
        let err = leaser.tick().await.unwrap_err();
        assert!(matches!(err, ClientError::NodeLeaseRenewalFailed));
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let directory = Arc::new(StubDirectory::new(LeaseTerms::with_ttl(
            Duration::from_secs(10),
        )));
        let clock = Arc::new(ManualClock::new());
        let (leaser, _local_node) = leaser_with(directory.clone(), clock);

        // Never joined: no-op, no error.
        leaser.leave_cluster().await;
        assert_eq!(directory.leaves.load(Ordering::SeqCst), 0);

        leaser.join_cluster("default").await.unwrap();
        leaser.leave_cluster().await;
        leaser.leave_cluster().await;
        assert_eq!(directory.leaves.load(Ordering::SeqCst), 2);
    }
}
