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

//! Wire frames exchanged with the mesh directory
//!
//! ## Purpose
//! The transport is an external collaborator; this module only fixes the
//! boundary contract. Every request frame carries a `message_id` generated
//! locally (monotone, unique within the process lifetime) and the
//! correlating response echoes it. The client tolerates reordering between
//! distinct message ids; within one outbound pipeline the transport
//! preserves frame order.
//!
//! Join/renew/leave and addressable-lease frames travel over the unary
//! directory channel; invocation frames travel over the bidirectional
//! message stream opened after join.

use crate::addressable::{AddressableReference, InterfaceId};
use crate::lease::LeaseTerms;
use crate::local_node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to join the cluster, advertising hostable interfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Correlation id.
    pub message_id: u64,
    /// Logical partition this client joins.
    pub namespace: String,
    /// Interfaces this node is willing to host.
    pub capabilities: Vec<InterfaceId>,
    /// Client wall-clock send time, informational only.
    pub timestamp: DateTime<Utc>,
}

/// Directory verdict on a join request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JoinOutcome {
    /// Admitted; identity and lease terms follow.
    Granted {
        /// Assigned node identity.
        node_id: NodeId,
        /// Membership lease terms.
        lease: LeaseTerms,
    },
    /// Refused.
    Rejected {
        /// Directory-provided reason.
        reason: String,
    },
}

/// Response to [`JoinRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinResponse {
    /// Echoed correlation id.
    pub message_id: u64,
    /// Verdict.
    pub outcome: JoinOutcome,
}

/// Request to renew the node membership lease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewRequest {
    /// Correlation id.
    pub message_id: u64,
    /// Node whose lease is renewed.
    pub node_id: NodeId,
}

/// Directory verdict on a renewal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenewOutcome {
    /// Lease extended under fresh terms.
    Renewed {
        /// New lease terms.
        lease: LeaseTerms,
    },
    /// Lease is gone; the node must stop.
    Lost {
        /// Directory-provided reason.
        reason: String,
    },
}

/// Response to [`RenewRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewResponse {
    /// Echoed correlation id.
    pub message_id: u64,
    /// Verdict.
    pub outcome: RenewOutcome,
}

/// Best-effort notice that the node is leaving the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    /// Correlation id.
    pub message_id: u64,
    /// Departing node.
    pub node_id: NodeId,
}

/// Acknowledgement of [`LeaveRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveResponse {
    /// Echoed correlation id.
    pub message_id: u64,
}

/// Request for the right to route to (or host) an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressableLeaseRequest {
    /// Correlation id.
    pub message_id: u64,
    /// Requesting node.
    pub node_id: NodeId,
    /// Actor the lease covers.
    pub reference: AddressableReference,
}

/// Directory verdict on an addressable lease request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AddressableLeaseOutcome {
    /// Lease granted.
    Granted {
        /// Node currently hosting the actor.
        owner: NodeId,
        /// Lease terms.
        lease: LeaseTerms,
    },
    /// Lease denied.
    Denied {
        /// Directory-provided reason.
        reason: String,
    },
}

/// Response to [`AddressableLeaseRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressableLeaseResponse {
    /// Echoed correlation id.
    pub message_id: u64,
    /// Verdict.
    pub outcome: AddressableLeaseOutcome,
}

/// An actor method invocation in flight through the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationFrame {
    /// Correlation id, echoed by the result frame.
    pub message_id: u64,
    /// Node that issued the call, absent for directory-originated traffic.
    pub source: Option<NodeId>,
    /// Target actor.
    pub target: AddressableReference,
    /// Method name on the target interface.
    pub method: String,
    /// Serialized arguments.
    pub args: Vec<u8>,
    /// Remaining deadline budget in milliseconds at send time.
    pub budget_ms: u64,
    /// Client wall-clock send time, informational only.
    pub timestamp: DateTime<Utc>,
}

/// Result payload of an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InvocationOutcome {
    /// Serialized return value.
    Ok(Vec<u8>),
    /// Error raised by the remote side, kind tag preserved.
    Err {
        /// Stable error kind tag.
        kind: String,
        /// Human-readable message.
        message: String,
    },
}

/// Response correlating to an [`InvocationFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResultFrame {
    /// Echoed correlation id.
    pub message_id: u64,
    /// Result payload.
    pub outcome: InvocationOutcome,
}

/// Any frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    /// Cluster join request.
    Join(JoinRequest),
    /// Cluster join response.
    JoinAck(JoinResponse),
    /// Node lease renewal request.
    Renew(RenewRequest),
    /// Node lease renewal response.
    RenewAck(RenewResponse),
    /// Cluster leave request.
    Leave(LeaveRequest),
    /// Cluster leave response.
    LeaveAck(LeaveResponse),
    /// Addressable lease request.
    Lease(AddressableLeaseRequest),
    /// Addressable lease response.
    LeaseAck(AddressableLeaseResponse),
    /// Actor invocation.
    Invocation(InvocationFrame),
    /// Actor invocation result.
    InvocationResult(InvocationResultFrame),
}

impl Frame {
    /// Correlation id carried by this frame.
    pub fn message_id(&self) -> u64 {
        match self {
            Frame::Join(f) => f.message_id,
            Frame::JoinAck(f) => f.message_id,
            Frame::Renew(f) => f.message_id,
            Frame::RenewAck(f) => f.message_id,
            Frame::Leave(f) => f.message_id,
            Frame::LeaveAck(f) => f.message_id,
            Frame::Lease(f) => f.message_id,
            Frame::LeaseAck(f) => f.message_id,
            Frame::Invocation(f) => f.message_id,
            Frame::InvocationResult(f) => f.message_id,
        }
    }

    /// Short frame kind for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Join(_) => "join",
            Frame::JoinAck(_) => "join_ack",
            Frame::Renew(_) => "renew",
            Frame::RenewAck(_) => "renew_ack",
            Frame::Leave(_) => "leave",
            Frame::LeaveAck(_) => "leave_ack",
            Frame::Lease(_) => "lease",
            Frame::LeaseAck(_) => "lease_ack",
            Frame::Invocation(_) => "invocation",
            Frame::InvocationResult(_) => "invocation_result",
        }
    }

    /// Encode for a byte-oriented transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, crate::SerializationError> {
        serde_json::to_vec(self).map_err(|e| crate::SerializationError(e.to_string()))
    }

    /// Decode from a byte-oriented transport.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::SerializationError> {
        serde_json::from_slice(bytes).map_err(|e| crate::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_invocation_frame_round_trip() {
        let frame = Frame::Invocation(InvocationFrame {
            message_id: 42,
            source: Some(NodeId::new("node-1")),
            target: AddressableReference::new("IGreeter", "a"),
            method: "hello".to_string(),
            args: b"[\"x\"]".to_vec(),
            budget_ms: 500,
            timestamp: Utc::now(),
        });

        let bytes = frame.to_bytes().unwrap();
        let decoded = Frame::from_bytes(&bytes).unwrap();
        assert_eq!(frame, decoded);
        assert_eq!(decoded.message_id(), 42);
        assert_eq!(decoded.kind(), "invocation");
    }

    #[test]
    fn test_join_outcome_round_trip() {
        let frame = Frame::JoinAck(JoinResponse {
            message_id: 7,
            outcome: JoinOutcome::Granted {
                node_id: NodeId::new("node-9"),
                lease: LeaseTerms::with_ttl(Duration::from_secs(10)),
            },
        });

        let decoded = Frame::from_bytes(&frame.to_bytes().unwrap()).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_malformed_bytes_are_a_serialization_error() {
        let err = Frame::from_bytes(b"not a frame").unwrap_err();
        assert!(err.to_string().contains("serialization error"));
    }
}
