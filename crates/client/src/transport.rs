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

//! Transport boundary
//!
//! ## Purpose
//! The message transport is an external collaborator. The client only
//! assumes two capabilities: unary request/response exchanges with the
//! directory (join, renew, leave, addressable leases) and a bidirectional
//! framed stream for invocations, opened after join. [`DirectoryChannel`]
//! wraps the unary side with message-id correlation and frame-shape
//! validation so the leasers stay free of transport plumbing.

use async_trait::async_trait;
use chrono::Utc;
use plexmesh_core::wire::{
    AddressableLeaseOutcome, AddressableLeaseRequest, Frame, JoinOutcome, JoinRequest,
    LeaveRequest, RenewOutcome, RenewRequest,
};
use plexmesh_core::{AddressableReference, InterfaceId, NodeId, TransportError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Bidirectional framed stream to the mesh.
#[async_trait]
pub trait MeshStream: Send + Sync {
    /// Write one frame. Order is preserved within this stream.
    async fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Read the next inbound frame; `None` once the stream has closed.
    async fn recv(&self) -> Option<Frame>;

    /// Close the stream. Subsequent sends fail; pending reads end.
    async fn close(&self);
}

/// Connection factory for the mesh.
#[async_trait]
pub trait Transport: Send + Sync {
    /// One-shot request/response exchange with the directory.
    async fn request(&self, endpoint: &str, frame: Frame) -> Result<Frame, TransportError>;

    /// Open the bidirectional message stream for a joined node.
    async fn open_stream(
        &self,
        endpoint: &str,
        node_id: &NodeId,
    ) -> Result<Arc<dyn MeshStream>, TransportError>;
}

/// Process-wide monotone message-id source.
///
/// Ids are unique within the process lifetime; both the directory channel
/// and the message handler draw from the same sequence.
#[derive(Debug, Default)]
pub struct MessageIds(AtomicU64);

impl MessageIds {
    /// New source starting at 1.
    pub fn new() -> Self {
        MessageIds(AtomicU64::new(0))
    }

    /// Next id.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Unary directory RPCs with correlation checks.
pub struct DirectoryChannel {
    transport: Arc<dyn Transport>,
    endpoint: String,
    ids: Arc<MessageIds>,
}

impl DirectoryChannel {
    /// Create a channel to the directory at `endpoint`.
    pub fn new(transport: Arc<dyn Transport>, endpoint: String, ids: Arc<MessageIds>) -> Self {
        DirectoryChannel {
            transport,
            endpoint,
            ids,
        }
    }

    /// Issue a cluster join advertising `capabilities`.
    pub async fn join(
        &self,
        namespace: &str,
        capabilities: Vec<InterfaceId>,
    ) -> Result<JoinOutcome, TransportError> {
        let message_id = self.ids.next();
        let request = Frame::Join(JoinRequest {
            message_id,
            namespace: namespace.to_string(),
            capabilities,
            timestamp: Utc::now(),
        });
        match self.transport.request(&self.endpoint, request).await? {
            Frame::JoinAck(response) if response.message_id == message_id => Ok(response.outcome),
            other => Err(Self::unexpected("join", &other)),
        }
    }

    /// Renew the node membership lease.
    pub async fn renew(&self, node_id: &NodeId) -> Result<RenewOutcome, TransportError> {
        let message_id = self.ids.next();
        let request = Frame::Renew(RenewRequest {
            message_id,
            node_id: node_id.clone(),
        });
        match self.transport.request(&self.endpoint, request).await? {
            Frame::RenewAck(response) if response.message_id == message_id => Ok(response.outcome),
            other => Err(Self::unexpected("renew", &other)),
        }
    }

    /// Announce departure. The directory always acknowledges.
    pub async fn leave(&self, node_id: &NodeId) -> Result<(), TransportError> {
        let message_id = self.ids.next();
        let request = Frame::Leave(LeaveRequest {
            message_id,
            node_id: node_id.clone(),
        });
        match self.transport.request(&self.endpoint, request).await? {
            Frame::LeaveAck(response) if response.message_id == message_id => Ok(()),
            other => Err(Self::unexpected("leave", &other)),
        }
    }

    /// Request a lease for routing to (or hosting) `reference`.
    pub async fn lease(
        &self,
        node_id: &NodeId,
        reference: &AddressableReference,
    ) -> Result<AddressableLeaseOutcome, TransportError> {
        let message_id = self.ids.next();
        let request = Frame::Lease(AddressableLeaseRequest {
            message_id,
            node_id: node_id.clone(),
            reference: reference.clone(),
        });
        match self.transport.request(&self.endpoint, request).await? {
            Frame::LeaseAck(response) if response.message_id == message_id => Ok(response.outcome),
            other => Err(Self::unexpected("lease", &other)),
        }
    }

    fn unexpected(operation: &str, frame: &Frame) -> TransportError {
        TransportError::Protocol(format!(
            "unexpected {} frame in response to {}",
            frame.kind(),
            operation
        ))
    }
}
