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

//! Error taxonomy for the mesh client
//!
//! ## Propagation policy
//! Transient transport errors are recovered inside the component owning the
//! resource (the connection handler reconnects). Invocation-level errors
//! travel the normal response path back to the caller. Lifecycle-fatal
//! errors ([`ClientError::NodeLeaseRenewalFailed`]) transition the client
//! state machine and invoke host hooks. Nothing unwinds the ticker except
//! the lease-fatal path.

use crate::client_state::StateTransitionError;

/// Transient or terminal failures at the transport boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Could not establish a connection or stream.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The message stream closed underneath us.
    #[error("message stream closed")]
    StreamClosed,

    /// A frame could not be written.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The peer answered with a frame the protocol does not allow here.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// An operation required a live channel before the client connected.
    #[error("not connected to the mesh")]
    NotConnected,
}

/// Payload could not be encoded or decoded.
#[derive(Debug, Clone, thiserror::Error)]
#[error("serialization error: {0}")]
pub struct SerializationError(pub String);

/// Errors surfaced to invocation callers.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    /// Deadline expired before a response arrived.
    ///
    /// ## Context
    /// The pending call was completed by the timeout sweep; a response
    /// arriving later is dropped as stray.
    #[error("invocation timed out. Hint: the target may be overloaded or unreachable; consider a larger deadline.")]
    Timeout,

    /// Error originating at the remote actor, kind tag preserved.
    #[error("remote error [{kind}]: {message}")]
    Remote {
        /// Kind tag from the remote side.
        kind: String,
        /// Remote error message.
        message: String,
    },

    /// Argument or result payload was malformed.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// Transport failure before the deadline could even be armed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The target activation was deactivated while this message waited.
    #[error("activation gone: {0}")]
    ActivationGone(String),

    /// The target activation could not be constructed.
    #[error("activation failed: {0}")]
    ActivationFailed(String),

    /// The mesh refused to grant a routing lease for the target.
    #[error("lease denied for {reference}: {reason}")]
    LeaseDenied {
        /// Display form of the target reference.
        reference: String,
        /// Directory-provided reason.
        reason: String,
    },
}

impl InvocationError {
    /// Stable kind tag carried in the wire response for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            InvocationError::Timeout => "timeout",
            InvocationError::Remote { .. } => "remote",
            InvocationError::Serialization(_) => "serialization",
            InvocationError::Transport(_) => "transport",
            InvocationError::ActivationGone(_) => "activation_gone",
            InvocationError::ActivationFailed(_) => "activation_failed",
            InvocationError::LeaseDenied { .. } => "lease_denied",
        }
    }
}

/// Lifecycle errors surfaced by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Operation not legal in the current lifecycle state.
    #[error("invalid client state: {0}")]
    InvalidState(String),

    /// The mesh refused a single join attempt.
    #[error("cluster join rejected: {0}")]
    JoinRejected(String),

    /// Join retries exhausted; the node was reset to idle.
    #[error("cluster join failed after {attempts} attempts. Hint: verify the mesh endpoint and namespace, and that the directory is reachable.")]
    ClusterJoinFailed {
        /// Number of attempts made.
        attempts: u32,
    },

    /// The node lease was lost and could not be renewed before expiry.
    #[error("node lease renewal failed; membership is no longer valid")]
    NodeLeaseRenewalFailed,

    /// Client was built with inconsistent or missing options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Capability definitions were installed twice.
    #[error("definitions already initialized; setup is single-shot")]
    DefinitionsAlreadyInitialized,

    /// Two registrations claimed the same interface.
    #[error("duplicate addressable registration for interface {0}")]
    DuplicateRegistration(String),

    /// Transport failure during a lifecycle operation.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<StateTransitionError> for ClientError {
    fn from(e: StateTransitionError) -> Self {
        ClientError::InvalidState(e.to_string())
    }
}
