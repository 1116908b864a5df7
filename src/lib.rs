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

//! PlexMesh: client-side runtime for a virtual-actor mesh
//!
//! Core design philosophy:
//! - Virtual actors: callers hold stable identities, never placements
//! - Leases everywhere: membership and routing rights are time-bounded
//!   and refreshed, never assumed
//! - One cooperative timeline: a single ticker drives renewal, timeouts,
//!   and deactivation sweeps
//!
//! The runtime is both a server (hosting activations the mesh routes to
//! this node) and a client (invoking remote actors through typed proxies).

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Independent crates - re-export them here
pub use plexmesh_client as client;
pub use plexmesh_core as core;
pub use plexmesh_mailbox as mailbox;

// Re-export the entry points for convenience
pub use client::{
    ActivationContext, Addressable, AddressableProxy, CapabilityScanner, DeactivationReason,
    Deactivator, InProcessMesh, MeshClient, MeshClientBuilder, MeshClientConfig, MeshStream,
    NoopDeactivator, Serializer, Transport,
};
pub use core::{
    AddressableReference, ClientError, ClientState, InterfaceId, InvocationError, Key,
    LeaseTerms, NodeId, NodeStatus, TransportError,
};
pub use mailbox::{Mailbox, MailboxConfig, Message};
