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

//! Core types for the PlexMesh client runtime
//!
//! This crate contains the fundamental types shared between the client
//! modules: the node-level state machine, addressable identities, lease
//! records, the wire frames exchanged with the mesh directory, the error
//! taxonomy, and the injectable clock.
//!
//! The client crate builds the runtime proper on top of these types; they
//! live here to break circular dependencies between the lifecycle modules.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod addressable;
pub mod client_state;
pub mod error;
pub mod lease;
pub mod local_node;
pub mod time;
pub mod wire;

pub use addressable::{AddressableReference, InterfaceId, Key};
pub use client_state::{ClientState, StateTransitionError};
pub use error::{ClientError, InvocationError, SerializationError, TransportError};
pub use lease::{AddressableLease, LeaseTerms, LeaseWindow};
pub use local_node::{LocalNode, NodeId, NodeInfo, NodeStatus};
pub use time::{Clock, ManualClock, SystemClock};
pub use wire::{
    AddressableLeaseOutcome, AddressableLeaseRequest, AddressableLeaseResponse, Frame,
    InvocationFrame, InvocationOutcome, InvocationResultFrame, JoinOutcome, JoinRequest,
    JoinResponse, LeaveRequest, LeaveResponse, RenewOutcome, RenewRequest, RenewResponse,
};
