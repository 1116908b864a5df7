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

//! PlexMesh client runtime
//!
//! A process embedding this runtime participates in a virtual-actor mesh:
//! it advertises the actor interfaces it can host, leases a node identity
//! from the directory, accepts inbound invocations routed to it, and issues
//! outbound invocations through typed proxies. Actors are virtual: callers
//! reference them by stable identity, the mesh activates instances on
//! demand and deactivates them when idle.
//!
//! ## Entry point
//! ```rust,ignore
//! let client = MeshClientBuilder::new()
//!     .with_namespace("shop")
//!     .with_transport(transport)
//!     .register_addressable("IGreeter", |_r| Ok(Box::new(Greeter::default())))
//!     .build()?;
//! client.start().await?;
//! let greeting: String = client.proxy("IGreeter", "a").invoke("hello", &("x",)).await?;
//! client.stop().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod addressable_leaser;
pub mod builder;
pub mod capabilities;
pub mod client;
pub mod config;
pub mod connection;
pub mod execution;
pub mod invocation;
pub mod message_handler;
pub mod metrics;
pub mod node_leaser;
pub mod proxy;
pub mod testing;
pub mod ticker;
pub mod tracing_setup;
pub mod transport;

pub use addressable_leaser::AddressableLeaser;
pub use builder::MeshClientBuilder;
pub use capabilities::{
    ActivationContext, Addressable, AddressableConstructor, CapabilityScanner,
    DeactivationReason, Deactivator, DefinitionDirectory, NoopDeactivator, ScanResult,
};
pub use client::{MeshClient, NodeLeaseRenewalFailedHandler, StopPhase, StopReport};
pub use config::MeshClientConfig;
pub use connection::ConnectionHandler;
pub use execution::{ActivationState, ExecutionConfig, ExecutionSystem};
pub use invocation::{InvocationSystem, JsonSerializer, Serializer};
pub use message_handler::MessageHandler;
pub use metrics::{ClientMetrics, ClientMetricsSnapshot};
pub use node_leaser::NodeLeaser;
pub use proxy::AddressableProxy;
pub use testing::InProcessMesh;
pub use ticker::{TickHandler, TickOutcome, Ticker};
pub use tracing_setup::init_tracing;
pub use transport::{DirectoryChannel, MeshStream, MessageIds, Transport};

// Re-export the core data model for convenience.
pub use plexmesh_core::{
    AddressableLease, AddressableReference, ClientError, ClientState, Clock, InterfaceId,
    InvocationError, Key, LeaseTerms, LeaseWindow, LocalNode, ManualClock, NodeId, NodeInfo,
    NodeStatus, SerializationError, SystemClock, TransportError,
};
pub use plexmesh_mailbox::{Mailbox, MailboxConfig, MailboxError, Message};
