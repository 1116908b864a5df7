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

//! Client configuration
//!
//! Pure data; behavioral hooks (clock, transport, serializer, deactivator,
//! lease-failure handler) are builder fields so the config stays
//! serializable.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options recognized by the mesh client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshClientConfig {
    /// Logical partition advertised to the mesh.
    pub namespace: String,
    /// Mesh directory address handed to the transport.
    pub endpoint: String,
    /// Worker pool size for actor dispatch.
    pub pool_size: usize,
    /// Duration between cooperative ticks.
    pub tick_rate: Duration,
    /// Cluster join retry attempts.
    pub join_attempts: u32,
    /// Delay between join attempts.
    pub join_delay: Duration,
    /// Idle timeout for host-side activations.
    pub addressable_ttl: Duration,
    /// Fraction of a lease's duration that should still remain when
    /// renewal starts, for leases whose terms leave the margin to the
    /// client. 0.5 renews at half-life.
    pub lease_renewal_margin: f64,
    /// Default deadline for outbound invocations.
    pub invocation_timeout: Duration,
    /// Upper bound on the `stop()` drain.
    pub stop_deadline: Duration,
    /// Mailbox capacity per activation.
    pub mailbox_capacity: usize,
}

impl Default for MeshClientConfig {
    fn default() -> Self {
        MeshClientConfig {
            namespace: "default".to_string(),
            endpoint: "http://127.0.0.1:9000".to_string(),
            pool_size: 16,
            tick_rate: Duration::from_secs(1),
            join_attempts: 60,
            join_delay: Duration::from_secs(1),
            addressable_ttl: Duration::from_secs(600),
            lease_renewal_margin: 0.5,
            invocation_timeout: Duration::from_secs(30),
            stop_deadline: Duration::from_secs(30),
            mailbox_capacity: 10_000,
        }
    }
}
