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

//! # Mesh Client Builder
//!
//! ## Purpose
//! Fluent construction of a [`MeshClient`] with sensible defaults.
//! Components are wired explicitly in dependency order; the override
//! setters (clock, serializer, transport, deactivator) are the testing
//! seam that a reflective container would otherwise provide.
//!
//! ## Examples
//! ```rust,ignore
//! let client = MeshClientBuilder::new()
//!     .with_namespace("shop")
//!     .with_transport(transport)
//!     .register_addressable("IGreeter", |_reference| Ok(Box::new(Greeter::default())))
//!     .build()?;
//! client.start().await?;
//! ```

use crate::capabilities::{
    Addressable, CapabilityScanner, Deactivator, DefinitionDirectory, NoopDeactivator,
};
use crate::client::{ClientInner, MeshClient, NodeLeaseRenewalFailedHandler};
use crate::config::MeshClientConfig;
use crate::connection::ConnectionHandler;
use crate::execution::{ExecutionConfig, ExecutionSystem};
use crate::invocation::{InvocationSystem, JsonSerializer, Serializer};
use crate::message_handler::MessageHandler;
use crate::metrics::ClientMetrics;
use crate::node_leaser::NodeLeaser;
use crate::addressable_leaser::AddressableLeaser;
use crate::ticker::Ticker;
use crate::transport::{DirectoryChannel, MessageIds, Transport};
use plexmesh_core::{
    AddressableReference, ClientError, Clock, InterfaceId, LocalNode, SystemClock,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Builder for [`MeshClient`].
pub struct MeshClientBuilder {
    config: MeshClientConfig,
    scanner: CapabilityScanner,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    serializer: Option<Arc<dyn Serializer>>,
    deactivator: Option<Arc<dyn Deactivator>>,
    lease_failure_handler: Option<NodeLeaseRenewalFailedHandler>,
}

impl MeshClientBuilder {
    /// Builder with default configuration.
    pub fn new() -> Self {
        MeshClientBuilder {
            config: MeshClientConfig::default(),
            scanner: CapabilityScanner::new(),
            transport: None,
            clock: None,
            serializer: None,
            deactivator: None,
            lease_failure_handler: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: MeshClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the logical partition advertised to the mesh.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Set the mesh directory address.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Set the actor-dispatch worker pool size.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.config.pool_size = pool_size;
        self
    }

    /// Set the cooperative tick rate.
    pub fn with_tick_rate(mut self, tick_rate: Duration) -> Self {
        self.config.tick_rate = tick_rate;
        self
    }

    /// Set the cluster join retry policy.
    pub fn with_join_policy(mut self, attempts: u32, delay: Duration) -> Self {
        self.config.join_attempts = attempts;
        self.config.join_delay = delay;
        self
    }

    /// Set the idle timeout for host-side activations.
    pub fn with_addressable_ttl(mut self, ttl: Duration) -> Self {
        self.config.addressable_ttl = ttl;
        self
    }

    /// Set the lease fraction that should remain when renewal starts.
    pub fn with_lease_renewal_margin(mut self, margin: f64) -> Self {
        self.config.lease_renewal_margin = margin;
        self
    }

    /// Set the default deadline for outbound invocations.
    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.config.invocation_timeout = timeout;
        self
    }

    /// Set the upper bound on the `stop()` drain.
    pub fn with_stop_deadline(mut self, deadline: Duration) -> Self {
        self.config.stop_deadline = deadline;
        self
    }

    /// Register a hostable interface with its constructor.
    pub fn register_addressable<F>(
        mut self,
        interface: impl Into<InterfaceId>,
        constructor: F,
    ) -> Self
    where
        F: Fn(&AddressableReference) -> Result<Box<dyn Addressable>, ClientError>
            + Send
            + Sync
            + 'static,
    {
        self.scanner.register(interface, constructor);
        self
    }

    /// Supply the transport. Required: the message transport is an
    /// external collaborator.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override the monotonic clock (testing seam).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Override the payload serializer.
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Install the host deactivation callback.
    pub fn with_deactivator(mut self, deactivator: Arc<dyn Deactivator>) -> Self {
        self.deactivator = Some(deactivator);
        self
    }

    /// Install the handler fired when the node lease is irrecoverably
    /// lost. Typical handlers trigger process-level remediation.
    pub fn on_node_lease_renewal_failed<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.lease_failure_handler = Some(Arc::new(handler));
        self
    }

    /// Wire the components in dependency order and build the client.
    ///
    /// ## Errors
    /// [`ClientError::Configuration`] when no transport was supplied.
    pub fn build(self) -> Result<MeshClient, ClientError> {
        let transport = self.transport.ok_or_else(|| {
            ClientError::Configuration(
                "a transport is required; supply one with with_transport()".to_string(),
            )
        })?;
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let serializer: Arc<dyn Serializer> =
            self.serializer.unwrap_or_else(|| Arc::new(JsonSerializer));
        let deactivator: Arc<dyn Deactivator> = self
            .deactivator
            .unwrap_or_else(|| Arc::new(NoopDeactivator));
        let config = self.config;

        let metrics = Arc::new(ClientMetrics::new());
        let local_node = Arc::new(LocalNode::new());
        let ids = Arc::new(MessageIds::new());
        let directory = Arc::new(DirectoryChannel::new(
            transport.clone(),
            config.endpoint.clone(),
            ids.clone(),
        ));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let definitions = Arc::new(DefinitionDirectory::new());
        let message_handler = Arc::new(MessageHandler::new(
            ids,
            outbound_tx.clone(),
            local_node.clone(),
            clock.clone(),
            metrics.clone(),
        ));
        let node_leaser = Arc::new(NodeLeaser::new(
            directory.clone(),
            local_node.clone(),
            clock.clone(),
            config.lease_renewal_margin,
        ));
        let addressable_leaser = AddressableLeaser::new(
            directory,
            local_node.clone(),
            clock.clone(),
            config.lease_renewal_margin,
        );
        let execution = Arc::new(ExecutionSystem::new(
            ExecutionConfig {
                pool_size: config.pool_size,
                addressable_ttl: config.addressable_ttl,
                stop_deadline: config.stop_deadline,
                mailbox_capacity: config.mailbox_capacity,
            },
            definitions.clone(),
            addressable_leaser.clone(),
            serializer.clone(),
            outbound_tx,
            clock.clone(),
            deactivator,
            metrics.clone(),
        ));
        let invocations = Arc::new(InvocationSystem::new(
            serializer,
            message_handler.clone(),
            execution.clone(),
            addressable_leaser.clone(),
            config.invocation_timeout,
        ));
        let connection = Arc::new(ConnectionHandler::new(
            transport,
            config.endpoint.clone(),
            local_node.clone(),
            clock,
            message_handler.clone(),
            invocations.clone(),
            metrics.clone(),
            outbound_rx,
        ));

        Ok(MeshClient::from_inner(Arc::new(ClientInner {
            config,
            local_node,
            scanner: self.scanner,
            definitions,
            node_leaser,
            addressable_leaser,
            message_handler,
            execution,
            invocations,
            connection,
            ticker: Ticker::new(),
            metrics,
            lease_failure_handler: self.lease_failure_handler,
            lease_failure_fired: AtomicBool::new(false),
            stopping_guard: AtomicBool::new(false),
            stop_report: Mutex::new(None),
        })))
    }
}

impl Default for MeshClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
