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

//! Execution system: activation registry, mailboxes, deactivation sweep
//!
//! ## Purpose
//! Hosts the actors this node serves. An inbound invocation activates the
//! target on demand (constructor from the definition directory), then lands
//! on the activation's mailbox. One pump task per activation drains the
//! mailbox one message at a time through a bounded worker pool, which is
//! the per-actor serialization guarantee: the actor instance never sees two
//! messages concurrently, and message order matches enqueue order.
//!
//! ## Lifecycle
//! ```text
//!   [ACTIVATING] --construct ok--> [ACTIVE] --idle/stop--> [DEACTIVATING] --> [DEACTIVATED]
//!         |                                                     ^
//!         +-- construct fail --> [DEACTIVATED] (ActivationFailed)
//! ```
//! The per-tick sweep deactivates activations that sat idle past the
//! addressable TTL or whose execution lease could not be renewed. `stop()`
//! drains everything, bounded by the stop deadline.

use crate::addressable_leaser::AddressableLeaser;
use crate::capabilities::{
    ActivationContext, Addressable, AddressableConstructor, DeactivationReason, Deactivator,
};
use crate::capabilities::DefinitionDirectory;
use crate::invocation::Serializer;
use crate::metrics::ClientMetrics;
use plexmesh_core::wire::{Frame, InvocationFrame, InvocationOutcome, InvocationResultFrame};
use plexmesh_core::{AddressableReference, Clock, InvocationError};
use plexmesh_mailbox::{Mailbox, MailboxConfig, Message};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Lifecycle state of one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    /// Constructor running; not yet accepting dispatch.
    Activating,
    /// Serving messages.
    Active,
    /// Draining; mailbox closed, current message finishing.
    Deactivating,
    /// Gone; entry removed from the registry.
    Deactivated,
}

/// View over the addressable leases held for locally hosted actors.
///
/// The mesh requires the host to retain the right to serve an actor; this
/// is the same cache the outbound path uses, scoped to the execution
/// system's needs.
pub struct ExecutionLeases {
    leaser: AddressableLeaser,
}

impl ExecutionLeases {
    /// Wrap the shared leaser.
    pub fn new(leaser: AddressableLeaser) -> Self {
        ExecutionLeases { leaser }
    }

    /// Hold a lease for a newly activated actor.
    pub async fn ensure(&self, reference: &AddressableReference) -> Result<(), InvocationError> {
        self.leaser.resolve(reference).await.map(|_| ())
    }

    /// Renew the lease when its window says so.
    pub async fn renew_if_due(
        &self,
        reference: &AddressableReference,
        now: Instant,
    ) -> Result<(), InvocationError> {
        self.leaser.renew_if_due(reference, now).await
    }

    /// Release the local cache entry after deactivation.
    pub async fn release(&self, reference: &AddressableReference) {
        self.leaser.evict(reference).await;
    }
}

/// Execution system configuration.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Worker pool size bounding concurrent actor dispatch.
    pub pool_size: usize,
    /// Idle timeout after which an activation is swept.
    pub addressable_ttl: Duration,
    /// Upper bound on the `stop()` drain.
    pub stop_deadline: Duration,
    /// Mailbox capacity per activation.
    pub mailbox_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            pool_size: 16,
            addressable_ttl: Duration::from_secs(600),
            stop_deadline: Duration::from_secs(30),
            mailbox_capacity: 10_000,
        }
    }
}

struct ActivationEntry {
    reference: AddressableReference,
    instance_id: Ulid,
    state: Mutex<ActivationState>,
    last_touched: Mutex<Instant>,
    mailbox: Arc<Mailbox>,
    pump: Mutex<Option<JoinHandle<Box<dyn Addressable>>>>,
}

/// Activation registry and dispatch engine.
pub struct ExecutionSystem {
    activations: RwLock<HashMap<AddressableReference, Arc<ActivationEntry>>>,
    definitions: Arc<DefinitionDirectory>,
    leases: ExecutionLeases,
    serializer: Arc<dyn Serializer>,
    outbound: mpsc::UnboundedSender<Frame>,
    pool: Arc<Semaphore>,
    clock: Arc<dyn Clock>,
    config: ExecutionConfig,
    deactivator: Arc<dyn Deactivator>,
    metrics: Arc<ClientMetrics>,
    stopping: AtomicBool,
}

impl ExecutionSystem {
    /// Build the execution system.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ExecutionConfig,
        definitions: Arc<DefinitionDirectory>,
        leaser: AddressableLeaser,
        serializer: Arc<dyn Serializer>,
        outbound: mpsc::UnboundedSender<Frame>,
        clock: Arc<dyn Clock>,
        deactivator: Arc<dyn Deactivator>,
        metrics: Arc<ClientMetrics>,
    ) -> Self {
        ExecutionSystem {
            activations: RwLock::new(HashMap::new()),
            definitions,
            leases: ExecutionLeases::new(leaser),
            serializer,
            outbound,
            pool: Arc::new(Semaphore::new(config.pool_size.max(1))),
            clock,
            config,
            deactivator,
            metrics,
            stopping: AtomicBool::new(false),
        }
    }

    /// Route one inbound invocation onto its activation's mailbox,
    /// activating on demand. Failures are answered through the response
    /// path; this method never raises to the connection pump.
    pub async fn enqueue(&self, frame: InvocationFrame) {
        if self.stopping.load(Ordering::Acquire) {
            self.reply_error(
                frame.message_id,
                &InvocationError::ActivationGone(frame.target.to_string()),
            );
            return;
        }

        let entry = {
            let activations = self.activations.read().await;
            activations.get(&frame.target).cloned()
        };
        let entry = match entry {
            Some(entry) => entry,
            None => match self.activate(&frame.target).await {
                Ok(entry) => entry,
                Err(err) => {
                    self.metrics.record_activation_failure();
                    warn!(reference = %frame.target, error = %err, "activation failed");
                    self.reply_error(frame.message_id, &err);
                    return;
                }
            },
        };

        let message = Message::new(frame.message_id, frame.method, frame.args);
        match entry.mailbox.enqueue(message).await {
            Ok(()) => {
                *entry.last_touched.lock().await = self.clock.now();
            }
            Err(err) => {
                debug!(reference = %frame.target, error = %err, "mailbox rejected message");
                self.reply_error(
                    frame.message_id,
                    &InvocationError::ActivationGone(frame.target.to_string()),
                );
            }
        }
    }

    /// Deactivation sweep plus execution-lease upkeep, run once per tick.
    pub async fn tick(&self) {
        if self.stopping.load(Ordering::Acquire) {
            return;
        }
        let now = self.clock.now();
        let entries: Vec<Arc<ActivationEntry>> =
            self.activations.read().await.values().cloned().collect();

        for entry in entries {
            if *entry.state.lock().await != ActivationState::Active {
                continue;
            }
            let idle = now.duration_since(*entry.last_touched.lock().await);
            let reason = if idle >= self.config.addressable_ttl {
                Some(DeactivationReason::Idle)
            } else {
                match self.leases.renew_if_due(&entry.reference, now).await {
                    Ok(()) => None,
                    Err(err) => {
                        warn!(reference = %entry.reference, error = %err, "execution lease renewal failed");
                        Some(DeactivationReason::LeaseLost)
                    }
                }
            };
            if let Some(reason) = reason {
                self.deactivate_with(entry, reason, self.deactivator.clone())
                    .await;
            }
        }
    }

    /// Drain every activation, bounded by the stop deadline.
    ///
    /// Returns the number of activations abandoned at the deadline.
    pub async fn stop(&self, deactivator: Option<Arc<dyn Deactivator>>) -> usize {
        self.stopping.store(true, Ordering::Release);
        let entries: Vec<Arc<ActivationEntry>> =
            self.activations.read().await.values().cloned().collect();
        if entries.is_empty() {
            return 0;
        }
        info!(count = entries.len(), "draining activations");

        let deactivator = deactivator.unwrap_or_else(|| self.deactivator.clone());
        let drain = futures::future::join_all(entries.into_iter().map(|entry| {
            self.deactivate_with(entry, DeactivationReason::Stopping, deactivator.clone())
        }));

        if tokio::time::timeout(self.config.stop_deadline, drain)
            .await
            .is_err()
        {
            let abandoned = self.activations.read().await.len();
            warn!(abandoned, "stop deadline elapsed; abandoning remaining activations");
            self.activations.write().await.clear();
            return abandoned;
        }
        0
    }

    /// Number of live activations.
    pub async fn activation_count(&self) -> usize {
        self.activations.read().await.len()
    }

    /// State of the activation for `reference`, if present.
    pub async fn activation_state(
        &self,
        reference: &AddressableReference,
    ) -> Option<ActivationState> {
        let entry = self.activations.read().await.get(reference).cloned()?;
        let state = *entry.state.lock().await;
        Some(state)
    }

    async fn activate(
        &self,
        reference: &AddressableReference,
    ) -> Result<Arc<ActivationEntry>, InvocationError> {
        let constructor = self.definitions.lookup(&reference.interface).await.ok_or_else(|| {
            InvocationError::ActivationFailed(format!(
                "interface {} is not hosted by this node",
                reference.interface
            ))
        })?;

        // Take the registry slot first so concurrent activations of the
        // same reference collapse onto one entry.
        let entry = {
            let mut activations = self.activations.write().await;
            if let Some(existing) = activations.get(reference) {
                return Ok(existing.clone());
            }
            let entry = Arc::new(ActivationEntry {
                reference: reference.clone(),
                instance_id: Ulid::new(),
                state: Mutex::new(ActivationState::Activating),
                last_touched: Mutex::new(self.clock.now()),
                mailbox: Arc::new(Mailbox::new(
                    MailboxConfig {
                        capacity: self.config.mailbox_capacity,
                    },
                    reference.to_string(),
                )),
                pump: Mutex::new(None),
            });
            activations.insert(reference.clone(), entry.clone());
            entry
        };

        match self.construct_and_start(constructor, &entry).await {
            Ok(()) => Ok(entry),
            Err(err) => {
                *entry.state.lock().await = ActivationState::Deactivated;
                entry.mailbox.close().await;
                self.activations.write().await.remove(reference);
                Err(err)
            }
        }
    }

    async fn construct_and_start(
        &self,
        constructor: AddressableConstructor,
        entry: &Arc<ActivationEntry>,
    ) -> Result<(), InvocationError> {
        self.leases.ensure(&entry.reference).await?;

        let mut instance = constructor(&entry.reference)
            .map_err(|e| InvocationError::ActivationFailed(e.to_string()))?;
        let ctx = ActivationContext::new(entry.reference.clone(), self.serializer.clone());
        instance
            .on_activate(&ctx)
            .await
            .map_err(|e| InvocationError::ActivationFailed(e.to_string()))?;

        *entry.state.lock().await = ActivationState::Active;
        self.metrics.record_activation();
        info!(reference = %entry.reference, instance = %entry.instance_id, "activation ready");

        let pump = tokio::spawn(Self::pump(
            instance,
            ctx,
            entry.clone(),
            self.pool.clone(),
            self.outbound.clone(),
            self.clock.clone(),
        ));
        *entry.pump.lock().await = Some(pump);
        Ok(())
    }

    /// Per-activation message loop. Owns the instance, which is what makes
    /// `&mut self` dispatch safe: nothing else can reach it.
    async fn pump(
        mut instance: Box<dyn Addressable>,
        ctx: ActivationContext,
        entry: Arc<ActivationEntry>,
        pool: Arc<Semaphore>,
        outbound: mpsc::UnboundedSender<Frame>,
        clock: Arc<dyn Clock>,
    ) -> Box<dyn Addressable> {
        while let Some(message) = entry.mailbox.dequeue().await {
            let permit = match pool.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let outcome = match instance
                .on_invoke(&ctx, &message.method, &message.payload)
                .await
            {
                Ok(payload) => InvocationOutcome::Ok(payload),
                // An actor-raised Remote error keeps its original kind tag
                // so the caller sees what the actor threw.
                Err(InvocationError::Remote { kind, message }) => {
                    InvocationOutcome::Err { kind, message }
                }
                Err(err) => InvocationOutcome::Err {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                },
            };
            *entry.last_touched.lock().await = clock.now();
            let _ = outbound.send(Frame::InvocationResult(InvocationResultFrame {
                message_id: message.correlation,
                outcome,
            }));
            drop(permit);
        }
        instance
    }

    async fn deactivate_with(
        &self,
        entry: Arc<ActivationEntry>,
        reason: DeactivationReason,
        deactivator: Arc<dyn Deactivator>,
    ) {
        {
            let mut state = entry.state.lock().await;
            if *state != ActivationState::Active {
                return;
            }
            *state = ActivationState::Deactivating;
        }
        info!(reference = %entry.reference, ?reason, "deactivating");

        // New mail is rejected from here on; whatever was queued is failed
        // back to its callers.
        let drained = entry.mailbox.close().await;
        for message in drained {
            self.reply_error(
                message.correlation,
                &InvocationError::ActivationGone(entry.reference.to_string()),
            );
        }

        let pump = entry.pump.lock().await.take();
        if let Some(handle) = pump {
            match handle.await {
                Ok(mut instance) => {
                    let ctx =
                        ActivationContext::new(entry.reference.clone(), self.serializer.clone());
                    if let Err(err) = instance.on_deactivate(&ctx).await {
                        warn!(reference = %entry.reference, error = %err, "on_deactivate failed");
                    }
                }
                Err(err) => {
                    warn!(reference = %entry.reference, error = %err, "activation pump aborted");
                }
            }
        }

        deactivator.on_deactivation(&entry.reference, reason).await;
        self.leases.release(&entry.reference).await;
        *entry.state.lock().await = ActivationState::Deactivated;
        self.activations.write().await.remove(&entry.reference);
        self.metrics.record_deactivation();
    }

    fn reply_error(&self, message_id: u64, err: &InvocationError) {
        let _ = self.outbound.send(Frame::InvocationResult(InvocationResultFrame {
            message_id,
            outcome: InvocationOutcome::Err {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CapabilityScanner, NoopDeactivator};
    use crate::invocation::JsonSerializer;
    use crate::transport::{DirectoryChannel, MeshStream, MessageIds, Transport};
    use async_trait::async_trait;
    use chrono::Utc;
    use plexmesh_core::wire::{AddressableLeaseOutcome, AddressableLeaseResponse};
    use plexmesh_core::{
        ClientState, LeaseTerms, LeaseWindow, LocalNode, ManualClock, NodeId, NodeInfo,
        TransportError,
    };
    use std::sync::atomic::AtomicUsize;

    /// Transport stub that grants every addressable lease.
    struct GrantingDirectory {
        terms: LeaseTerms,
    }

    #[async_trait]
    impl Transport for GrantingDirectory {
        async fn request(&self, _endpoint: &str, frame: Frame) -> Result<Frame, TransportError> {
            match frame {
                Frame::Lease(req) => Ok(Frame::LeaseAck(AddressableLeaseResponse {
                    message_id: req.message_id,
                    outcome: AddressableLeaseOutcome::Granted {
                        owner: NodeId::new("node-1"),
                        lease: self.terms,
                    },
                })),
                other => Err(TransportError::Protocol(format!(
                    "stub cannot answer {}",
                    other.kind()
                ))),
            }
        }

        async fn open_stream(
            &self,
            _endpoint: &str,
            _node_id: &NodeId,
        ) -> Result<Arc<dyn MeshStream>, TransportError> {
            Err(TransportError::ConnectFailed("stub".to_string()))
        }
    }

    struct Recorder {
        invocations: Arc<AtomicUsize>,
        deactivated: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Addressable for Recorder {
        async fn on_invoke(
            &mut self,
            _ctx: &ActivationContext,
            method: &str,
            _args: &[u8],
        ) -> Result<Vec<u8>, InvocationError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if method == "boom" {
                return Err(InvocationError::Remote {
                    kind: "boom".to_string(),
                    message: "requested failure".to_string(),
                });
            }
            Ok(b"ok".to_vec())
        }

        async fn on_deactivate(
            &mut self,
            _ctx: &ActivationContext,
        ) -> Result<(), InvocationError> {
            self.deactivated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        execution: Arc<ExecutionSystem>,
        outbound: mpsc::UnboundedReceiver<Frame>,
        clock: Arc<ManualClock>,
        invocations: Arc<AtomicUsize>,
        deactivated: Arc<AtomicUsize>,
    }

    async fn fixture(ttl: Duration) -> Fixture {
        let clock = Arc::new(ManualClock::new());
        let invocations = Arc::new(AtomicUsize::new(0));
        let deactivated = Arc::new(AtomicUsize::new(0));

        let mut scanner = CapabilityScanner::new();
        {
            let invocations = invocations.clone();
            let deactivated = deactivated.clone();
            scanner.register("IRecorder", move |_reference| {
                Ok(Box::new(Recorder {
                    invocations: invocations.clone(),
                    deactivated: deactivated.clone(),
                }))
            });
        }
        let definitions = Arc::new(DefinitionDirectory::new());
        definitions
            .setup_definitions(scanner.scan().unwrap())
            .await
            .unwrap();

        let local_node = Arc::new(LocalNode::new());
        local_node
            .try_transition(ClientState::Connecting)
            .await
            .unwrap();
        let lease =
            LeaseWindow::from_terms(clock.now(), &LeaseTerms::with_ttl(Duration::from_secs(600)));
        local_node
            .manipulate(move |mut status| {
                status.node_info = Some(NodeInfo {
                    id: NodeId::new("node-1"),
                    lease,
                });
                status
            })
            .await;

        let directory = Arc::new(DirectoryChannel::new(
            Arc::new(GrantingDirectory {
                terms: LeaseTerms::with_ttl(Duration::from_secs(600)),
            }),
            "mesh".to_string(),
            Arc::new(MessageIds::new()),
        ));
        let leaser = AddressableLeaser::new(directory, local_node, clock.clone(), 0.5);

        let (tx, rx) = mpsc::unbounded_channel();
        let execution = Arc::new(ExecutionSystem::new(
            ExecutionConfig {
                pool_size: 4,
                addressable_ttl: ttl,
                stop_deadline: Duration::from_secs(5),
                mailbox_capacity: 100,
            },
            definitions,
            leaser,
            Arc::new(JsonSerializer),
            tx,
            clock.clone(),
            Arc::new(NoopDeactivator),
            Arc::new(ClientMetrics::new()),
        ));

        Fixture {
            execution,
            outbound: rx,
            clock,
            invocations,
            deactivated,
        }
    }

    fn invocation(message_id: u64, interface: &str, method: &str) -> InvocationFrame {
        InvocationFrame {
            message_id,
            source: Some(NodeId::new("node-1")),
            target: AddressableReference::new(interface, "a"),
            method: method.to_string(),
            args: b"[]".to_vec(),
            budget_ms: 1_000,
            timestamp: Utc::now(),
        }
    }

    async fn next_result(outbound: &mut mpsc::UnboundedReceiver<Frame>) -> InvocationResultFrame {
        loop {
            match outbound.recv().await.expect("outbound closed") {
                Frame::InvocationResult(result) => return result,
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_activate_on_first_message_and_reply() {
        let mut fx = fixture(Duration::from_secs(600)).await;
        fx.execution.enqueue(invocation(1, "IRecorder", "poke")).await;

        let result = next_result(&mut fx.outbound).await;
        assert_eq!(result.message_id, 1);
        assert!(matches!(result.outcome, InvocationOutcome::Ok(ref b) if b == b"ok"));
        assert_eq!(fx.execution.activation_count().await, 1);
        assert_eq!(
            fx.execution
                .activation_state(&AddressableReference::new("IRecorder", "a"))
                .await,
            Some(ActivationState::Active)
        );
    }

    #[tokio::test]
    async fn test_unhosted_interface_fails_activation() {
        let mut fx = fixture(Duration::from_secs(600)).await;
        fx.execution.enqueue(invocation(1, "IUnknown", "poke")).await;

        let result = next_result(&mut fx.outbound).await;
        assert!(matches!(
            result.outcome,
            InvocationOutcome::Err { ref kind, .. } if kind == "activation_failed"
        ));
        assert_eq!(fx.execution.activation_count().await, 0);
    }

    #[tokio::test]
    async fn test_actor_error_is_tagged_in_reply() {
        let mut fx = fixture(Duration::from_secs(600)).await;
        fx.execution.enqueue(invocation(1, "IRecorder", "boom")).await;

        let result = next_result(&mut fx.outbound).await;
        assert!(matches!(
            result.outcome,
            InvocationOutcome::Err { ref kind, .. } if kind == "boom"
        ));
    }

    #[tokio::test]
    async fn test_idle_sweep_deactivates() {
        let mut fx = fixture(Duration::from_millis(500)).await;
        fx.execution.enqueue(invocation(1, "IRecorder", "poke")).await;
        next_result(&mut fx.outbound).await;

        // Not yet idle long enough.
        fx.clock.advance(Duration::from_millis(200));
        fx.execution.tick().await;
        assert_eq!(fx.execution.activation_count().await, 1);

        fx.clock.advance(Duration::from_millis(400));
        fx.execution.tick().await;
        assert_eq!(fx.execution.activation_count().await, 0);
        assert_eq!(fx.deactivated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_drains_all_activations() {
        let mut fx = fixture(Duration::from_secs(600)).await;
        fx.execution.enqueue(invocation(1, "IRecorder", "poke")).await;
        next_result(&mut fx.outbound).await;
        assert_eq!(fx.execution.activation_count().await, 1);

        let abandoned = fx.execution.stop(None).await;
        assert_eq!(abandoned, 0);
        assert_eq!(fx.execution.activation_count().await, 0);
        assert_eq!(fx.deactivated.load(Ordering::SeqCst), 1);

        // Messages after stop are answered with activation_gone.
        fx.execution.enqueue(invocation(2, "IRecorder", "poke")).await;
        let result = next_result(&mut fx.outbound).await;
        assert!(matches!(
            result.outcome,
            InvocationOutcome::Err { ref kind, .. } if kind == "activation_gone"
        ));
    }

    #[tokio::test]
    async fn test_messages_processed_in_order() {
        let mut fx = fixture(Duration::from_secs(600)).await;
        for i in 1..=10u64 {
            fx.execution.enqueue(invocation(i, "IRecorder", "poke")).await;
        }
        let mut seen = Vec::new();
        for _ in 0..10 {
            seen.push(next_result(&mut fx.outbound).await.message_id);
        }
        assert_eq!(seen, (1..=10u64).collect::<Vec<_>>());
        assert_eq!(fx.invocations.load(Ordering::SeqCst), 10);
    }
}
