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

//! Capability discovery and the definition directory
//!
//! ## Purpose
//! The host registers the actor interfaces it can serve, each with a
//! constructor. [`CapabilityScanner::scan`] turns the registrations into a
//! `{capabilities, constructors}` pair; [`DefinitionDirectory`] consumes
//! that pair exactly once at startup and afterwards serves two immutable
//! queries: the capability set for advertisement and constructor lookup
//! for on-demand activation.

use crate::invocation::Serializer;
use async_trait::async_trait;
use plexmesh_core::{
    AddressableReference, ClientError, InterfaceId, InvocationError, Key, SerializationError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Context handed to an activation for every lifecycle call and message.
///
/// Wraps the identity of the activation plus the configured serializer so
/// handler code can decode arguments and encode results without caring
/// about the wire encoding.
pub struct ActivationContext {
    reference: AddressableReference,
    serializer: Arc<dyn Serializer>,
}

impl ActivationContext {
    /// Create a context for `reference`.
    pub fn new(reference: AddressableReference, serializer: Arc<dyn Serializer>) -> Self {
        ActivationContext {
            reference,
            serializer,
        }
    }

    /// Identity of this activation.
    pub fn reference(&self) -> &AddressableReference {
        &self.reference
    }

    /// Key part of the identity.
    pub fn key(&self) -> &Key {
        &self.reference.key
    }

    /// Decode invocation arguments into a typed value.
    ///
    /// Arguments are conventionally tuples, e.g. `(String,)` for a
    /// single-argument method.
    pub fn decode_args<T: DeserializeOwned>(&self, args: &[u8]) -> Result<T, SerializationError> {
        let value = self.serializer.decode(args)?;
        serde_json::from_value(value).map_err(|e| SerializationError(e.to_string()))
    }

    /// Encode a typed return value for the response frame.
    pub fn encode_result<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        let value = serde_json::to_value(value).map_err(|e| SerializationError(e.to_string()))?;
        self.serializer.encode(value)
    }
}

/// An actor implementation hosted by this process.
///
/// One instance exists per activation; the runtime guarantees at most one
/// `on_invoke` is in flight per instance, so `&mut self` access is safe
/// without further locking.
#[async_trait]
pub trait Addressable: Send + Sync {
    /// Called once after construction, before the first message.
    async fn on_activate(&mut self, _ctx: &ActivationContext) -> Result<(), InvocationError> {
        Ok(())
    }

    /// Handle one invocation. Returns the serialized result payload.
    async fn on_invoke(
        &mut self,
        ctx: &ActivationContext,
        method: &str,
        args: &[u8],
    ) -> Result<Vec<u8>, InvocationError>;

    /// Called once during deactivation, after the last message.
    async fn on_deactivate(&mut self, _ctx: &ActivationContext) -> Result<(), InvocationError> {
        Ok(())
    }
}

/// Factory producing a fresh instance for an activation.
pub type AddressableConstructor =
    Arc<dyn Fn(&AddressableReference) -> Result<Box<dyn Addressable>, ClientError> + Send + Sync>;

/// Why an activation is being deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationReason {
    /// Idle longer than the configured addressable TTL.
    Idle,
    /// The execution lease could not be renewed.
    LeaseLost,
    /// The client is stopping.
    Stopping,
}

/// Host callback invoked while an activation is torn down.
#[async_trait]
pub trait Deactivator: Send + Sync {
    /// Perform host-side teardown for `reference`. May suspend.
    async fn on_deactivation(&self, reference: &AddressableReference, reason: DeactivationReason);
}

/// Deactivator that does nothing.
pub struct NoopDeactivator;

#[async_trait]
impl Deactivator for NoopDeactivator {
    async fn on_deactivation(&self, _reference: &AddressableReference, _reason: DeactivationReason) {}
}

/// Result of a capability scan.
#[derive(Clone, Default)]
pub struct ScanResult {
    /// Interfaces this host can serve, for advertisement.
    pub capabilities: HashSet<InterfaceId>,
    /// Constructor per interface, for activation.
    pub constructors: HashMap<InterfaceId, AddressableConstructor>,
}

impl std::fmt::Debug for ScanResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanResult")
            .field("capabilities", &self.capabilities)
            .field("constructors", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Collects host registrations of hostable interfaces.
///
/// ## Example
/// ```rust,ignore
/// let mut scanner = CapabilityScanner::new();
/// scanner.register("IGreeter", |reference| Ok(Box::new(Greeter::default())));
/// let scan = scanner.scan()?;
/// assert!(scan.capabilities.contains("IGreeter"));
/// ```
#[derive(Default)]
pub struct CapabilityScanner {
    registrations: Vec<(InterfaceId, AddressableConstructor)>,
}

impl CapabilityScanner {
    /// Empty scanner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interface with its constructor.
    pub fn register<F>(&mut self, interface: impl Into<InterfaceId>, constructor: F)
    where
        F: Fn(&AddressableReference) -> Result<Box<dyn Addressable>, ClientError>
            + Send
            + Sync
            + 'static,
    {
        self.registrations
            .push((interface.into(), Arc::new(constructor)));
    }

    /// Number of registrations collected so far.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Enumerate the registrations into a scan result.
    ///
    /// ## Errors
    /// [`ClientError::DuplicateRegistration`] when two registrations claim
    /// the same interface.
    pub fn scan(&self) -> Result<ScanResult, ClientError> {
        let mut result = ScanResult::default();
        for (interface, constructor) in &self.registrations {
            if !result.capabilities.insert(interface.clone()) {
                return Err(ClientError::DuplicateRegistration(interface.clone()));
            }
            result
                .constructors
                .insert(interface.clone(), constructor.clone());
        }
        Ok(result)
    }
}

/// Immutable mapping from interface to constructor, installed once.
#[derive(Default)]
pub struct DefinitionDirectory {
    definitions: RwLock<Option<ScanResult>>,
}

impl DefinitionDirectory {
    /// Empty, uninitialized directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the scan result. Single-shot: a second call fails without
    /// mutating state.
    pub async fn setup_definitions(&self, scan: ScanResult) -> Result<(), ClientError> {
        let mut guard = self.definitions.write().await;
        if guard.is_some() {
            return Err(ClientError::DefinitionsAlreadyInitialized);
        }
        *guard = Some(scan);
        Ok(())
    }

    /// Whether `setup_definitions` has run.
    pub async fn is_initialized(&self) -> bool {
        self.definitions.read().await.is_some()
    }

    /// Capability set for advertisement; empty before setup.
    pub async fn generate_capabilities(&self) -> HashSet<InterfaceId> {
        self.definitions
            .read()
            .await
            .as_ref()
            .map(|scan| scan.capabilities.clone())
            .unwrap_or_default()
    }

    /// Constructor for `interface`, if hosted here.
    pub async fn lookup(&self, interface: &InterfaceId) -> Option<AddressableConstructor> {
        self.definitions
            .read()
            .await
            .as_ref()
            .and_then(|scan| scan.constructors.get(interface).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::JsonSerializer;

    struct Echo;

    #[async_trait]
    impl Addressable for Echo {
        async fn on_invoke(
            &mut self,
            _ctx: &ActivationContext,
            _method: &str,
            args: &[u8],
        ) -> Result<Vec<u8>, InvocationError> {
            Ok(args.to_vec())
        }
    }

    fn echo_constructor() -> impl Fn(&AddressableReference) -> Result<Box<dyn Addressable>, ClientError>
    {
        |_reference| Ok(Box::new(Echo))
    }

    #[test]
    fn test_scan_collects_capabilities_and_constructors() {
        let mut scanner = CapabilityScanner::new();
        scanner.register("IEcho", echo_constructor());
        scanner.register("IGreeter", echo_constructor());

        let scan = scanner.scan().unwrap();
        assert_eq!(scan.capabilities.len(), 2);
        assert!(scan.constructors.contains_key("IEcho"));
        assert!(scan.constructors.contains_key("IGreeter"));
    }

    #[test]
    fn test_scan_rejects_duplicate_interface() {
        let mut scanner = CapabilityScanner::new();
        scanner.register("IEcho", echo_constructor());
        scanner.register("IEcho", echo_constructor());

        let err = scanner.scan().unwrap_err();
        assert!(matches!(err, ClientError::DuplicateRegistration(i) if i == "IEcho"));
    }

    #[tokio::test]
    async fn test_setup_is_single_shot() {
        let mut scanner = CapabilityScanner::new();
        scanner.register("IEcho", echo_constructor());
        let scan = scanner.scan().unwrap();

        let directory = DefinitionDirectory::new();
        directory.setup_definitions(scan.clone()).await.unwrap();

        let err = directory.setup_definitions(scan).await.unwrap_err();
        assert!(matches!(err, ClientError::DefinitionsAlreadyInitialized));

        // The failed second call must not have disturbed the first.
        assert!(directory.generate_capabilities().await.contains("IEcho"));
    }

    #[tokio::test]
    async fn test_lookup_before_setup_is_none() {
        let directory = DefinitionDirectory::new();
        assert!(!directory.is_initialized().await);
        assert!(directory.lookup(&"IEcho".to_string()).await.is_none());
        assert!(directory.generate_capabilities().await.is_empty());
    }

    #[tokio::test]
    async fn test_context_round_trips_typed_args() {
        let ctx = ActivationContext::new(
            AddressableReference::new("IGreeter", "a"),
            Arc::new(JsonSerializer),
        );

        let bytes = ctx.encode_result(&("x".to_string(), 3u32)).unwrap();
        let decoded: (String, u32) = ctx.decode_args(&bytes).unwrap();
        assert_eq!(decoded, ("x".to_string(), 3));
        assert_eq!(ctx.key(), &Key::Text("a".to_string()));
    }
}
