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

//! Per-actor lease cache
//!
//! ## Purpose
//! Mirrors the node leaser at actor granularity. An outbound invocation
//! consults the cache; a miss acquires a lease from the directory; a hit
//! near expiry returns immediately and renews in the background. Expired
//! entries are evicted lazily on next access, which together with the fact
//! that leases exist only for references the host actually uses bounds the
//! cache.

use crate::transport::DirectoryChannel;
use plexmesh_core::wire::AddressableLeaseOutcome;
use plexmesh_core::{
    AddressableLease, AddressableReference, Clock, InvocationError, LeaseWindow, LocalNode,
    TransportError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::debug;

/// Cache of addressable leases keyed by reference.
#[derive(Clone)]
pub struct AddressableLeaser {
    inner: Arc<LeaserInner>,
}

struct LeaserInner {
    cache: RwLock<HashMap<AddressableReference, AddressableLease>>,
    directory: Arc<DirectoryChannel>,
    local_node: Arc<LocalNode>,
    clock: Arc<dyn Clock>,
    renewal_margin: f64,
}

impl AddressableLeaser {
    /// Create an empty cache over the directory channel. `renewal_margin`
    /// is the lease fraction that should remain when renewal starts, for
    /// terms that leave the margin to the client.
    pub fn new(
        directory: Arc<DirectoryChannel>,
        local_node: Arc<LocalNode>,
        clock: Arc<dyn Clock>,
        renewal_margin: f64,
    ) -> Self {
        AddressableLeaser {
            inner: Arc::new(LeaserInner {
                cache: RwLock::new(HashMap::new()),
                directory,
                local_node,
                clock,
                renewal_margin,
            }),
        }
    }

    /// Lease for `reference`, from cache or acquired from the directory.
    ///
    /// A cached lease past its renewal point is returned as-is while a
    /// background task refreshes it; an expired one is evicted and
    /// re-acquired inline.
    pub async fn resolve(
        &self,
        reference: &AddressableReference,
    ) -> Result<AddressableLease, InvocationError> {
        let now = self.inner.clock.now();
        let cached = self.inner.cache.read().await.get(reference).cloned();
        if let Some(lease) = cached {
            if lease.window.expired(now) {
                self.inner.cache.write().await.remove(reference);
            } else {
                if lease.window.due_for_renewal(now) {
                    let inner = self.inner.clone();
                    let reference = reference.clone();
                    tokio::spawn(async move {
                        if let Err(err) = LeaserInner::acquire(&inner, &reference).await {
                            debug!(reference = %reference, error = %err, "background lease renewal failed");
                        }
                    });
                }
                return Ok(lease);
            }
        }
        LeaserInner::acquire(&self.inner, reference).await
    }

    /// Force a renewal through the directory.
    pub async fn renew(
        &self,
        reference: &AddressableReference,
    ) -> Result<AddressableLease, InvocationError> {
        LeaserInner::acquire(&self.inner, reference).await
    }

    /// Renew only when the cached window says renewal is due.
    ///
    /// A reference with no cached lease is acquired fresh; used by the
    /// execution sweep for locally hosted actors.
    pub async fn renew_if_due(
        &self,
        reference: &AddressableReference,
        now: Instant,
    ) -> Result<(), InvocationError> {
        let cached = self.inner.cache.read().await.get(reference).cloned();
        match cached {
            Some(lease) if !lease.window.due_for_renewal(now) => Ok(()),
            _ => self.renew(reference).await.map(|_| ()),
        }
    }

    /// Drop the cached lease for `reference`.
    pub async fn evict(&self, reference: &AddressableReference) {
        self.inner.cache.write().await.remove(reference);
    }

    /// Number of cached leases.
    pub async fn cached_count(&self) -> usize {
        self.inner.cache.read().await.len()
    }
}

impl LeaserInner {
    async fn acquire(
        inner: &Arc<LeaserInner>,
        reference: &AddressableReference,
    ) -> Result<AddressableLease, InvocationError> {
        let node_id = inner
            .local_node
            .snapshot()
            .await
            .node_info
            .map(|info| info.id)
            .ok_or(TransportError::NotConnected)?;

        match inner.directory.lease(&node_id, reference).await? {
            AddressableLeaseOutcome::Granted { owner, lease } => {
                let window = LeaseWindow::from_terms_with_margin(
                    inner.clock.now(),
                    &lease,
                    inner.renewal_margin,
                );
                let lease = AddressableLease {
                    reference: reference.clone(),
                    owner,
                    window,
                };
                inner
                    .cache
                    .write()
                    .await
                    .insert(reference.clone(), lease.clone());
                Ok(lease)
            }
            AddressableLeaseOutcome::Denied { reason } => Err(InvocationError::LeaseDenied {
                reference: reference.to_string(),
                reason,
            }),
        }
    }
}
