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

//! Client runtime counters
//!
//! ## Purpose
//! Tracks invocation flow and activation lifecycle without depending on an
//! external metrics pipeline. Counters are plain atomics; `snapshot()`
//! gives a consistent-enough view for tests and observability hooks.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the client runtime.
#[derive(Debug, Default)]
pub struct ClientMetrics {
    invocations_sent: AtomicU64,
    responses_completed: AtomicU64,
    invocation_timeouts: AtomicU64,
    stray_responses: AtomicU64,
    activations_total: AtomicU64,
    activation_failures: AtomicU64,
    deactivations_total: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of [`ClientMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMetricsSnapshot {
    /// Outbound invocations written to the stream.
    pub invocations_sent: u64,
    /// Pending calls completed by an inbound response.
    pub responses_completed: u64,
    /// Pending calls completed by the timeout sweep.
    pub invocation_timeouts: u64,
    /// Responses that arrived with no pending call and were dropped.
    pub stray_responses: u64,
    /// Activations that reached ACTIVE.
    pub activations_total: u64,
    /// Activations whose construction failed.
    pub activation_failures: u64,
    /// Activations fully deactivated.
    pub deactivations_total: u64,
    /// Message stream re-establishments.
    pub reconnects: u64,
}

impl ClientMetrics {
    /// Create all-zero counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an outbound invocation.
    pub fn record_invocation_sent(&self) {
        self.invocations_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a completed response.
    pub fn record_response(&self) {
        self.responses_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a timed-out pending call.
    pub fn record_timeout(&self) {
        self.invocation_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a stray response.
    pub fn record_stray_response(&self) {
        self.stray_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a successful activation.
    pub fn record_activation(&self) {
        self.activations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an activation failure.
    pub fn record_activation_failure(&self) {
        self.activation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a completed deactivation.
    pub fn record_deactivation(&self) {
        self.deactivations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a stream re-establishment.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy out the current counter values.
    pub fn snapshot(&self) -> ClientMetricsSnapshot {
        ClientMetricsSnapshot {
            invocations_sent: self.invocations_sent.load(Ordering::Relaxed),
            responses_completed: self.responses_completed.load(Ordering::Relaxed),
            invocation_timeouts: self.invocation_timeouts.load(Ordering::Relaxed),
            stray_responses: self.stray_responses.load(Ordering::Relaxed),
            activations_total: self.activations_total.load(Ordering::Relaxed),
            activation_failures: self.activation_failures.load(Ordering::Relaxed),
            deactivations_total: self.deactivations_total.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}
