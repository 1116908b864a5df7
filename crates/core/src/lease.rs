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

//! Lease records and renewal-window math
//!
//! ## Purpose
//! A lease is a time-bounded right: to be a mesh member (node lease) or to
//! host/route to a specific actor (addressable lease). The directory grants
//! durations; the client anchors them against its own monotonic clock, so
//! no wall-clock agreement with the mesh is required. Renewal is due once
//! the window's `renew_at` passes; the lease is dead once `expires_at`
//! passes without a successful renewal.

use crate::addressable::AddressableReference;
use crate::local_node::NodeId;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Lease durations granted by the directory, carried on the wire.
///
/// A `renew_after_ms` of zero means the directory left the renewal margin
/// to the client, which then renews once half the TTL has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseTerms {
    /// Total lease duration in milliseconds.
    pub ttl_ms: u64,
    /// Offset after which renewal should be attempted, in milliseconds.
    pub renew_after_ms: u64,
}

impl LeaseTerms {
    /// Terms with an explicit renewal offset.
    pub fn new(ttl: Duration, renew_after: Duration) -> Self {
        LeaseTerms {
            ttl_ms: ttl.as_millis() as u64,
            renew_after_ms: renew_after.as_millis() as u64,
        }
    }

    /// Terms leaving the renewal margin to the client.
    pub fn with_ttl(ttl: Duration) -> Self {
        LeaseTerms {
            ttl_ms: ttl.as_millis() as u64,
            renew_after_ms: 0,
        }
    }
}

/// A granted lease anchored to the local monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseWindow {
    /// When the grant was observed locally.
    pub acquired_at: Instant,
    /// When renewal becomes due.
    pub renew_at: Instant,
    /// When the lease expires. Holding state past this point is illegal.
    pub expires_at: Instant,
}

impl LeaseWindow {
    /// Anchor directory terms against the local clock.
    ///
    /// A zero `renew_after_ms` defaults to renewing when 50% of the lease
    /// duration remains.
    pub fn from_terms(now: Instant, terms: &LeaseTerms) -> Self {
        Self::from_terms_with_margin(now, terms, 0.5)
    }

    /// Anchor directory terms, renewing once less than `renewal_margin` of
    /// the lease duration remains. Only applies when the directory left the
    /// renewal point to the client; explicit terms always win.
    pub fn from_terms_with_margin(now: Instant, terms: &LeaseTerms, renewal_margin: f64) -> Self {
        let ttl = Duration::from_millis(terms.ttl_ms);
        let renew_after = if terms.renew_after_ms == 0 {
            ttl.mul_f64(1.0 - renewal_margin.clamp(0.05, 0.95))
        } else {
            Duration::from_millis(terms.renew_after_ms)
        };
        LeaseWindow {
            acquired_at: now,
            renew_at: now + renew_after,
            expires_at: now + ttl,
        }
    }

    /// Whether renewal should be attempted.
    pub fn due_for_renewal(&self, now: Instant) -> bool {
        now >= self.renew_at
    }

    /// Whether the lease has expired.
    pub fn expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    /// Time left before expiry, zero if already expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// A cached right to route to (or host) a specific actor.
#[derive(Debug, Clone)]
pub struct AddressableLease {
    /// The actor this lease covers.
    pub reference: AddressableReference,
    /// Node currently hosting the actor, per the directory.
    pub owner: NodeId,
    /// Validity window.
    pub window: LeaseWindow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_from_terms_explicit_margin() {
        let now = Instant::now();
        let terms = LeaseTerms::new(Duration::from_secs(10), Duration::from_secs(3));
        let window = LeaseWindow::from_terms(now, &terms);

        assert_eq!(window.renew_at, now + Duration::from_secs(3));
        assert_eq!(window.expires_at, now + Duration::from_secs(10));
    }

    #[test]
    fn test_window_default_margin_is_half_ttl() {
        let now = Instant::now();
        let terms = LeaseTerms::with_ttl(Duration::from_secs(10));
        let window = LeaseWindow::from_terms(now, &terms);

        assert_eq!(window.renew_at, now + Duration::from_secs(5));
    }

    #[test]
    fn test_window_custom_margin() {
        let now = Instant::now();
        let terms = LeaseTerms::with_ttl(Duration::from_secs(10));

        // Renew once 20% of the lease remains.
        let window = LeaseWindow::from_terms_with_margin(now, &terms, 0.2);
        assert_eq!(window.renew_at, now + Duration::from_secs(8));

        // Explicit directory terms win over the margin.
        let explicit = LeaseTerms::new(Duration::from_secs(10), Duration::from_secs(3));
        let window = LeaseWindow::from_terms_with_margin(now, &explicit, 0.2);
        assert_eq!(window.renew_at, now + Duration::from_secs(3));
    }

    #[test]
    fn test_renewal_and_expiry_checks() {
        let now = Instant::now();
        let terms = LeaseTerms::new(Duration::from_secs(10), Duration::from_secs(5));
        let window = LeaseWindow::from_terms(now, &terms);

        assert!(!window.due_for_renewal(now));
        assert!(window.due_for_renewal(now + Duration::from_secs(5)));
        assert!(!window.expired(now + Duration::from_secs(10)));
        assert!(window.expired(now + Duration::from_secs(11)));
    }

    #[test]
    fn test_remaining_saturates_at_zero() {
        let now = Instant::now();
        let window = LeaseWindow::from_terms(now, &LeaseTerms::with_ttl(Duration::from_secs(1)));

        assert_eq!(window.remaining(now + Duration::from_secs(2)), Duration::ZERO);
        assert!(window.remaining(now) > Duration::ZERO);
    }
}
