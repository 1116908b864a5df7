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

//! Client lifecycle state machine
//!
//! ## Purpose
//! The client moves through a monotone lifecycle: `Idle` → `Connecting` →
//! `Connected` → `Stopping` → `Stopped`, with a single shortcut back to
//! `Idle` when the cluster join fails. A stopped client is terminal; the
//! same instance is never restarted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the mesh client.
///
/// Transitions are total-ordered per lifecycle; every observer sees the
/// same sequence. The only backward edge is `Connecting` → `Idle`, taken
/// when the cluster join is rejected or retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientState {
    /// Not started, or returned here after a failed join.
    Idle,
    /// `start()` in progress: scanning capabilities, joining, connecting.
    Connecting,
    /// Joined and ticking; invocations flow in both directions.
    Connected,
    /// `stop()` in progress: draining activations and releasing leases.
    Stopping,
    /// Terminal. Re-entry is not supported by the same instance.
    Stopped,
}

impl ClientState {
    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(&self, next: ClientState) -> bool {
        use ClientState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connecting, Idle)
                | (Connected, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientState::Stopped)
    }
}

impl Default for ClientState {
    fn default() -> Self {
        ClientState::Idle
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientState::Idle => "IDLE",
            ClientState::Connecting => "CONNECTING",
            ClientState::Connected => "CONNECTED",
            ClientState::Stopping => "STOPPING",
            ClientState::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// Error raised when an illegal lifecycle transition is attempted.
#[derive(Debug, Clone, thiserror::Error)]
#[error("illegal client state transition: {from} -> {to}")]
pub struct StateTransitionError {
    /// State the client was in.
    pub from: ClientState,
    /// State the caller attempted to move to.
    pub to: ClientState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use ClientState::*;
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
    }

    #[test]
    fn test_join_failure_shortcut() {
        assert!(ClientState::Connecting.can_transition_to(ClientState::Idle));
    }

    #[test]
    fn test_illegal_transitions() {
        use ClientState::*;
        assert!(!Idle.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Idle));
        assert!(!Stopped.can_transition_to(Idle));
        assert!(!Stopped.can_transition_to(Connecting));
        assert!(!Stopping.can_transition_to(Connected));
    }

    #[test]
    fn test_terminal_state() {
        assert!(ClientState::Stopped.is_terminal());
        assert!(!ClientState::Connected.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(ClientState::Connecting.to_string(), "CONNECTING");
        assert_eq!(ClientState::Stopped.to_string(), "STOPPED");
    }
}
