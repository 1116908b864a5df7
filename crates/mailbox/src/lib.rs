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

//! Per-activation mailboxes for PlexMesh
//!
//! This crate provides the FIFO message queue attached to each actor
//! activation:
//! - Strict enqueue-order delivery
//! - Backpressure via a bounded capacity
//! - Close/drain semantics used by the deactivation path
//! - Statistics hooks

#![warn(missing_docs)]
#![warn(clippy::all)]

// Export the mailbox module
mod r#mod;
mod builder;

// Re-export all public items
pub use r#mod::*;
pub use builder::MailboxBuilder;
