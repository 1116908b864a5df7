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

//! Fluent builder for mailboxes.

use crate::r#mod::{Mailbox, MailboxConfig};

/// Builder for [`Mailbox`] instances with sensible defaults.
///
/// ## Example
/// ```
/// # use plexmesh_mailbox::MailboxBuilder;
/// let mailbox = MailboxBuilder::new("IGreeter/a")
///     .with_capacity(256)
///     .build();
/// assert_eq!(mailbox.id(), "IGreeter/a");
/// ```
pub struct MailboxBuilder {
    mailbox_id: String,
    config: MailboxConfig,
}

impl MailboxBuilder {
    /// Start building a mailbox identified by `mailbox_id`.
    pub fn new(mailbox_id: impl Into<String>) -> Self {
        MailboxBuilder {
            mailbox_id: mailbox_id.into(),
            config: MailboxConfig::default(),
        }
    }

    /// Set the queue capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Build the mailbox.
    pub fn build(self) -> Mailbox {
        Mailbox::new(self.config, self.mailbox_id)
    }
}
