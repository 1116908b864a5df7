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

//! Addressable identity types
//!
//! ## Purpose
//! A virtual actor (an *addressable*) is referenced by a stable identity:
//! the interface it implements plus an opaque key. Callers never hold a
//! placement; the mesh activates an instance on some node on demand and may
//! move it between activations. These types are pure data and hash-stable
//! so they can key lease caches and activation registries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable name identifying an actor interface version.
///
/// Convention: the interface trait name as advertised to the mesh,
/// e.g. `"IGreeter"` or `"inventory.Cart.v2"`.
pub type InterfaceId = String;

/// Opaque identity of a virtual actor within its interface.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    /// String-keyed actor, the common case.
    Text(String),
    /// Integer-keyed actor.
    Number(i64),
    /// Composite key made of ordered parts.
    Composite(Vec<Key>),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Text(s) => f.write_str(s),
            Key::Number(n) => write!(f, "{}", n),
            Key::Composite(parts) => {
                let joined: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", joined.join(","))
            }
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Number(n)
    }
}

/// Identity of a virtual actor: interface plus key.
///
/// ## Example
/// ```
/// # use plexmesh_core::addressable::AddressableReference;
/// let greeter = AddressableReference::new("IGreeter", "a");
/// assert_eq!(greeter.to_string(), "IGreeter/a");
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressableReference {
    /// Interface this actor implements.
    pub interface: InterfaceId,
    /// Opaque key within the interface.
    pub key: Key,
}

impl AddressableReference {
    /// Create a reference from an interface id and anything convertible
    /// into a [`Key`].
    pub fn new(interface: impl Into<InterfaceId>, key: impl Into<Key>) -> Self {
        AddressableReference {
            interface: interface.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for AddressableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.interface, self.key)
    }
}
