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

//! Typed proxies to remote actors
//!
//! A proxy is a thin handle over the invocation system: it carries the
//! target reference and a default deadline. Hosts typically wrap one in a
//! typed client struct per interface; the dynamic `invoke` call is the
//! escape hatch and the building block.
//!
//! ## Example
//! ```rust,ignore
//! let greeter = client.proxy("IGreeter", "a");
//! let greeting: String = greeter.invoke("hello", &("x",)).await?;
//! ```

use crate::invocation::InvocationSystem;
use plexmesh_core::{AddressableReference, InvocationError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Handle for invoking one virtual actor.
#[derive(Clone)]
pub struct AddressableProxy {
    reference: AddressableReference,
    invocations: Arc<InvocationSystem>,
    timeout: Duration,
}

impl AddressableProxy {
    pub(crate) fn new(
        reference: AddressableReference,
        invocations: Arc<InvocationSystem>,
        timeout: Duration,
    ) -> Self {
        AddressableProxy {
            reference,
            invocations,
            timeout,
        }
    }

    /// Target identity.
    pub fn reference(&self) -> &AddressableReference {
        &self.reference
    }

    /// Replace the default deadline for calls made through this proxy.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Invoke `method` with typed arguments and result.
    ///
    /// Arguments are conventionally a tuple mirroring the method
    /// parameters, e.g. `&("x",)` for a single string argument.
    pub async fn invoke<A, R>(&self, method: &str, args: &A) -> Result<R, InvocationError>
    where
        A: Serialize + Sync,
        R: DeserializeOwned,
    {
        self.invoke_with_timeout(method, args, self.timeout).await
    }

    /// Invoke with an explicit deadline for this one call.
    pub async fn invoke_with_timeout<A, R>(
        &self,
        method: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<R, InvocationError>
    where
        A: Serialize + Sync,
        R: DeserializeOwned,
    {
        self.invocations
            .invoke_typed(self.reference.clone(), method, args, timeout)
            .await
    }
}
