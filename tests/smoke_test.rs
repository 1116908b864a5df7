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

//! Umbrella-crate smoke test: the whole flow through the `plexmesh` facade.

use async_trait::async_trait;
use plexmesh::{
    ActivationContext, Addressable, ClientState, InProcessMesh, InvocationError,
    MeshClientBuilder,
};
use std::sync::Arc;
use std::time::Duration;

struct Greeter;

#[async_trait]
impl Addressable for Greeter {
    async fn on_invoke(
        &mut self,
        ctx: &ActivationContext,
        method: &str,
        args: &[u8],
    ) -> Result<Vec<u8>, InvocationError> {
        assert_eq!(method, "hello");
        let (name,): (String,) = ctx.decode_args(args)?;
        Ok(ctx.encode_result(&format!("hi,{}", name))?)
    }
}

#[tokio::test]
async fn test_umbrella_crate_end_to_end() -> anyhow::Result<()> {
    let mesh = Arc::new(InProcessMesh::new());
    let client = MeshClientBuilder::new()
        .with_namespace("smoke")
        .with_tick_rate(Duration::from_millis(100))
        .register_addressable("IGreeter", |_reference| Ok(Box::new(Greeter)))
        .with_transport(mesh)
        .build()?;

    client.start().await?;
    assert_eq!(client.state().await, ClientState::Connected);

    let greeting: String = client
        .proxy("IGreeter", "smoke")
        .invoke("hello", &("world",))
        .await?;
    assert_eq!(greeting, "hi,world");

    client.stop().await?;
    assert_eq!(client.state().await, ClientState::Stopped);
    Ok(())
}
