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

//! Invocation semantics: timeouts, per-actor serialization, remote errors.

use async_trait::async_trait;
use plexmesh_client::{
    ActivationContext, Addressable, InProcessMesh, InvocationError, MeshClient,
    MeshClientBuilder,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Records enter/exit events with a shared in-flight gauge, so interleaved
/// dispatch for one key would be visible both as a gauge above one and as
/// non-nested events.
struct Probe {
    log: Arc<Mutex<Vec<(&'static str, u64)>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

#[async_trait]
impl Addressable for Probe {
    async fn on_invoke(
        &mut self,
        ctx: &ActivationContext,
        method: &str,
        args: &[u8],
    ) -> Result<Vec<u8>, InvocationError> {
        match method {
            "mark" => {
                let (seq,): (u64,) = ctx.decode_args(args)?;
                let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(current, Ordering::SeqCst);
                self.log.lock().await.push(("enter", seq));

                tokio::time::sleep(Duration::from_millis(1)).await;

                self.log.lock().await.push(("exit", seq));
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(ctx.encode_result(&seq)?)
            }
            "fail" => Err(InvocationError::Remote {
                kind: "probe_failure".to_string(),
                message: "requested failure".to_string(),
            }),
            other => Err(InvocationError::Remote {
                kind: "unknown_method".to_string(),
                message: other.to_string(),
            }),
        }
    }
}

struct ProbeHarness {
    mesh: Arc<InProcessMesh>,
    client: MeshClient,
    log: Arc<Mutex<Vec<(&'static str, u64)>>>,
    max_in_flight: Arc<AtomicUsize>,
}

async fn probe_harness() -> ProbeHarness {
    let mesh = Arc::new(InProcessMesh::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));

    let client = {
        let log = log.clone();
        let in_flight = in_flight.clone();
        let max_in_flight = max_in_flight.clone();
        MeshClientBuilder::new()
            .with_namespace("test")
            .with_tick_rate(Duration::from_millis(100))
            .with_invocation_timeout(Duration::from_secs(10))
            .register_addressable("IProbe", move |_reference| {
                Ok(Box::new(Probe {
                    log: log.clone(),
                    in_flight: in_flight.clone(),
                    max_in_flight: max_in_flight.clone(),
                }))
            })
            .with_transport(mesh.clone())
            .build()
            .expect("client builds")
    };
    client.start().await.unwrap();

    ProbeHarness {
        mesh,
        client,
        log,
        max_in_flight,
    }
}

#[tokio::test]
async fn test_outbound_timeout_when_response_suppressed() {
    let harness = probe_harness().await;
    harness.mesh.suppress_responses(true);

    let started = Instant::now();
    let result: Result<u64, InvocationError> = harness
        .client
        .proxy("IProbe", "t")
        .invoke_with_timeout("mark", &(1u64,), Duration::from_millis(200))
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(InvocationError::Timeout)));
    // Expired on the tick after the 200ms deadline.
    assert!(elapsed >= Duration::from_millis(150), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "elapsed {:?}", elapsed);

    // The pending entry was removed when the sweep completed the call.
    assert_eq!(harness.client.pending_invocations().await, 0);
    assert!(harness.client.metrics().invocation_timeouts >= 1);

    harness.mesh.suppress_responses(false);
    harness.client.stop().await.unwrap();
}

#[tokio::test]
async fn test_per_actor_serialization_is_strictly_nested() {
    let harness = probe_harness().await;

    let calls = (0..100u64).map(|seq| {
        let proxy = harness.client.proxy("IProbe", "serial");
        async move {
            let echoed: u64 = proxy.invoke("mark", &(seq,)).await.unwrap();
            assert_eq!(echoed, seq);
        }
    });
    futures::future::join_all(calls).await;

    let log = harness.log.lock().await;
    assert_eq!(log.len(), 200);
    // Strict nesting for one key: every enter is immediately followed by
    // its own exit.
    for pair in log.chunks(2) {
        assert_eq!(pair[0].0, "enter");
        assert_eq!(pair[1].0, "exit");
        assert_eq!(pair[0].1, pair[1].1, "interleaved events for {:?}", pair);
    }
    assert_eq!(harness.max_in_flight.load(Ordering::SeqCst), 1);

    harness.client.stop().await.unwrap();
}

#[tokio::test]
async fn test_distinct_keys_run_concurrently() {
    let harness = probe_harness().await;

    let calls = (0..4u64).map(|key| {
        let proxy = harness.client.proxy("IProbe", key as i64);
        async move {
            let _: u64 = proxy.invoke("mark", &(key,)).await.unwrap();
        }
    });
    futures::future::join_all(calls).await;

    // Four activations existed; no cross-actor ordering is asserted.
    assert_eq!(harness.client.metrics().activations_total, 4);
    harness.client.stop().await.unwrap();
}

#[tokio::test]
async fn test_remote_error_reaches_the_caller_with_kind() {
    let harness = probe_harness().await;

    let result: Result<u64, InvocationError> = harness
        .client
        .proxy("IProbe", "e")
        .invoke("fail", &())
        .await;

    match result {
        Err(InvocationError::Remote { kind, message }) => {
            assert_eq!(kind, "probe_failure");
            assert_eq!(message, "requested failure");
        }
        other => panic!("expected remote error, got {:?}", other.map(|_| ())),
    }

    harness.client.stop().await.unwrap();
}

#[tokio::test]
async fn test_unhosted_interface_fails_without_timeout() {
    let harness = probe_harness().await;

    let started = Instant::now();
    let result: Result<u64, InvocationError> = harness
        .client
        .proxy("INotHosted", "a")
        .invoke("mark", &(1u64,))
        .await;

    // The directory denies the routing lease immediately.
    assert!(matches!(result, Err(InvocationError::LeaseDenied { .. })));
    assert!(started.elapsed() < Duration::from_secs(1));

    harness.client.stop().await.unwrap();
}
