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

//! Invocation pipeline
//!
//! ## Purpose
//! Converts typed calls into wire frames and back. Outbound: resolve the
//! routing lease, serialize arguments, register the pending call, await the
//! correlated response. Inbound: hand the decoded frame to the execution
//! system, which owns activation and per-actor serialization. Remote errors
//! come back with their original kind tag and message preserved.
//!
//! ## Serializer boundary
//! The wire encoding of arguments and results is pluggable through the
//! [`Serializer`] trait; [`serde_json::Value`] is the neutral in-memory
//! form, so any self-describing encoding can implement the trait. The
//! default is JSON.

use crate::execution::ExecutionSystem;
use crate::message_handler::MessageHandler;
use crate::addressable_leaser::AddressableLeaser;
use plexmesh_core::wire::InvocationFrame;
use plexmesh_core::{AddressableReference, InvocationError, SerializationError, TransportError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Pluggable payload encoding.
pub trait Serializer: Send + Sync {
    /// Content type tag for diagnostics.
    fn content_type(&self) -> &'static str;

    /// Encode the neutral value into wire bytes.
    fn encode(&self, value: serde_json::Value) -> Result<Vec<u8>, SerializationError>;

    /// Decode wire bytes into the neutral value.
    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, SerializationError>;
}

/// JSON serializer, the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, value: serde_json::Value) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(&value).map_err(|e| SerializationError(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, SerializationError> {
        serde_json::from_slice(bytes).map_err(|e| SerializationError(e.to_string()))
    }
}

/// Encode a typed value through a serializer.
pub fn encode_typed<T: Serialize>(
    serializer: &dyn Serializer,
    value: &T,
) -> Result<Vec<u8>, SerializationError> {
    let value = serde_json::to_value(value).map_err(|e| SerializationError(e.to_string()))?;
    serializer.encode(value)
}

/// Decode a typed value through a serializer.
pub fn decode_typed<T: DeserializeOwned>(
    serializer: &dyn Serializer,
    bytes: &[u8],
) -> Result<T, SerializationError> {
    let value = serializer.decode(bytes)?;
    serde_json::from_value(value).map_err(|e| SerializationError(e.to_string()))
}

/// Outbound call construction and inbound dispatch.
pub struct InvocationSystem {
    serializer: Arc<dyn Serializer>,
    message_handler: Arc<MessageHandler>,
    execution: Arc<ExecutionSystem>,
    leaser: AddressableLeaser,
    default_timeout: Duration,
}

impl InvocationSystem {
    /// Wire the pipeline together.
    pub fn new(
        serializer: Arc<dyn Serializer>,
        message_handler: Arc<MessageHandler>,
        execution: Arc<ExecutionSystem>,
        leaser: AddressableLeaser,
        default_timeout: Duration,
    ) -> Self {
        InvocationSystem {
            serializer,
            message_handler,
            execution,
            leaser,
            default_timeout,
        }
    }

    /// The configured serializer.
    pub fn serializer(&self) -> Arc<dyn Serializer> {
        self.serializer.clone()
    }

    /// Default deadline applied when a caller does not pick one.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Issue a typed outbound invocation.
    ///
    /// Arguments are conventionally tuples, mirroring the method
    /// parameters, e.g. `&("x",)`.
    pub async fn invoke_typed<A, R>(
        &self,
        reference: AddressableReference,
        method: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<R, InvocationError>
    where
        A: Serialize + Sync,
        R: DeserializeOwned,
    {
        let payload = encode_typed(self.serializer.as_ref(), args)?;
        let result = self.invoke_raw(reference, method, payload, timeout).await?;
        Ok(decode_typed(self.serializer.as_ref(), &result)?)
    }

    /// Issue an outbound invocation with pre-serialized arguments.
    ///
    /// Exactly one of response, remote error, timeout or transport error
    /// completes the call.
    pub async fn invoke_raw(
        &self,
        reference: AddressableReference,
        method: &str,
        args: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, InvocationError> {
        // The cache answers repeat targets; a miss asks the directory for
        // the routing lease first.
        self.leaser.resolve(&reference).await?;

        let receiver = self
            .message_handler
            .send(reference, method.to_string(), args, timeout)
            .await?;
        match receiver.await {
            Ok(result) => result,
            // Completion sink dropped without firing: the client shut down.
            Err(_) => Err(TransportError::StreamClosed.into()),
        }
    }

    /// Route an inbound invocation onto the execution system.
    pub async fn dispatch_inbound(&self, frame: InvocationFrame) {
        self.execution.enqueue(frame).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let serializer = JsonSerializer;
        let bytes = encode_typed(&serializer, &("x".to_string(), 5u8)).unwrap();
        let back: (String, u8) = decode_typed(&serializer, &bytes).unwrap();
        assert_eq!(back, ("x".to_string(), 5));
    }

    #[test]
    fn test_malformed_payload_is_serialization_error() {
        let serializer = JsonSerializer;
        let err = decode_typed::<(String,)>(&serializer, b"{broken").unwrap_err();
        assert!(err.to_string().contains("serialization error"));
    }

    #[test]
    fn test_content_type() {
        assert_eq!(JsonSerializer.content_type(), "application/json");
    }
}
