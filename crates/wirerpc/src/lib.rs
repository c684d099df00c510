//! Binary multiplexed RPC over any byte-message channel.
//!
//! Two peers exchange compact binary frames (request, notification, response,
//! cancel) over one channel. Calls are correlated by request id, so any number
//! of them can be outstanding at once. Arguments and results travel as JSON,
//! raw strings, or the schema-driven Fury encoding once both sides share a
//! protocol descriptor.
//!
//! # Crate Structure
//!
//! - [`packet`]: frame layout, `BinaryReader`/`BinaryWriter`
//! - [`transport`]: the `MessageChannel` contract, in-memory pairs, TCP and Unix sockets
//! - [`fury`]: type descriptors, the Fury value codec and protocol repositories
//! - [`connection`]: `Connection`, error envelopes, `ServiceRegistry`, `FuryRpc`
//!
//! ```no_run
//! use wirerpc::{Connection, Payload};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (left, right) = wirerpc::transport::memory_pair();
//! let client = Connection::new(left);
//! let server = Connection::new(right);
//! server.on_request("echo", |payload: Payload, _ctx: wirerpc::RequestContext| async move {
//!     Ok(payload)
//! });
//! client.listen()?;
//! server.listen()?;
//!
//! let reply = client.send_request("echo", Payload::raw("hi")).await?;
//! assert_eq!(reply.text()?, "hi");
//! # Ok(())
//! # }
//! ```

/// Re-export packet types.
pub mod packet {
    pub use wirerpc_packet::*;
}

/// Re-export transport types.
pub mod transport {
    pub use wirerpc_transport::*;
}

/// Re-export Fury codec and protocol types.
pub mod fury {
    pub use wirerpc_fury::*;
}

/// Re-export connection types.
pub mod connection {
    pub use wirerpc_connection::*;
}

pub use wirerpc_connection::{
    revive_error, Connection, ConnectionConfig, ConnectionError, ErrorEnvelope, FuryRpc,
    MethodStub, Payload, RegisterOptions, RemoteError, RequestContext, RpcInvokeProxy,
    RpcServiceMap, Service, ServiceError, ServiceRegistry,
};
pub use wirerpc_fury::{FieldDesc, ProtocolMethod, ProtocolRepository, TypeDesc};
pub use wirerpc_packet::Codec;
