//! Multiplexed RPC over a byte-message channel.
//!
//! A [`Connection`] owns one [`MessageChannel`](wirerpc_transport::MessageChannel),
//! correlates outgoing requests with their responses by request id, and
//! dispatches inbound requests and notifications to registered handlers.
//! Failures inside a handler travel back as an [`ErrorEnvelope`] and come out
//! on the calling side as a [`RemoteError`].
//!
//! On top of that:
//! - [`ServiceRegistry`] is a dynamic name → function table with change events
//! - [`FuryRpc`] serves and calls methods described by
//!   [`ProtocolMethod`](wirerpc_fury::ProtocolMethod) descriptors, using the
//!   compact Fury codec when a descriptor is loaded and JSON otherwise

pub mod config;
pub mod connection;
pub mod error;
pub mod error_like;
pub mod handler;
pub mod payload;
pub mod proxy;
pub mod registry;

mod locks;

pub use config::{ConnectionConfig, DEFAULT_MAX_ABANDONED};
pub use connection::Connection;
pub use error::{ConnectionError, Result};
pub use error_like::{revive_error, ErrorEnvelope, RemoteError};
pub use handler::{
    BoxFuture, HandlerResult, NotificationFallback, NotificationHandler, RequestContext,
    RequestFallback, RequestHandler,
};
pub use payload::Payload;
pub use proxy::{FuryRpc, MethodImpl, MethodStub, RpcInvokeProxy, RpcService, RpcServiceMap};
pub use registry::{RegisterOptions, Service, ServiceError, ServiceRegistry};
