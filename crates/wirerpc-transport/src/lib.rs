//! Byte-message channel abstraction for wirerpc.
//!
//! The RPC layer only needs two things from a transport: a way to send one
//! complete message, and a stream of complete inbound messages. This crate
//! provides that contract ([`MessageChannel`]) plus:
//! - an in-memory pair for tests and same-process peers ([`memory_pair`])
//! - a length-prefixed adapter over any async byte stream ([`spawn_framed`])
//! - TCP and Unix socket endpoints built on that adapter ([`Endpoint`])

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod framed;
pub mod memory;
pub mod traits;

pub use codec::{CodecConfig, MessageCodec, DEFAULT_MAX_MESSAGE, HEADER_SIZE, MAGIC};
pub use endpoint::{connect, Endpoint, EndpointListener};
pub use error::{Result, TransportError};
pub use framed::spawn_framed;
pub use memory::memory_pair;
pub use traits::{MessageChannel, MessageSink};
