//! Fury: a schema-driven compact binary codec for wirerpc payloads.
//!
//! Both peers agree on a [`ProtocolMethod`] descriptor per remote method.
//! Arguments are written positionally with no field names or type tags, so
//! the descriptor is the only way to read them back. Descriptors are plain
//! JSON and can be embedded or loaded from a directory through a
//! [`ProtocolRepository`].

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod repository;
pub mod types;

pub use codec::{decode_value, encode_value};
pub use config::RepositoryConfig;
pub use error::{FuryError, Result};
pub use protocol::{ProtocolMethod, ResponseDesc};
pub use repository::ProtocolRepository;
pub use types::{FieldDesc, TypeDesc};
