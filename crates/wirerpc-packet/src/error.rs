/// Errors that can occur while encoding or decoding RPC frames.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// A read went past the end of the message.
    #[error("packet truncated (needed {needed} bytes at offset {offset}, {available} available)")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The header carries an rpc type this implementation does not know.
    #[error("unknown rpc type {0}")]
    UnknownRpcType(u8),

    /// The header carries a codec this implementation does not know.
    #[error("unknown codec {0}")]
    UnknownCodec(u8),

    /// A varint did not terminate within the width of its target integer.
    #[error("varint overflows {0} bits")]
    VarintOverflow(u32),

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid utf-8 in packet: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// A length does not fit the prefix used on the wire.
    #[error("content too large ({size} bytes, max {max})")]
    ContentTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, PacketError>;
