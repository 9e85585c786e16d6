//! Wire-codec seam.
//!
//! The codec that moves messages between apps (length-prefixed
//! MessagePack in the reference protocol) lives outside the core. The
//! runtime only needs this trait: the app installs a codec together
//! with its transport, and the engine hands outbound cross-app messages
//! to it.

use crate::Msg;
use plexus_types::ErrorCode;
use thiserror::Error;

/// Errors at the codec boundary.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The message could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The byte buffer could not be decoded into a message.
    #[error("decode failed: {0}")]
    Decode(String),
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::Encode(_) => "CODEC_ENCODE_FAILED",
            Self::Decode(_) => "CODEC_DECODE_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Encodes and decodes messages at the app boundary.
///
/// Implementations live with the transport, not in the core. Encoding
/// must be loss-free for every [`Msg`] variant; `decode(encode(m))`
/// reproduces `m` up to property-map ordering.
pub trait MsgCodec: Send + Sync {
    /// Encodes a message into a transport buffer.
    fn encode(&self, msg: &Msg) -> Result<Vec<u8>, CodecError>;

    /// Decodes a transport buffer into a message.
    fn decode(&self, bytes: &[u8]) -> Result<Msg, CodecError>;
}
