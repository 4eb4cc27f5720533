//! DBus 1.0 wire codec for FrankenBus.
//!
//! This is not a general-purpose marshaling library; it covers exactly what
//! the broker needs: header framing and metadata validation for every routed
//! message, and typed bodies for the driver's own calls and replies. Readers
//! accept both byte orders; the broker emits host order.

pub mod codec;
pub mod message;
pub mod signature;
pub mod value;

use thiserror::Error;

pub use codec::{Endian, WireBuf, WireCursor};
pub use message::{BodyArg, HeaderFields, Message, MessageBuilder, MessageMetadata};
pub use value::Value;

/// Errors of the wire codec.
///
/// Every variant means the input byte stream is not a valid message; the
/// dispatcher treats all of them as a protocol violation by the sender.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected end of message data")]
    UnexpectedEof,
    #[error("alignment padding contains non-zero bytes")]
    NonZeroPadding,
    #[error("boolean encoded as {0}, expected 0 or 1")]
    InvalidBool(u32),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("string is not NUL-terminated or embeds NUL")]
    UnterminatedString,
    #[error("malformed type signature")]
    InvalidSignature,
    #[error("malformed marshaled value")]
    InvalidValue,
    #[error("trailing bytes after the final body value")]
    TrailingBytes,
    #[error("message exceeds the maximum message size")]
    MessageTooLarge,
    #[error("unknown endianness tag {0:#x}")]
    BadEndianTag(u8),
    #[error("unsupported protocol version {0}")]
    BadProtocolVersion(u8),
    #[error("body length field disagrees with the message size")]
    BodyLengthMismatch,
    #[error("duplicate header field {0}")]
    DuplicateHeaderField(u8),
    #[error("header field has the wrong type or an invalid value")]
    BadHeaderField,
    #[error("message type is missing a required header field")]
    MissingRequiredField,
}
