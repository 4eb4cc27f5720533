//! Constants of the DBus 1.0 wire protocol.
//!
//! Everything the broker hard-codes about the protocol lives here: message
//! types, header flags, header field codes, and the reply codes of the
//! name-ownership and activation calls.
//!
//! See: <https://dbus.freedesktop.org/doc/dbus-specification.html>

/// Major protocol version carried in every message header.
pub const PROTOCOL_VERSION: u8 = 1;

/// The bus's own reserved name. Always owned by the driver, never by a peer.
pub const DRIVER_NAME: &str = "org.freedesktop.DBus";

/// Canonical object path of the driver.
pub const DRIVER_PATH: &str = "/org/freedesktop/DBus";

/// Prefix of every unique name handed out by this broker.
pub const UNIQUE_NAME_PREFIX: &str = ":1.";

/// Maximum length of any bus name, interface, member, or error name.
pub const NAME_LENGTH_MAX: usize = 255;

/// Maximum length of a body signature.
pub const SIGNATURE_LENGTH_MAX: usize = 255;

/// Maximum total size of a single message (2^27, per the DBus spec).
pub const MESSAGE_SIZE_MAX: usize = 1 << 27;

/// Endianness tag bytes in the first header byte.
pub const ENDIAN_LITTLE: u8 = b'l';
pub const ENDIAN_BIG: u8 = b'B';

/// Message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    MethodCall = 1,
    MethodReturn = 2,
    Error = 3,
    Signal = 4,
}

impl MessageType {
    /// Decode a raw type byte. Unknown values are preserved by the codec
    /// but routed as [`None`] here so the dispatcher can reject them.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::MethodCall),
            2 => Some(Self::MethodReturn),
            3 => Some(Self::Error),
            4 => Some(Self::Signal),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self as u8
    }
}

/// Header flag: the sender does not want a method return.
pub const HEADER_FLAG_NO_REPLY_EXPECTED: u8 = 0x1;
/// Header flag: do not launch an activatable owner for the destination.
pub const HEADER_FLAG_NO_AUTO_START: u8 = 0x2;
/// Header flag: interactive authorization is permitted (ignored by us).
pub const HEADER_FLAG_ALLOW_INTERACTIVE_AUTHORIZATION: u8 = 0x4;
/// All flag bits the protocol defines; the rest must be ignored on input.
pub const HEADER_FLAGS_ALL: u8 = 0x7;

/// Header field codes of the `a(yv)` field array.
pub const FIELD_PATH: u8 = 1;
pub const FIELD_INTERFACE: u8 = 2;
pub const FIELD_MEMBER: u8 = 3;
pub const FIELD_ERROR_NAME: u8 = 4;
pub const FIELD_REPLY_SERIAL: u8 = 5;
pub const FIELD_DESTINATION: u8 = 6;
pub const FIELD_SENDER: u8 = 7;
pub const FIELD_SIGNATURE: u8 = 8;
pub const FIELD_UNIX_FDS: u8 = 9;

/// `RequestName` input flags.
pub const REQUEST_NAME_FLAG_ALLOW_REPLACEMENT: u32 = 0x1;
pub const REQUEST_NAME_FLAG_REPLACE_EXISTING: u32 = 0x2;
pub const REQUEST_NAME_FLAG_DO_NOT_QUEUE: u32 = 0x4;

/// `RequestName` reply codes.
pub const REQUEST_NAME_REPLY_PRIMARY_OWNER: u32 = 1;
pub const REQUEST_NAME_REPLY_IN_QUEUE: u32 = 2;
pub const REQUEST_NAME_REPLY_EXISTS: u32 = 3;
pub const REQUEST_NAME_REPLY_ALREADY_OWNER: u32 = 4;

/// `ReleaseName` reply codes.
pub const RELEASE_NAME_REPLY_RELEASED: u32 = 1;
pub const RELEASE_NAME_REPLY_NON_EXISTENT: u32 = 2;
pub const RELEASE_NAME_REPLY_NOT_OWNER: u32 = 3;

/// `StartServiceByName` reply codes.
pub const START_REPLY_SUCCESS: u32 = 1;
pub const START_REPLY_ALREADY_RUNNING: u32 = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_round_trip() {
        for raw in 1..=4u8 {
            let ty = MessageType::from_raw(raw).unwrap();
            assert_eq!(ty.as_raw(), raw);
        }
        assert_eq!(MessageType::from_raw(0), None);
        assert_eq!(MessageType::from_raw(5), None);
    }

    #[test]
    fn flags_cover_all_defined_bits() {
        assert_eq!(
            HEADER_FLAG_NO_REPLY_EXPECTED
                | HEADER_FLAG_NO_AUTO_START
                | HEADER_FLAG_ALLOW_INTERACTIVE_AUTHORIZATION,
            HEADER_FLAGS_ALL
        );
    }
}
