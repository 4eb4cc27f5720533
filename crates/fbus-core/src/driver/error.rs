//! Driver error kinds and their wire mapping.
//!
//! Every internal kind carries the exact human-readable string the
//! reference broker puts on the wire; the mapping to DBus error names is
//! just as fixed, including the historical `UnkonwnProperty` spelling.
//! Kinds without a wire name are never answered over the bus: protocol
//! violations drop the transport, fatal errors stop the broker.

use thiserror::Error;

use fbus_wire::WireError;

/// Host-level failure; the event loop terminates the broker on these.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("failed to encode a broker-originated message: {0}")]
    Encode(#[from] WireError),
}

/// Outcome of one dispatch, as seen by the transport layer.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The peer misbehaved on the protocol level; drop its transport.
    #[error("protocol violation")]
    ProtocolViolation,
    /// The broker itself failed; tear the process down.
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// Internal error kinds of the driver subsystem.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Invalid message body")]
    InvalidMessage,
    #[error("Message forwarding attempted without calling Hello()")]
    PeerNotRegistered,
    #[error("Hello() was not yet called")]
    PeerNotYetRegistered,
    #[error("Hello() already called")]
    PeerAlreadyRegistered,
    #[error("The caller does not have the necessary privileged to call this method")]
    PeerNotPrivileged,
    #[error("Unexpected message type")]
    UnexpectedMessageType,
    #[error("Invalid object path")]
    UnexpectedPath,
    #[error("Invalid interface")]
    UnexpectedInterface,
    #[error("Invalid method call")]
    UnexpectedMethod,
    #[error("Invalid property")]
    UnexpectedProperty,
    #[error("Cannot set read-only property")]
    ReadonlyProperty,
    #[error("Invalid signature for method")]
    UnexpectedSignature,
    #[error("No pending reply with that serial")]
    UnexpectedReply,
    #[error("Request could not be forwarded to the parent process")]
    ForwardFailed,
    #[error("Sending user's quota exceeded")]
    Quota,
    #[error("Invalid flags")]
    UnexpectedFlags,
    #[error("User is not authorized to update environment variables")]
    UnexpectedEnvironmentUpdate,
    #[error("Sender is not authorized to send message")]
    SendDenied,
    #[error("Receiver is not authorized to receive message")]
    ReceiveDenied,
    #[error("Pending reply with that serial already exists")]
    ExpectedReplyExists,
    #[error("org.freedesktop.DBus is a reserved name")]
    NameReserved,
    #[error("The name is a unique name")]
    NameUnique,
    #[error("The name is not a valid well-known name")]
    NameInvalid,
    #[error("Request to own name refused by policy")]
    NameRefused,
    #[error("The name does not exist")]
    NameNotFound,
    #[error("The name is not activatable")]
    NameNotActivatable,
    #[error("The name does not have an owner")]
    NameOwnerNotFound,
    #[error("The connection does not exist")]
    PeerNotFound,
    #[error("Destination does not exist")]
    DestinationNotFound,
    #[error("Invalid match rule")]
    MatchInvalid,
    #[error("The match does not exist")]
    MatchNotFound,
    #[error("Solaris ADT is not supported")]
    AdtNotSupported,
    #[error("SELinux is not supported")]
    SelinuxNotSupported,
    /// Never reported over the bus; the transport drops the peer.
    #[error("protocol violation")]
    ProtocolViolation,
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl DriverError {
    /// The DBus error name this kind is reported as, or `None` for kinds
    /// that are not answered over the bus.
    #[must_use]
    pub fn dbus_error_name(&self) -> Option<&'static str> {
        match self {
            Self::PeerAlreadyRegistered => Some("org.freedesktop.DBus.Error.Failed"),
            Self::PeerNotYetRegistered
            | Self::UnexpectedPath
            | Self::UnexpectedMessageType
            | Self::UnexpectedReply
            | Self::UnexpectedEnvironmentUpdate
            | Self::ExpectedReplyExists
            | Self::SendDenied
            | Self::ReceiveDenied
            | Self::PeerNotPrivileged
            | Self::NameRefused => Some("org.freedesktop.DBus.Error.AccessDenied"),
            Self::UnexpectedInterface => Some("org.freedesktop.DBus.Error.UnknownInterface"),
            Self::UnexpectedMethod => Some("org.freedesktop.DBus.Error.UnknownMethod"),
            // the reference spelling, preserved bit for bit
            Self::UnexpectedProperty => Some("org.freedesktop.DBus.Error.UnkonwnProperty"),
            Self::ReadonlyProperty => Some("org.freedesktop.DBus.Error.PropertyReadOnly"),
            Self::UnexpectedSignature
            | Self::UnexpectedFlags
            | Self::NameReserved
            | Self::NameUnique
            | Self::NameInvalid => Some("org.freedesktop.DBus.Error.InvalidArgs"),
            Self::ForwardFailed | Self::Quota => {
                Some("org.freedesktop.DBus.Error.LimitsExceeded")
            }
            Self::PeerNotFound
            | Self::NameNotFound
            | Self::NameOwnerNotFound
            | Self::DestinationNotFound => Some("org.freedesktop.DBus.Error.NameHasNoOwner"),
            Self::NameNotActivatable => Some("org.freedesktop.DBus.Error.ServiceUnknown"),
            Self::MatchInvalid => Some("org.freedesktop.DBus.Error.MatchRuleInvalid"),
            Self::MatchNotFound => Some("org.freedesktop.DBus.Error.MatchRuleNotFound"),
            Self::AdtNotSupported => Some("org.freedesktop.DBus.Error.AdtAuditDataUnknown"),
            Self::SelinuxNotSupported => {
                Some("org.freedesktop.DBus.Error.SELinuxSecurityContextUnknown")
            }
            Self::InvalidMessage
            | Self::PeerNotRegistered
            | Self::ProtocolViolation
            | Self::Fatal(_) => None,
        }
    }
}
