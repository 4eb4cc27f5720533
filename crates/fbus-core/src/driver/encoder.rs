//! Encoding of broker-originated messages.
//!
//! Three shapes leave the driver: method returns, errors, and signals. All
//! carry `SENDER = "org.freedesktop.DBus"`, serial 0 (receivers correlate
//! via REPLY_SERIAL), and the `NO_REPLY_EXPECTED` flag on replies. Field
//! order matches the reference broker byte for byte, including the
//! always-present signature field.

use fbus_types::protocol::{DRIVER_NAME, DRIVER_PATH, HEADER_FLAG_NO_REPLY_EXPECTED};
use fbus_types::{MessageType, PeerId};
use fbus_wire::{Message, MessageBuilder, Value};

use crate::driver::error::FatalError;

/// A method return to `dest`, answering its call with serial
/// `reply_serial`.
pub(crate) fn method_return(
    dest: PeerId,
    reply_serial: u32,
    body: Vec<Value>,
) -> Result<Message, FatalError> {
    let mut builder = MessageBuilder::new(MessageType::MethodReturn)
        .flags(HEADER_FLAG_NO_REPLY_EXPECTED)
        .reply_serial(reply_serial)
        .sender(DRIVER_NAME)
        .destination(&dest.unique_name())
        .signature_field();
    for value in body {
        builder = builder.arg(value);
    }
    Ok(builder.build()?)
}

/// An error reply; the body is one string of human-readable text.
pub(crate) fn error(
    dest: PeerId,
    reply_serial: u32,
    error_name: &str,
    text: &str,
) -> Result<Message, FatalError> {
    Ok(MessageBuilder::new(MessageType::Error)
        .flags(HEADER_FLAG_NO_REPLY_EXPECTED)
        .reply_serial(reply_serial)
        .sender(DRIVER_NAME)
        .error_name(error_name)
        .signature_field()
        .destination(&dest.unique_name())
        .arg(Value::Str(text.to_owned()))
        .build()?)
}

/// A driver signal: unicast when `dest` is given (`NameAcquired`,
/// `NameLost`), broadcast otherwise (`NameOwnerChanged`).
pub(crate) fn signal(
    dest: Option<PeerId>,
    member: &str,
    body: Vec<Value>,
) -> Result<Message, FatalError> {
    let mut builder = MessageBuilder::new(MessageType::Signal)
        .flags(HEADER_FLAG_NO_REPLY_EXPECTED)
        .sender(DRIVER_NAME);
    if let Some(dest) = dest {
        builder = builder.destination(&dest.unique_name());
    }
    builder = builder
        .path(DRIVER_PATH)
        .interface(DRIVER_NAME)
        .member(member)
        .signature_field();
    for value in body {
        builder = builder.arg(value);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    use fbus_types::protocol::FIELD_SIGNATURE;

    #[test]
    fn method_return_header_shape() {
        let msg = method_return(PeerId::new(3), 7, vec![Value::Str(":1.3".into())])
            .expect("encode should succeed");
        let meta = msg.metadata();
        assert_eq!(meta.kind, Some(MessageType::MethodReturn));
        assert_eq!(meta.serial, 0);
        assert_eq!(meta.flags, HEADER_FLAG_NO_REPLY_EXPECTED);
        assert_eq!(meta.fields.reply_serial, Some(7));
        assert_eq!(meta.fields.sender.as_deref(), Some(DRIVER_NAME));
        assert_eq!(meta.fields.destination.as_deref(), Some(":1.3"));
        assert_eq!(meta.fields.signature.as_deref(), Some("s"));
    }

    #[test]
    fn unit_reply_still_carries_signature_field() {
        let msg = method_return(PeerId::new(3), 7, vec![]).expect("encode should succeed");
        assert!(msg
            .metadata()
            .raw_fields
            .iter()
            .any(|(code, _)| *code == FIELD_SIGNATURE));
        assert_eq!(msg.metadata().fields.signature.as_deref(), Some(""));
    }

    #[test]
    fn error_body_is_the_text() {
        let msg = error(
            PeerId::new(1),
            9,
            "org.freedesktop.DBus.Error.NameHasNoOwner",
            "The name does not have an owner",
        )
        .expect("encode should succeed");
        let meta = msg.metadata();
        assert_eq!(meta.kind, Some(MessageType::Error));
        assert_eq!(
            meta.fields.error_name.as_deref(),
            Some("org.freedesktop.DBus.Error.NameHasNoOwner")
        );
        let body = msg.read_body("s").expect("body should decode");
        assert_eq!(
            body[0],
            Value::Str("The name does not have an owner".into())
        );
    }

    #[test]
    fn signal_destination_is_optional() {
        let unicast = signal(
            Some(PeerId::new(2)),
            "NameAcquired",
            vec![Value::Str("com.x".into())],
        )
        .expect("encode should succeed");
        assert_eq!(unicast.metadata().fields.destination.as_deref(), Some(":1.2"));
        assert_eq!(unicast.metadata().fields.path.as_deref(), Some(DRIVER_PATH));

        let broadcast = signal(
            None,
            "NameOwnerChanged",
            vec![
                Value::Str("com.x".into()),
                Value::Str(String::new()),
                Value::Str(":1.2".into()),
            ],
        )
        .expect("encode should succeed");
        assert_eq!(broadcast.metadata().fields.destination, None);
        assert_eq!(broadcast.metadata().args[0].value, "com.x");
    }
}
