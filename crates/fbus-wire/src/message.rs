//! Message framing: header, field array, metadata, and the builder.
//!
//! A wire message is `(yyyyuua(yv))` followed by the 8-aligned body: the
//! endianness tag, message type, flags, protocol version, body length,
//! serial, and the header-field array. [`Message`] owns one complete wire
//! image together with its parsed [`MessageMetadata`]; parsing validates
//! everything the router relies on, so a parse failure is a protocol
//! violation by the sending peer.

use fbus_types::protocol::{
    self, FIELD_DESTINATION, FIELD_ERROR_NAME, FIELD_INTERFACE, FIELD_MEMBER, FIELD_PATH,
    FIELD_REPLY_SERIAL, FIELD_SENDER, FIELD_SIGNATURE, FIELD_UNIX_FDS,
    HEADER_FLAG_NO_REPLY_EXPECTED, MESSAGE_SIZE_MAX, PROTOCOL_VERSION,
};
use fbus_types::{validate, MessageType, PeerId};

use crate::codec::{Endian, WireBuf, WireCursor};
use crate::signature::{split_complete_types, validate_signature};
use crate::value::{body_signature, Value};
use crate::WireError;

/// Upper bound on body arguments captured for match evaluation
/// (`arg0`..`arg63` in the match grammar).
const MATCH_ARGS_MAX: usize = 64;

/// A leading string-typed body argument, captured for match rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyArg {
    pub value: String,
    pub is_object_path: bool,
}

/// Decoded header fields of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    pub path: Option<String>,
    pub interface: Option<String>,
    pub member: Option<String>,
    pub error_name: Option<String>,
    pub reply_serial: Option<u32>,
    pub destination: Option<String>,
    pub sender: Option<String>,
    pub signature: Option<String>,
    pub unix_fds: u32,
}

/// Parsed metadata of one message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageMetadata {
    pub endian: Endian,
    /// Raw message-type byte; unknown values are preserved and rejected by
    /// the dispatcher, not the codec.
    pub raw_type: u8,
    pub kind: Option<MessageType>,
    pub flags: u8,
    pub serial: u32,
    pub fields: HeaderFields,
    /// The field array as decoded, unknown entries included, used to
    /// re-emit the header when the sender is stitched.
    pub raw_fields: Vec<(u8, Value)>,
    /// Leading `s`/`o` body arguments for match evaluation.
    pub args: Vec<BodyArg>,
}

impl MessageMetadata {
    /// The serial to correlate replies with: 0 when the sender declared it
    /// does not want a reply, so every reply path discards the message.
    #[must_use]
    pub fn read_serial(&self) -> u32 {
        if self.flags & HEADER_FLAG_NO_REPLY_EXPECTED != 0 {
            0
        } else {
            self.serial
        }
    }
}

/// One complete wire message.
#[derive(Debug, Clone)]
pub struct Message {
    data: Vec<u8>,
    body_start: usize,
    metadata: MessageMetadata,
}

impl Message {
    /// Parse a complete wire image.
    ///
    /// Validates framing, the field array (value types, duplicates, string
    /// grammars), the per-type required fields, and decodes the leading
    /// string body arguments. Anything that fails here is a malformed
    /// message.
    pub fn parse(data: Vec<u8>) -> Result<Self, WireError> {
        if data.len() > MESSAGE_SIZE_MAX {
            return Err(WireError::MessageTooLarge);
        }
        if data.len() < 16 {
            return Err(WireError::UnexpectedEof);
        }
        let endian = Endian::from_tag(data[0]).ok_or(WireError::BadEndianTag(data[0]))?;

        let mut cursor = WireCursor::new(&data, endian);
        let _tag = cursor.read_u8()?;
        let raw_type = cursor.read_u8()?;
        let flags = cursor.read_u8()?;
        let version = cursor.read_u8()?;
        if version != PROTOCOL_VERSION {
            return Err(WireError::BadProtocolVersion(version));
        }
        let body_len = cursor.read_u32()? as usize;
        let serial = cursor.read_u32()?;

        let raw_fields = read_field_array(&mut cursor)?;
        cursor.align_to(8)?;
        let body_start = cursor.offset();
        if data.len() - body_start != body_len {
            return Err(WireError::BodyLengthMismatch);
        }

        let fields = decode_fields(&raw_fields)?;
        let kind = MessageType::from_raw(raw_type);
        if let Some(kind) = kind {
            check_required_fields(kind, &fields)?;
        }

        let args = capture_match_args(&data[body_start..], endian, fields.signature.as_deref())?;

        Ok(Self {
            data,
            body_start,
            metadata: MessageMetadata {
                endian,
                raw_type,
                kind,
                flags,
                serial,
                fields,
                raw_fields,
                args,
            },
        })
    }

    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &MessageMetadata {
        &self.metadata
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Total size in bytes, the unit of queue quota accounting.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.data[self.body_start..]
    }

    /// See [`MessageMetadata::read_serial`].
    #[inline]
    #[must_use]
    pub fn read_serial(&self) -> u32 {
        self.metadata.read_serial()
    }

    /// Decode the body against a declared signature.
    pub fn read_body(&self, sig: &str) -> Result<Vec<Value>, WireError> {
        crate::value::read_body(self.body(), self.metadata.endian, sig)
    }

    /// Overwrite the SENDER header field with the sending peer's unique
    /// name. Clients cannot forge identity; the broker stamps every routed
    /// message. All other fields and the body bytes are preserved.
    pub fn stitch_sender(&mut self, id: PeerId) {
        let unique = id.unique_name();
        let entry = (FIELD_SENDER, Value::Str(unique.clone()));
        if let Some(slot) = self
            .metadata
            .raw_fields
            .iter_mut()
            .find(|(code, _)| *code == FIELD_SENDER)
        {
            *slot = entry;
        } else {
            self.metadata.raw_fields.push(entry);
        }
        self.metadata.fields.sender = Some(unique);
        self.reassemble();
    }

    /// Re-encode header + field array around the unchanged body bytes.
    fn reassemble(&mut self) {
        let body = self.data[self.body_start..].to_vec();
        let mut buf = WireBuf::new(self.metadata.endian);
        buf.push_u8(self.metadata.endian.tag());
        buf.push_u8(self.metadata.raw_type);
        buf.push_u8(self.metadata.flags);
        buf.push_u8(PROTOCOL_VERSION);
        buf.push_u32(body.len() as u32);
        buf.push_u32(self.metadata.serial);
        write_field_array(&mut buf, &self.metadata.raw_fields);
        buf.pad_to(8);
        self.body_start = buf.len();
        buf.push_bytes(&body);
        self.data = buf.into_vec();
    }
}

fn read_field_array(cursor: &mut WireCursor<'_>) -> Result<Vec<(u8, Value)>, WireError> {
    let len = cursor.read_u32()? as usize;
    cursor.align_to(8)?;
    let end = cursor.offset() + len;
    let mut entries = Vec::new();
    while cursor.offset() < end {
        cursor.align_to(8)?;
        let code = cursor.read_u8()?;
        let value = Value::read(cursor, "v")?;
        let Value::Variant(inner) = value else {
            return Err(WireError::InvalidValue);
        };
        if entries.iter().any(|(c, _)| *c == code) {
            return Err(WireError::DuplicateHeaderField(code));
        }
        entries.push((code, *inner));
    }
    if cursor.offset() != end {
        return Err(WireError::InvalidValue);
    }
    Ok(entries)
}

fn write_field_array(buf: &mut WireBuf, entries: &[(u8, Value)]) {
    let slot = buf.reserve_u32();
    buf.pad_to(8);
    let start = buf.len();
    for (code, value) in entries {
        buf.pad_to(8);
        buf.push_u8(*code);
        Value::Variant(Box::new(value.clone())).write(buf);
    }
    buf.patch_u32(slot, (buf.len() - start) as u32);
}

fn field_str<'a>(
    value: &'a Value,
    want_path: bool,
    valid: impl Fn(&str) -> bool,
) -> Result<&'a str, WireError> {
    let s = match (want_path, value) {
        (true, Value::ObjectPath(s)) | (false, Value::Str(s)) => s.as_str(),
        _ => return Err(WireError::BadHeaderField),
    };
    if !valid(s) {
        return Err(WireError::BadHeaderField);
    }
    Ok(s)
}

fn decode_fields(entries: &[(u8, Value)]) -> Result<HeaderFields, WireError> {
    let mut fields = HeaderFields::default();
    for (code, value) in entries {
        match *code {
            FIELD_PATH => {
                fields.path =
                    Some(field_str(value, true, validate::validate_object_path)?.to_owned());
            }
            FIELD_INTERFACE => {
                fields.interface =
                    Some(field_str(value, false, validate::validate_interface)?.to_owned());
            }
            FIELD_MEMBER => {
                fields.member =
                    Some(field_str(value, false, validate::validate_member)?.to_owned());
            }
            FIELD_ERROR_NAME => {
                fields.error_name =
                    Some(field_str(value, false, validate::validate_error_name)?.to_owned());
            }
            FIELD_REPLY_SERIAL => {
                fields.reply_serial = Some(value.as_u32().ok_or(WireError::BadHeaderField)?);
            }
            FIELD_DESTINATION => {
                fields.destination =
                    Some(field_str(value, false, validate::validate_name)?.to_owned());
            }
            FIELD_SENDER => {
                fields.sender = Some(field_str(value, false, validate::validate_name)?.to_owned());
            }
            FIELD_SIGNATURE => {
                let Value::Signature(sig) = value else {
                    return Err(WireError::BadHeaderField);
                };
                validate_signature(sig)?;
                fields.signature = Some(sig.clone());
            }
            FIELD_UNIX_FDS => {
                fields.unix_fds = value.as_u32().ok_or(WireError::BadHeaderField)?;
            }
            // Unknown header fields must be ignored (and are preserved
            // verbatim in raw_fields).
            _ => {}
        }
    }
    Ok(fields)
}

fn check_required_fields(kind: MessageType, fields: &HeaderFields) -> Result<(), WireError> {
    let ok = match kind {
        MessageType::MethodCall => fields.path.is_some() && fields.member.is_some(),
        MessageType::MethodReturn => fields.reply_serial.is_some(),
        MessageType::Error => fields.error_name.is_some() && fields.reply_serial.is_some(),
        MessageType::Signal => {
            fields.path.is_some() && fields.interface.is_some() && fields.member.is_some()
        }
    };
    if ok {
        Ok(())
    } else {
        Err(WireError::MissingRequiredField)
    }
}

/// Decode the leading `s`/`o` body arguments, stopping at the first other
/// type. Match rules can only constrain string-typed arguments.
fn capture_match_args(
    body: &[u8],
    endian: Endian,
    signature: Option<&str>,
) -> Result<Vec<BodyArg>, WireError> {
    let Some(sig) = signature else {
        return Ok(Vec::new());
    };
    let mut cursor = WireCursor::new(body, endian);
    let mut args = Vec::new();
    for ty in split_complete_types(sig)? {
        if args.len() == MATCH_ARGS_MAX || !matches!(ty, "s" | "o") {
            break;
        }
        let value = Value::read(&mut cursor, ty)?;
        match value {
            Value::Str(s) => args.push(BodyArg {
                value: s,
                is_object_path: false,
            }),
            Value::ObjectPath(s) => args.push(BodyArg {
                value: s,
                is_object_path: true,
            }),
            _ => break,
        }
    }
    Ok(args)
}

/// Builder for complete wire messages.
///
/// Header fields are emitted in the order the setters are called, which lets
/// the driver reproduce the reference field ordering byte for byte. The
/// SIGNATURE field is derived from the body values automatically.
#[derive(Debug)]
pub struct MessageBuilder {
    kind: MessageType,
    flags: u8,
    serial: u32,
    endian: Endian,
    fields: Vec<(u8, Value)>,
    body: Vec<Value>,
    signature_at: Option<usize>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            flags: 0,
            serial: 0,
            endian: Endian::NATIVE,
            fields: Vec::with_capacity(6),
            body: Vec::new(),
            signature_at: None,
        }
    }

    /// Emit the SIGNATURE field at this position, even when the body turns
    /// out to be empty. Without this, the field is appended last and only
    /// for non-empty bodies.
    #[must_use]
    pub fn signature_field(mut self) -> Self {
        self.signature_at = Some(self.fields.len());
        self.fields
            .push((FIELD_SIGNATURE, Value::Signature(String::new())));
        self
    }

    #[must_use]
    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn serial(mut self, serial: u32) -> Self {
        self.serial = serial;
        self
    }

    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.fields
            .push((FIELD_PATH, Value::ObjectPath(path.to_owned())));
        self
    }

    #[must_use]
    pub fn interface(mut self, interface: &str) -> Self {
        self.fields
            .push((FIELD_INTERFACE, Value::Str(interface.to_owned())));
        self
    }

    #[must_use]
    pub fn member(mut self, member: &str) -> Self {
        self.fields
            .push((FIELD_MEMBER, Value::Str(member.to_owned())));
        self
    }

    #[must_use]
    pub fn error_name(mut self, error_name: &str) -> Self {
        self.fields
            .push((FIELD_ERROR_NAME, Value::Str(error_name.to_owned())));
        self
    }

    #[must_use]
    pub fn reply_serial(mut self, serial: u32) -> Self {
        self.fields
            .push((FIELD_REPLY_SERIAL, Value::Uint32(serial)));
        self
    }

    #[must_use]
    pub fn destination(mut self, destination: &str) -> Self {
        self.fields
            .push((FIELD_DESTINATION, Value::Str(destination.to_owned())));
        self
    }

    #[must_use]
    pub fn sender(mut self, sender: &str) -> Self {
        self.fields.push((FIELD_SENDER, Value::Str(sender.to_owned())));
        self
    }

    #[must_use]
    pub fn arg(mut self, value: Value) -> Self {
        self.body.push(value);
        self
    }

    /// Encode and re-parse, so the result carries validated metadata like
    /// any message taken off a socket.
    pub fn build(mut self) -> Result<Message, WireError> {
        let sig = body_signature(&self.body);
        if let Some(at) = self.signature_at {
            self.fields[at].1 = Value::Signature(sig);
        } else if !sig.is_empty() {
            self.fields.push((FIELD_SIGNATURE, Value::Signature(sig)));
        }

        let mut buf = WireBuf::new(self.endian);
        buf.push_u8(self.endian.tag());
        buf.push_u8(self.kind.as_raw());
        buf.push_u8(self.flags);
        buf.push_u8(PROTOCOL_VERSION);
        let body_len_slot = buf.reserve_u32();
        buf.push_u32(self.serial);
        write_field_array(&mut buf, &self.fields);
        buf.pad_to(8);
        let body_start = buf.len();
        crate::value::write_body(&self.body, &mut buf);
        let body_len = (buf.len() - body_start) as u32;
        buf.patch_u32(body_len_slot, body_len);

        Message::parse(buf.into_vec())
    }
}
