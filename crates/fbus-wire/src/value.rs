//! Dynamically-typed marshaled values.
//!
//! [`Value`] covers the wire types the broker traffics in. Decoding is
//! signature-driven: the caller supplies one complete type per value, as
//! declared by a method table entry or carried in a variant. Unix-fd values
//! (`h`) decode as their u32 index; the broker never forwards descriptors
//! through the driver.

use crate::codec::{WireBuf, WireCursor};
use crate::signature::{alignment_of, split_complete_types};
use crate::WireError;

/// Maximum byte length of a single array, per the DBus spec (2^26).
const ARRAY_LENGTH_MAX: usize = 1 << 26;

/// One marshaled value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(u8),
    Bool(bool),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Double(f64),
    Str(String),
    ObjectPath(String),
    Signature(String),
    /// A variant and the signature of its payload.
    Variant(Box<Value>),
    /// An array with its element signature (needed when empty).
    Array {
        element: String,
        items: Vec<Value>,
    },
    Struct(Vec<Value>),
    /// A dict entry; only valid as the element of an array.
    DictEntry(Box<Value>, Box<Value>),
}

impl Value {
    /// Signature of this value as one complete type.
    #[must_use]
    pub fn signature(&self) -> String {
        match self {
            Self::Byte(_) => "y".into(),
            Self::Bool(_) => "b".into(),
            Self::Int16(_) => "n".into(),
            Self::Uint16(_) => "q".into(),
            Self::Int32(_) => "i".into(),
            Self::Uint32(_) => "u".into(),
            Self::Int64(_) => "x".into(),
            Self::Uint64(_) => "t".into(),
            Self::Double(_) => "d".into(),
            Self::Str(_) => "s".into(),
            Self::ObjectPath(_) => "o".into(),
            Self::Signature(_) => "g".into(),
            Self::Variant(_) => "v".into(),
            Self::Array { element, .. } => format!("a{element}"),
            Self::Struct(fields) => {
                let mut sig = String::from("(");
                for field in fields {
                    sig.push_str(&field.signature());
                }
                sig.push(')');
                sig
            }
            Self::DictEntry(key, value) => {
                format!("{{{}{}}}", key.signature(), value.signature())
            }
        }
    }

    /// Decode one value of the complete type `sig`.
    pub fn read(cursor: &mut WireCursor<'_>, sig: &str) -> Result<Self, WireError> {
        let bytes = sig.as_bytes();
        match bytes.first().ok_or(WireError::InvalidSignature)? {
            b'y' => Ok(Self::Byte(cursor.read_u8()?)),
            b'b' => Ok(Self::Bool(cursor.read_bool()?)),
            b'n' => Ok(Self::Int16(cursor.read_i16()?)),
            b'q' => Ok(Self::Uint16(cursor.read_u16()?)),
            b'i' => Ok(Self::Int32(cursor.read_i32()?)),
            b'u' | b'h' => Ok(Self::Uint32(cursor.read_u32()?)),
            b'x' => Ok(Self::Int64(cursor.read_i64()?)),
            b't' => Ok(Self::Uint64(cursor.read_u64()?)),
            b'd' => Ok(Self::Double(cursor.read_f64()?)),
            b's' => Ok(Self::Str(cursor.read_string()?.to_owned())),
            b'o' => {
                let path = cursor.read_string()?;
                if !fbus_types::validate::validate_object_path(path) {
                    return Err(WireError::InvalidValue);
                }
                Ok(Self::ObjectPath(path.to_owned()))
            }
            b'g' => {
                let inner = cursor.read_signature()?;
                split_complete_types(inner)?;
                Ok(Self::Signature(inner.to_owned()))
            }
            b'v' => {
                let inner = cursor.read_signature()?;
                let types = split_complete_types(inner)?;
                let [only] = types.as_slice() else {
                    return Err(WireError::InvalidSignature);
                };
                let value = Self::read(cursor, only)?;
                Ok(Self::Variant(Box::new(value)))
            }
            b'a' => {
                let element = &sig[1..];
                let len = cursor.read_u32()? as usize;
                if len > ARRAY_LENGTH_MAX {
                    return Err(WireError::InvalidValue);
                }
                // The padding to the element boundary is not counted in len.
                cursor.align_to(alignment_of(element.as_bytes()[0]))?;
                let end = cursor.offset() + len;
                let mut items = Vec::new();
                while cursor.offset() < end {
                    items.push(Self::read(cursor, element)?);
                }
                if cursor.offset() != end {
                    return Err(WireError::InvalidValue);
                }
                Ok(Self::Array {
                    element: element.to_owned(),
                    items,
                })
            }
            b'(' => {
                cursor.align_to(8)?;
                let fields = split_complete_types(&sig[1..sig.len() - 1])?;
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    values.push(Self::read(cursor, field)?);
                }
                Ok(Self::Struct(values))
            }
            b'{' => {
                cursor.align_to(8)?;
                let inner = split_complete_types(&sig[1..sig.len() - 1])?;
                let [key_sig, value_sig] = inner.as_slice() else {
                    return Err(WireError::InvalidSignature);
                };
                let key = Self::read(cursor, key_sig)?;
                let value = Self::read(cursor, value_sig)?;
                Ok(Self::DictEntry(Box::new(key), Box::new(value)))
            }
            _ => Err(WireError::InvalidSignature),
        }
    }

    /// Encode this value.
    pub fn write(&self, buf: &mut WireBuf) {
        match self {
            Self::Byte(v) => buf.push_u8(*v),
            Self::Bool(v) => buf.push_bool(*v),
            Self::Int16(v) => buf.push_i16(*v),
            Self::Uint16(v) => buf.push_u16(*v),
            Self::Int32(v) => buf.push_i32(*v),
            Self::Uint32(v) => buf.push_u32(*v),
            Self::Int64(v) => buf.push_i64(*v),
            Self::Uint64(v) => buf.push_u64(*v),
            Self::Double(v) => buf.push_f64(*v),
            Self::Str(v) => buf.push_string(v),
            Self::ObjectPath(v) => buf.push_string(v),
            Self::Signature(v) => buf.push_signature(v),
            Self::Variant(inner) => {
                buf.push_signature(&inner.signature());
                inner.write(buf);
            }
            Self::Array { element, items } => {
                let slot = buf.reserve_u32();
                buf.pad_to(alignment_of(element.as_bytes()[0]));
                let start = buf.len();
                for item in items {
                    item.write(buf);
                }
                let len = (buf.len() - start) as u32;
                buf.patch_u32(slot, len);
            }
            Self::Struct(fields) => {
                buf.pad_to(8);
                for field in fields {
                    field.write(buf);
                }
            }
            Self::DictEntry(key, value) => {
                buf.pad_to(8);
                key.write(buf);
                value.write(buf);
            }
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::ObjectPath(s) | Self::Signature(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Uint32(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Self::Array { items, .. } | Self::Struct(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_variant(&self) -> Option<&Value> {
        match self {
            Self::Variant(inner) => Some(inner),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_dict_entry(&self) -> Option<(&Value, &Value)> {
        match self {
            Self::DictEntry(key, value) => Some((key, value)),
            _ => None,
        }
    }
}

/// Encode a body: the given values, back to back.
pub fn write_body(values: &[Value], buf: &mut WireBuf) {
    for value in values {
        value.write(buf);
    }
}

/// Signature of a body, the concatenation of each value's complete type.
#[must_use]
pub fn body_signature(values: &[Value]) -> String {
    values.iter().map(Value::signature).collect()
}

/// Decode a full body against a declared signature.
///
/// The entire input must be consumed; trailing bytes mean the signature and
/// body disagree.
pub fn read_body(data: &[u8], endian: crate::codec::Endian, sig: &str) -> Result<Vec<Value>, WireError> {
    let mut cursor = WireCursor::new(data, endian);
    let mut values = Vec::new();
    for ty in split_complete_types(sig)? {
        values.push(Value::read(&mut cursor, ty)?);
    }
    if !cursor.at_end() {
        return Err(WireError::TrailingBytes);
    }
    Ok(values)
}
