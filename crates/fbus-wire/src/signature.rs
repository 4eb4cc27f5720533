//! Type-signature handling.
//!
//! A signature is a sequence of complete type codes (`su`, `a{sv}`, ...).
//! The codec needs three things from it: validation, splitting into complete
//! types, and the alignment of each type code.

use fbus_types::protocol::SIGNATURE_LENGTH_MAX;

use crate::WireError;

/// Maximum container nesting accepted, matching the reference brokers.
const DEPTH_MAX: usize = 32;

/// Alignment of a type, from its leading type code.
#[must_use]
pub fn alignment_of(code: u8) -> usize {
    match code {
        b'y' | b'g' | b'v' => 1,
        b'n' | b'q' => 2,
        b'b' | b'i' | b'u' | b's' | b'o' | b'a' | b'h' => 4,
        b'x' | b't' | b'd' | b'(' | b'{' => 8,
        _ => 1,
    }
}

/// Find the end (exclusive) of the complete type starting at `at`.
fn complete_type_end(sig: &[u8], at: usize, depth: usize) -> Result<usize, WireError> {
    if depth > DEPTH_MAX {
        return Err(WireError::InvalidSignature);
    }
    match sig.get(at) {
        Some(b'y' | b'b' | b'n' | b'q' | b'i' | b'u' | b'x' | b't' | b'd' | b's' | b'o' | b'g'
        | b'v' | b'h') => Ok(at + 1),
        Some(b'a') => complete_type_end(sig, at + 1, depth + 1),
        Some(b'(') => {
            let mut pos = at + 1;
            if sig.get(pos) == Some(&b')') {
                // the empty struct `()` is not a valid wire type
                return Err(WireError::InvalidSignature);
            }
            while sig.get(pos) != Some(&b')') {
                pos = complete_type_end(sig, pos, depth + 1)?;
            }
            Ok(pos + 1)
        }
        Some(b'{') => {
            // dict entries: exactly two types, the key a basic type
            let key_end = complete_type_end(sig, at + 1, depth + 1)?;
            if key_end != at + 2 || !is_basic(sig[at + 1]) {
                return Err(WireError::InvalidSignature);
            }
            let value_end = complete_type_end(sig, key_end, depth + 1)?;
            if sig.get(value_end) != Some(&b'}') {
                return Err(WireError::InvalidSignature);
            }
            Ok(value_end + 1)
        }
        _ => Err(WireError::InvalidSignature),
    }
}

#[inline]
#[must_use]
fn is_basic(code: u8) -> bool {
    matches!(
        code,
        b'y' | b'b' | b'n' | b'q' | b'i' | b'u' | b'x' | b't' | b'd' | b's' | b'o' | b'g' | b'h'
    )
}

/// Split a signature into its complete types.
///
/// Returns slices of the input, one per complete type, or an error if the
/// signature is malformed.
pub fn split_complete_types(sig: &str) -> Result<Vec<&str>, WireError> {
    if sig.len() > SIGNATURE_LENGTH_MAX {
        return Err(WireError::InvalidSignature);
    }
    let bytes = sig.as_bytes();
    let mut types = Vec::new();
    let mut at = 0;
    while at < bytes.len() {
        let end = complete_type_end(bytes, at, 0)?;
        types.push(&sig[at..end]);
        at = end;
    }
    Ok(types)
}

/// Validate a signature without splitting it.
pub fn validate_signature(sig: &str) -> Result<(), WireError> {
    split_complete_types(sig).map(drop)
}
