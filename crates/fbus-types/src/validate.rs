//! Validation of the protocol's string grammars.
//!
//! Bus names, interfaces, members, object paths, and error names each have
//! their own element grammar in the DBus specification. The broker validates
//! on the trust boundary only: names it routes on, and names clients ask to
//! own. Everything here is a pure classifier; callers map rejects to their
//! own error kinds.

use crate::protocol::NAME_LENGTH_MAX;

#[inline]
fn is_member_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[inline]
fn is_name_char(b: u8) -> bool {
    is_member_char(b) || b == b'-'
}

/// Validate a well-known bus name: two or more `.`-separated elements, each
/// of `[A-Za-z0-9_-]` with no leading digit, at most 255 bytes total.
#[must_use]
pub fn validate_well_known_name(name: &str) -> bool {
    if name.is_empty() || name.len() > NAME_LENGTH_MAX {
        return false;
    }
    let mut elements = 0usize;
    for element in name.split('.') {
        let bytes = element.as_bytes();
        match bytes.first() {
            None => return false,
            Some(b) if b.is_ascii_digit() || !is_name_char(*b) => return false,
            Some(_) => {}
        }
        if !bytes.iter().all(|&b| is_name_char(b)) {
            return false;
        }
        elements += 1;
    }
    elements >= 2
}

/// Validate a unique name: `:` followed by two or more elements whose
/// characters are `[A-Za-z0-9_-]`; elements may begin with a digit.
#[must_use]
pub fn validate_unique_name(name: &str) -> bool {
    if name.len() > NAME_LENGTH_MAX {
        return false;
    }
    let Some(rest) = name.strip_prefix(':') else {
        return false;
    };
    let mut elements = 0usize;
    for element in rest.split('.') {
        if element.is_empty() || !element.bytes().all(is_name_char) {
            return false;
        }
        elements += 1;
    }
    elements >= 2
}

/// Validate a bus name of either form.
#[must_use]
pub fn validate_name(name: &str) -> bool {
    if name.starts_with(':') {
        validate_unique_name(name)
    } else {
        validate_well_known_name(name)
    }
}

/// Validate an interface name: like a well-known name, but `-` is not
/// permitted.
#[must_use]
pub fn validate_interface(name: &str) -> bool {
    if name.is_empty() || name.len() > NAME_LENGTH_MAX {
        return false;
    }
    let mut elements = 0usize;
    for element in name.split('.') {
        let bytes = element.as_bytes();
        match bytes.first() {
            None => return false,
            Some(b) if b.is_ascii_digit() || !is_member_char(*b) => return false,
            Some(_) => {}
        }
        if !bytes.iter().all(|&b| is_member_char(b)) {
            return false;
        }
        elements += 1;
    }
    elements >= 2
}

/// Validate a member (method or signal) name: a single element of
/// `[A-Za-z0-9_]` with no leading digit.
#[must_use]
pub fn validate_member(name: &str) -> bool {
    if name.is_empty() || name.len() > NAME_LENGTH_MAX {
        return false;
    }
    let bytes = name.as_bytes();
    if bytes[0].is_ascii_digit() {
        return false;
    }
    bytes.iter().all(|&b| is_member_char(b))
}

/// Validate an error name. The grammar is that of interfaces.
#[must_use]
pub fn validate_error_name(name: &str) -> bool {
    validate_interface(name)
}

/// Validate an object path: `/`, or `/`-separated non-empty elements of
/// `[A-Za-z0-9_]` with no trailing slash.
#[must_use]
pub fn validate_object_path(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }
    rest.split('/')
        .all(|element| !element.is_empty() && element.bytes().all(is_member_char))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_names() {
        assert!(validate_well_known_name("com.example.Svc"));
        assert!(validate_well_known_name("a.b"));
        assert!(validate_well_known_name("a-b.c_d"));
        assert!(!validate_well_known_name("com"));
        assert!(!validate_well_known_name("com..example"));
        assert!(!validate_well_known_name(".com.example"));
        assert!(!validate_well_known_name("com.example."));
        assert!(!validate_well_known_name("com.1example"));
        assert!(!validate_well_known_name(":1.5"));
        assert!(!validate_well_known_name(""));
        assert!(!validate_well_known_name("com.exa mple"));
    }

    #[test]
    fn length_limit() {
        let long = format!("a.{}", "b".repeat(NAME_LENGTH_MAX));
        assert!(!validate_well_known_name(&long));
        let edge = format!("a.{}", "b".repeat(NAME_LENGTH_MAX - 2));
        assert!(validate_well_known_name(&edge));
    }

    #[test]
    fn unique_names() {
        assert!(validate_unique_name(":1.0"));
        assert!(validate_unique_name(":1.99"));
        assert!(validate_unique_name(":abc.2"));
        assert!(!validate_unique_name(":1"));
        assert!(!validate_unique_name(":1..2"));
        assert!(!validate_unique_name("1.2"));
        assert!(!validate_unique_name(":"));
    }

    #[test]
    fn bus_name_accepts_both_forms() {
        assert!(validate_name(":1.99"));
        assert!(validate_name("com.example.Svc"));
        assert!(!validate_name("bogus"));
    }

    #[test]
    fn interfaces_and_members() {
        assert!(validate_interface("org.freedesktop.DBus"));
        assert!(!validate_interface("org.freedesktop.DBus-x"));
        assert!(!validate_interface("org"));
        assert!(validate_member("Hello"));
        assert!(validate_member("Name_Acquired2"));
        assert!(!validate_member("2Hello"));
        assert!(!validate_member("He.llo"));
        assert!(!validate_member(""));
    }

    #[test]
    fn object_paths() {
        assert!(validate_object_path("/"));
        assert!(validate_object_path("/org/freedesktop/DBus"));
        assert!(!validate_object_path(""));
        assert!(!validate_object_path("org/freedesktop"));
        assert!(!validate_object_path("/org/"));
        assert!(!validate_object_path("//org"));
        assert!(!validate_object_path("/org/free-desktop"));
    }
}
