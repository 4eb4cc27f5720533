//! Match rules and the broadcast subscription registry.
//!
//! A match rule is a comma-separated list of `key='value'` constraints over
//! message metadata. Rules live in two indices: one keyed by the rule's
//! `sender` scope (wildcard, the driver, a unique name, a well-known name),
//! and one keyed by an exact `arg0` value, which is what makes
//! `NameOwnerChanged` fan-out cheap — subscribers for one name are found by
//! the name itself. Index placement is a pre-filter only; every candidate
//! rule is re-evaluated in full before delivery.

use std::collections::{BTreeSet, HashMap};

use smallvec::SmallVec;
use thiserror::Error;

use fbus_types::protocol::DRIVER_NAME;
use fbus_types::{validate, MessageType, PeerId};
use fbus_wire::MessageMetadata;

/// Highest argument index addressable by a rule (`arg0`..`arg63`).
const ARG_INDEX_MAX: u8 = 63;

/// Maximum length of a rule string, matching the reference brokers.
const RULE_LENGTH_MAX: usize = 1024;

/// Match-rule failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("invalid match rule")]
    Invalid,
    #[error("match rule not found")]
    NotFound,
}

/// How one argument constraint compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// `argN='value'`: string equality against a string-typed argument.
    Exact,
    /// `argNpath='value'`: path-prefix match in either direction.
    Path,
    /// `arg0namespace='value'`: bus-name namespace match, `arg0` only.
    Namespace,
}

/// One argument constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgConstraint {
    pub index: u8,
    pub kind: ArgKind,
    pub value: String,
}

/// A parsed match rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchRule {
    pub msg_type: Option<MessageType>,
    pub sender: Option<String>,
    pub interface: Option<String>,
    pub member: Option<String>,
    pub path: Option<String>,
    pub path_namespace: Option<String>,
    pub destination: Option<String>,
    /// Sorted by index; at most one constraint per index.
    pub args: SmallVec<[ArgConstraint; 4]>,
    pub eavesdrop: bool,
}

/// The sender of a message under evaluation.
#[derive(Debug, Clone, Copy)]
pub enum MatchSender<'a> {
    /// The broker itself.
    Driver,
    Peer {
        id: PeerId,
        unique: &'a str,
        owned: &'a BTreeSet<String>,
    },
}

impl MatchRule {
    /// Parse a rule string.
    pub fn parse(rule: &str) -> Result<Self, MatchError> {
        if rule.len() > RULE_LENGTH_MAX {
            return Err(MatchError::Invalid);
        }
        let mut out = Self::default();
        let mut seen: SmallVec<[String; 8]> = SmallVec::new();
        let mut rest = rule.trim();
        while !rest.is_empty() {
            let (key, value, tail) = next_token(rest)?;
            rest = tail;
            if seen.iter().any(|k| k == key) {
                return Err(MatchError::Invalid);
            }
            seen.push(key.to_owned());
            out.apply(key, value)?;
        }
        // `path` and `path_namespace` are mutually exclusive.
        if out.path.is_some() && out.path_namespace.is_some() {
            return Err(MatchError::Invalid);
        }
        out.args.sort_by_key(|c| c.index);
        Ok(out)
    }

    fn apply(&mut self, key: &str, value: String) -> Result<(), MatchError> {
        match key {
            "type" => {
                self.msg_type = Some(match value.as_str() {
                    "method_call" => MessageType::MethodCall,
                    "method_return" => MessageType::MethodReturn,
                    "error" => MessageType::Error,
                    "signal" => MessageType::Signal,
                    _ => return Err(MatchError::Invalid),
                });
            }
            "sender" => {
                if !validate::validate_name(&value) {
                    return Err(MatchError::Invalid);
                }
                self.sender = Some(value);
            }
            "interface" => {
                if !validate::validate_interface(&value) {
                    return Err(MatchError::Invalid);
                }
                self.interface = Some(value);
            }
            "member" => {
                if !validate::validate_member(&value) {
                    return Err(MatchError::Invalid);
                }
                self.member = Some(value);
            }
            "path" => {
                if !validate::validate_object_path(&value) {
                    return Err(MatchError::Invalid);
                }
                self.path = Some(value);
            }
            "path_namespace" => {
                if !validate::validate_object_path(&value) {
                    return Err(MatchError::Invalid);
                }
                self.path_namespace = Some(value);
            }
            "destination" => {
                if !validate::validate_name(&value) {
                    return Err(MatchError::Invalid);
                }
                self.destination = Some(value);
            }
            "eavesdrop" => {
                self.eavesdrop = match value.as_str() {
                    "true" => true,
                    "false" => false,
                    _ => return Err(MatchError::Invalid),
                };
            }
            _ => {
                let constraint = parse_arg_key(key, value)?;
                if self.args.iter().any(|c| c.index == constraint.index) {
                    return Err(MatchError::Invalid);
                }
                self.args.push(constraint);
            }
        }
        Ok(())
    }

    /// Evaluate this rule against a message.
    #[must_use]
    pub fn matches(&self, metadata: &MessageMetadata, sender: &MatchSender<'_>) -> bool {
        if let Some(want) = self.msg_type {
            if metadata.kind != Some(want) {
                return false;
            }
        }
        if let Some(want) = &self.sender {
            let holds = match sender {
                MatchSender::Driver => want == DRIVER_NAME,
                MatchSender::Peer { unique, owned, .. } => {
                    want == unique || owned.contains(want)
                }
            };
            if !holds {
                return false;
            }
        }
        if let Some(want) = &self.interface {
            if metadata.fields.interface.as_deref() != Some(want.as_str()) {
                return false;
            }
        }
        if let Some(want) = &self.member {
            if metadata.fields.member.as_deref() != Some(want.as_str()) {
                return false;
            }
        }
        if let Some(want) = &self.path {
            if metadata.fields.path.as_deref() != Some(want.as_str()) {
                return false;
            }
        }
        if let Some(ns) = &self.path_namespace {
            let Some(path) = metadata.fields.path.as_deref() else {
                return false;
            };
            if !path_in_namespace(path, ns) {
                return false;
            }
        }
        if let Some(want) = &self.destination {
            if metadata.fields.destination.as_deref() != Some(want.as_str()) {
                return false;
            }
        }
        for constraint in &self.args {
            let arg = metadata.args.get(constraint.index as usize);
            let holds = match (constraint.kind, arg) {
                (_, None) => false,
                (ArgKind::Exact, Some(arg)) => {
                    !arg.is_object_path && arg.value == constraint.value
                }
                (ArgKind::Path, Some(arg)) => paths_overlap(&arg.value, &constraint.value),
                (ArgKind::Namespace, Some(arg)) => {
                    !arg.is_object_path && name_in_namespace(&arg.value, &constraint.value)
                }
            };
            if !holds {
                return false;
            }
        }
        true
    }

    /// The exact-`arg0` key, when this rule should live in the arg0 index.
    #[must_use]
    fn arg0_key(&self) -> Option<&str> {
        self.args
            .iter()
            .find(|c| c.index == 0 && c.kind == ArgKind::Exact)
            .map(|c| c.value.as_str())
    }
}

fn parse_arg_key(key: &str, value: String) -> Result<ArgConstraint, MatchError> {
    let rest = key.strip_prefix("arg").ok_or(MatchError::Invalid)?;
    let (digits, kind) = if let Some(digits) = rest.strip_suffix("path") {
        (digits, ArgKind::Path)
    } else if let Some(digits) = rest.strip_suffix("namespace") {
        (digits, ArgKind::Namespace)
    } else {
        (rest, ArgKind::Exact)
    };
    if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MatchError::Invalid);
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return Err(MatchError::Invalid);
    }
    let index: u8 = digits.parse().map_err(|_| MatchError::Invalid)?;
    if index > ARG_INDEX_MAX {
        return Err(MatchError::Invalid);
    }
    if kind == ArgKind::Namespace {
        if index != 0 || !validate::validate_name(&value) {
            return Err(MatchError::Invalid);
        }
    }
    Ok(ArgConstraint { index, kind, value })
}

/// Split one `key='value'` token off the front of a rule string.
fn next_token(input: &str) -> Result<(&str, String, &str), MatchError> {
    let eq = input.find('=').ok_or(MatchError::Invalid)?;
    let key = input[..eq].trim();
    if key.is_empty() {
        return Err(MatchError::Invalid);
    }
    let mut value = String::new();
    let mut chars = input[eq + 1..].char_indices().peekable();
    let mut in_quote = false;
    let mut consumed = input.len();
    while let Some((at, ch)) = chars.next() {
        if in_quote {
            if ch == '\'' {
                in_quote = false;
            } else {
                value.push(ch);
            }
        } else if ch == '\'' {
            in_quote = true;
        } else if ch == ',' {
            consumed = eq + 1 + at + 1;
            break;
        } else if ch == '\\' {
            // outside quotes, a backslash escapes only an apostrophe
            if let Some((_, '\'')) = chars.peek() {
                value.push('\'');
                chars.next();
            } else {
                value.push('\\');
            }
        } else {
            value.push(ch);
        }
    }
    if in_quote {
        return Err(MatchError::Invalid);
    }
    Ok((key, value, &input[consumed.min(input.len())..]))
}

fn path_in_namespace(path: &str, ns: &str) -> bool {
    ns == "/" || path == ns || path.strip_prefix(ns).is_some_and(|r| r.starts_with('/'))
}

fn name_in_namespace(name: &str, ns: &str) -> bool {
    name == ns || name.strip_prefix(ns).is_some_and(|r| r.starts_with('.'))
}

/// `argNpath` semantics: one side is a prefix of the other at a `/`
/// boundary, where the shorter side ends with `/`.
fn paths_overlap(arg: &str, rule: &str) -> bool {
    arg == rule
        || (rule.ends_with('/') && arg.starts_with(rule))
        || (arg.ends_with('/') && rule.starts_with(arg))
}

/// Where a rule is filed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SenderScope {
    /// No sender constraint.
    Wildcard,
    /// `sender='org.freedesktop.DBus'`.
    Driver,
    /// Sender is a unique name of this broker.
    Peer(PeerId),
    /// Sender is a well-known name.
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Placement {
    Sender(SenderScope),
    /// Wildcard/driver rules with an exact `arg0` are keyed by it instead.
    Arg0(String),
}

fn placement(rule: &MatchRule) -> Placement {
    let scope = match rule.sender.as_deref() {
        None => SenderScope::Wildcard,
        Some(DRIVER_NAME) => SenderScope::Driver,
        Some(s) if s.starts_with(':') => match PeerId::from_unique_name(s) {
            Some(id) => SenderScope::Peer(id),
            // a foreign unique name can never match; park it in its own scope
            None => SenderScope::Name(s.to_owned()),
        },
        Some(s) => SenderScope::Name(s.to_owned()),
    };
    if matches!(scope, SenderScope::Wildcard | SenderScope::Driver) {
        if let Some(key) = rule.arg0_key() {
            return Placement::Arg0(key.to_owned());
        }
    }
    Placement::Sender(scope)
}

#[derive(Debug)]
struct Entry {
    owner: PeerId,
    rule: MatchRule,
}

/// The bus-wide subscription registry.
#[derive(Debug, Default)]
pub struct MatchRegistry {
    by_sender: HashMap<SenderScope, Vec<Entry>>,
    by_arg0: HashMap<String, Vec<Entry>>,
}

impl MatchRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// File a rule under its computed placement.
    pub fn add(&mut self, owner: PeerId, rule: MatchRule) {
        let entry = Entry { owner, rule };
        match placement(&entry.rule) {
            Placement::Sender(scope) => self.by_sender.entry(scope).or_default().push(entry),
            Placement::Arg0(key) => self.by_arg0.entry(key).or_default().push(entry),
        }
    }

    /// Remove one instance of an identical rule owned by `owner`.
    pub fn remove(&mut self, owner: PeerId, rule: &MatchRule) -> Result<(), MatchError> {
        let bucket = match placement(rule) {
            Placement::Sender(scope) => self.by_sender.get_mut(&scope),
            Placement::Arg0(key) => self.by_arg0.get_mut(&key),
        };
        let Some(entries) = bucket else {
            return Err(MatchError::NotFound);
        };
        let at = entries
            .iter()
            .rposition(|e| e.owner == owner && e.rule == *rule)
            .ok_or(MatchError::NotFound)?;
        entries.remove(at);
        Ok(())
    }

    /// Drop every rule owned by `owner`. Returns how many were removed.
    pub fn flush_owner(&mut self, owner: PeerId) -> usize {
        let mut removed = 0;
        for entries in self.by_sender.values_mut().chain(self.by_arg0.values_mut()) {
            let before = entries.len();
            entries.retain(|e| e.owner != owner);
            removed += before - entries.len();
        }
        self.by_sender.retain(|_, v| !v.is_empty());
        self.by_arg0.retain(|_, v| !v.is_empty());
        removed
    }

    /// Drop the rules others filed against a disconnecting peer's unique
    /// name (sender scope and arg0 key). The id is never reused, so these
    /// rules can never match again. Returns the former owners, one entry
    /// per removed rule, so the caller can release their quota charges.
    pub fn flush_peer_keys(&mut self, peer: PeerId) -> Vec<PeerId> {
        let mut owners = Vec::new();
        if let Some(entries) = self.by_sender.remove(&SenderScope::Peer(peer)) {
            owners.extend(entries.into_iter().map(|e| e.owner));
        }
        if let Some(entries) = self.by_arg0.remove(&peer.unique_name()) {
            owners.extend(entries.into_iter().map(|e| e.owner));
        }
        owners
    }

    /// Subscribers whose rules match a message, deduplicated and in peer-id
    /// order. Eavesdropping rules never match through this path.
    #[must_use]
    pub fn destinations(
        &self,
        metadata: &MessageMetadata,
        sender: &MatchSender<'_>,
    ) -> BTreeSet<PeerId> {
        let mut out = BTreeSet::new();
        let mut scan = |entries: Option<&Vec<Entry>>| {
            if let Some(entries) = entries {
                for entry in entries {
                    if !entry.rule.eavesdrop && entry.rule.matches(metadata, sender) {
                        out.insert(entry.owner);
                    }
                }
            }
        };

        scan(self.by_sender.get(&SenderScope::Wildcard));
        match sender {
            MatchSender::Driver => scan(self.by_sender.get(&SenderScope::Driver)),
            MatchSender::Peer { id, owned, .. } => {
                scan(self.by_sender.get(&SenderScope::Peer(*id)));
                for name in owned.iter() {
                    scan(self.by_sender.get(&SenderScope::Name(name.clone())));
                }
            }
        }
        if let Some(arg0) = metadata.args.first() {
            scan(self.by_arg0.get(&arg0.value));
        }
        out
    }

    /// Total rules filed; quota accounting is per peer, this is for tests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_sender.values().chain(self.by_arg0.values()).map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use fbus_wire::MessageBuilder;

    fn signal(interface: &str, member: &str, args: &[&str]) -> fbus_wire::Message {
        let mut builder = MessageBuilder::new(MessageType::Signal)
            .serial(1)
            .path("/org/freedesktop/DBus")
            .interface(interface)
            .member(member);
        for arg in args {
            builder = builder.arg(fbus_wire::Value::Str((*arg).to_owned()));
        }
        builder.build().expect("signal should build")
    }

    fn peer_sender<'a>(id: u64, unique: &'a str, owned: &'a BTreeSet<String>) -> MatchSender<'a> {
        MatchSender::Peer {
            id: PeerId::new(id),
            unique,
            owned,
        }
    }

    #[test]
    fn parses_typical_rule() {
        let rule = MatchRule::parse(
            "type='signal',interface='org.freedesktop.DBus',member='NameOwnerChanged'",
        )
        .expect("rule should parse");
        assert_eq!(rule.msg_type, Some(MessageType::Signal));
        assert_eq!(rule.interface.as_deref(), Some("org.freedesktop.DBus"));
        assert_eq!(rule.member.as_deref(), Some("NameOwnerChanged"));
    }

    #[test]
    fn empty_rule_is_wildcard() {
        let rule = MatchRule::parse("").expect("empty rule is valid");
        assert_eq!(rule, MatchRule::default());
    }

    #[test]
    fn rejects_bad_rules() {
        for bad in [
            "bogus",
            "type='nonsense'",
            "type='signal',type='signal'",
            "sender='not a name'",
            "path='relative/path'",
            "path='/a',path_namespace='/b'",
            "arg64='x'",
            "arg1namespace='com.x'",
            "arg07='x'",
            "member='Bad",
            "eavesdrop='maybe'",
        ] {
            assert_eq!(MatchRule::parse(bad), Err(MatchError::Invalid), "{bad:?}");
        }
    }

    #[test]
    fn quoting_and_escapes() {
        let rule = MatchRule::parse(r"member='M',arg0='a,b'").expect("quoted comma");
        assert_eq!(rule.args[0].value, "a,b");

        let rule = MatchRule::parse(r"arg0=plain\'quote").expect("escaped apostrophe");
        assert_eq!(rule.args[0].value, "plain'quote");
    }

    #[test]
    fn evaluates_sender_against_owned_names() {
        let rule = MatchRule::parse("sender='com.example.Svc'").expect("rule should parse");
        let msg = signal("com.example.Iface", "M", &[]);
        let owned: BTreeSet<String> = [String::from("com.example.Svc")].into();
        assert!(rule.matches(msg.metadata(), &peer_sender(1, ":1.1", &owned)));
        let none: BTreeSet<String> = BTreeSet::new();
        assert!(!rule.matches(msg.metadata(), &peer_sender(2, ":1.2", &none)));
        assert!(!rule.matches(msg.metadata(), &MatchSender::Driver));
    }

    #[test]
    fn evaluates_arg0() {
        let rule = MatchRule::parse("arg0='com.x'").expect("rule should parse");
        let hit = signal("com.example.Iface", "M", &["com.x"]);
        let miss = signal("com.example.Iface", "M", &["com.y"]);
        let empty = signal("com.example.Iface", "M", &[]);
        let none: BTreeSet<String> = BTreeSet::new();
        let sender = peer_sender(1, ":1.1", &none);
        assert!(rule.matches(hit.metadata(), &sender));
        assert!(!rule.matches(miss.metadata(), &sender));
        assert!(!rule.matches(empty.metadata(), &sender));
    }

    #[test]
    fn path_namespace_semantics() {
        assert!(path_in_namespace("/a/b", "/a"));
        assert!(path_in_namespace("/a", "/a"));
        assert!(path_in_namespace("/a/b", "/"));
        assert!(!path_in_namespace("/ab", "/a"));
    }

    #[test]
    fn arg_path_overlap_semantics() {
        assert!(paths_overlap("/aa/bb/", "/aa/bb/cc"));
        assert!(paths_overlap("/aa/bb/cc", "/aa/bb/"));
        assert!(paths_overlap("/aa/bb", "/aa/bb"));
        assert!(!paths_overlap("/aa/b", "/aa/bb"));
    }

    #[test]
    fn registry_routes_by_sender_scope() {
        let mut registry = MatchRegistry::new();
        let rule = MatchRule::parse("sender=':1.1'").expect("rule should parse");
        registry.add(PeerId::new(9), rule);

        let msg = signal("com.example.Iface", "M", &[]);
        let none: BTreeSet<String> = BTreeSet::new();
        let hit = registry.destinations(msg.metadata(), &peer_sender(1, ":1.1", &none));
        assert_eq!(hit.into_iter().collect::<Vec<_>>(), vec![PeerId::new(9)]);
        let miss = registry.destinations(msg.metadata(), &peer_sender(2, ":1.2", &none));
        assert!(miss.is_empty());
    }

    #[test]
    fn registry_arg0_index_serves_driver_signals() {
        let mut registry = MatchRegistry::new();
        let keyed = MatchRule::parse("member='NameOwnerChanged',arg0='com.x'")
            .expect("rule should parse");
        let wild = MatchRule::parse("member='NameOwnerChanged'").expect("rule should parse");
        registry.add(PeerId::new(3), keyed);
        registry.add(PeerId::new(4), wild);

        let hit = signal("org.freedesktop.DBus", "NameOwnerChanged", &["com.x", "", ":1.1"]);
        let dests = registry.destinations(hit.metadata(), &MatchSender::Driver);
        assert_eq!(
            dests.into_iter().collect::<Vec<_>>(),
            vec![PeerId::new(3), PeerId::new(4)]
        );

        let other = signal("org.freedesktop.DBus", "NameOwnerChanged", &["com.y", "", ":1.1"]);
        let dests = registry.destinations(other.metadata(), &MatchSender::Driver);
        assert_eq!(dests.into_iter().collect::<Vec<_>>(), vec![PeerId::new(4)]);
    }

    #[test]
    fn arg0_keyed_rule_still_matches_peer_broadcasts() {
        let mut registry = MatchRegistry::new();
        let rule = MatchRule::parse("arg0='token'").expect("rule should parse");
        registry.add(PeerId::new(5), rule);

        let msg = signal("com.example.Iface", "M", &["token"]);
        let none: BTreeSet<String> = BTreeSet::new();
        let dests = registry.destinations(msg.metadata(), &peer_sender(1, ":1.1", &none));
        assert_eq!(dests.into_iter().collect::<Vec<_>>(), vec![PeerId::new(5)]);
    }

    #[test]
    fn remove_takes_one_instance() {
        let mut registry = MatchRegistry::new();
        let rule = MatchRule::parse("member='M'").expect("rule should parse");
        registry.add(PeerId::new(1), rule.clone());
        registry.add(PeerId::new(1), rule.clone());
        assert_eq!(registry.len(), 2);
        registry.remove(PeerId::new(1), &rule).expect("first removal");
        assert_eq!(registry.len(), 1);
        registry.remove(PeerId::new(1), &rule).expect("second removal");
        assert_eq!(
            registry.remove(PeerId::new(1), &rule),
            Err(MatchError::NotFound)
        );
    }

    #[test]
    fn flush_owner_clears_all_indices() {
        let mut registry = MatchRegistry::new();
        registry.add(
            PeerId::new(1),
            MatchRule::parse("member='A'").expect("rule should parse"),
        );
        registry.add(
            PeerId::new(1),
            MatchRule::parse("arg0='com.x'").expect("rule should parse"),
        );
        registry.add(
            PeerId::new(2),
            MatchRule::parse("member='B'").expect("rule should parse"),
        );
        assert_eq!(registry.flush_owner(PeerId::new(1)), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn eavesdrop_rules_never_match_normal_fanout() {
        let mut registry = MatchRegistry::new();
        registry.add(
            PeerId::new(1),
            MatchRule::parse("eavesdrop='true'").expect("rule should parse"),
        );
        let msg = signal("com.example.Iface", "M", &[]);
        let none: BTreeSet<String> = BTreeSet::new();
        assert!(registry
            .destinations(msg.metadata(), &peer_sender(2, ":1.2", &none))
            .is_empty());
    }
}
