//! The reflection contract a generated input/output shape must satisfy.
//!
//! Real shape-generating code lives outside this crate (§1, out of scope);
//! this module only defines the interface it is generated against. A
//! codegen backend emits a `Shape` impl per operation's input/output struct,
//! keeping a wire name and its Rust field from desyncing — the desync risk
//! is between a struct field and the wire name/location the service
//! expects, so the descriptor is the single source of truth for both.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Where a member's value is projected onto the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    Header,
    Query,
    Uri,
    Body,
}

/// Wire placement of a single member, when it has one. Members with no
/// `Location` are implicitly `body` fields of the whole-input JSON/XML
/// encoding.
#[derive(Debug, Clone, Copy)]
pub struct Location {
    /// Wire name override (header name, query key, or XML element name).
    /// Falls back to the member's `label` when absent.
    pub name: Option<&'static str>,
    pub kind: LocationKind,
}

/// Structural type of a member, used by the codec layer to decide how to
/// serialize a `FieldValue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberType {
    Scalar,
    List,
    Map,
    Structure,
    Blob,
    Timestamp,
}

/// One member of a shape's `_members` list.
#[derive(Debug, Clone, Copy)]
pub struct Member {
    /// The Rust-facing field name, passed to [`Shape::get`].
    pub field_name: &'static str,
    /// The wire-facing label (JSON key / XML element name) used when no
    /// `Location::name` override is present.
    pub label: &'static str,
    pub location: Option<Location>,
    pub member_type: MemberType,
}

impl Member {
    /// Effective wire name: the location override, or the label.
    pub fn wire_name(&self) -> &'static str {
        self.location
            .and_then(|l| l.name)
            .unwrap_or(self.label)
    }
}

/// A field's value read off a shape instance. Structures and lists nest
/// recursively so the codec layer can walk an entire input/output tree
/// without knowing its concrete Rust type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Scalar(Value),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
    /// Ordered to match declaration order, since XML element order matters.
    Structure(Vec<(String, FieldValue)>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The textual form AWS uses when a scalar is projected onto a header,
    /// query parameter, or URI path segment: numbers/bools stringify via
    /// their natural textual form, `Null` becomes the empty string.
    pub fn to_wire_string(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Scalar(Value::String(s)) => s.clone(),
            FieldValue::Scalar(Value::Bool(b)) => b.to_string(),
            FieldValue::Scalar(Value::Number(n)) => n.to_string(),
            FieldValue::Scalar(other) => other.to_string(),
            FieldValue::Blob(bytes) => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD.encode(bytes)
            }
            FieldValue::Timestamp(ts) => ts.to_rfc3339(),
            FieldValue::List(_) | FieldValue::Map(_) | FieldValue::Structure(_) => String::new(),
        }
    }
}

/// The reflection contract a per-operation input/output type implements.
///
/// `headerParams`/`queryParams`/`pathParams` map a *wire* name to the
/// *field* name used with [`Shape::get`]; `members` carries the full
/// structural description the body codecs need (order, label, type).
pub trait Shape: std::fmt::Debug {
    fn members(&self) -> &'static [Member];
    fn header_params(&self) -> &'static [(&'static str, &'static str)];
    fn query_params(&self) -> &'static [(&'static str, &'static str)];
    fn path_params(&self) -> &'static [(&'static str, &'static str)];
    fn payload_path(&self) -> Option<&'static str>;
    fn get(&self, field_name: &str) -> Option<FieldValue>;

    fn member(&self, field_name: &str) -> Option<&'static Member> {
        self.members().iter().find(|m| m.field_name == field_name)
    }
}

/// A shape with no members at all, used for operations that take or return
/// nothing (the façade's input-less/output-less `send` overloads).
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitShape;

impl Shape for UnitShape {
    fn members(&self) -> &'static [Member] {
        &[]
    }
    fn header_params(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }
    fn query_params(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }
    fn path_params(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }
    fn payload_path(&self) -> Option<&'static str> {
        None
    }
    fn get(&self, _field_name: &str) -> Option<FieldValue> {
        None
    }
}

/// The three payload kinds the request builder accepts for a `payloadPath`
/// target. Anything else named by `payloadPath` is a build-time error
/// rather than a coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Structure(Vec<(String, FieldValue)>),
    Blob(Vec<u8>),
    Text(String),
}

impl PayloadValue {
    pub fn from_field(member_type: MemberType, value: FieldValue) -> Option<Self> {
        match (member_type, value) {
            (MemberType::Structure, FieldValue::Structure(fields)) => {
                Some(PayloadValue::Structure(fields))
            }
            (MemberType::Blob, FieldValue::Blob(bytes)) => Some(PayloadValue::Blob(bytes)),
            (MemberType::Scalar, FieldValue::Scalar(Value::String(s))) => {
                Some(PayloadValue::Text(s))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_name_falls_back_to_label() {
        let m = Member {
            field_name: "userName",
            label: "UserName",
            location: None,
            member_type: MemberType::Scalar,
        };
        assert_eq!(m.wire_name(), "UserName");
    }

    #[test]
    fn wire_name_prefers_location_override() {
        let m = Member {
            field_name: "body",
            label: "Body",
            location: Some(Location {
                name: Some("content"),
                kind: LocationKind::Body,
            }),
            member_type: MemberType::Structure,
        };
        assert_eq!(m.wire_name(), "content");
    }

    #[test]
    fn to_wire_string_formats_scalars() {
        assert_eq!(FieldValue::Scalar(Value::from(42)).to_wire_string(), "42");
        assert_eq!(
            FieldValue::Scalar(Value::from(true)).to_wire_string(),
            "true"
        );
        assert_eq!(FieldValue::Null.to_wire_string(), "");
    }

    #[test]
    fn blob_payload_rejects_non_blob_value() {
        assert_eq!(
            PayloadValue::from_field(MemberType::Blob, FieldValue::Scalar(Value::from("x"))),
            None
        );
    }
}
