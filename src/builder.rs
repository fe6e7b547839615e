//! Request builder: protocol dispatch (§4.4) from a typed `Shape` to a
//! generic `AWSRequest`.
//!
//! All protocols start the same way — project `headerParams`, `queryParams`,
//! `pathParams` out of the input — and differ only in how whatever's left
//! becomes the body. "Whatever's left" is every member not named by one of
//! those three maps.

use std::collections::HashMap;
use std::io::Cursor;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::Value;
use url::Url;

/// Allow-list for `{name+}` path substitution: unreserved characters plus
/// `/`, since a `+`-suffixed template parameter is meant to carry multiple
/// path segments verbatim (e.g. an S3 key).
const PATH_PLUS_UNRESERVED: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn escape_path_plus(value: &str) -> String {
    utf8_percent_encode(value, PATH_PLUS_UNRESERVED).to_string()
}

use crate::body::Body;
use crate::errors::AWSError;
use crate::protocol::ServiceProtocol;
use crate::region::Region;
use crate::request::AWSRequest;
use crate::shape::{FieldValue, MemberType, PayloadValue, Shape};

/// Per-operation metadata the generated client supplies; everything here is
/// known at codegen time, unlike the per-call `Shape` instance.
pub struct RequestSpec<'a> {
    pub operation: &'a str,
    /// URI template, e.g. `/2012-10-17/role/{RoleName}`. Root-only
    /// operations use `/`.
    pub path: &'a str,
    pub method: Method,
    pub protocol: ServiceProtocol,
    /// JSON-protocol `X-Amz-Target` prefix (e.g. `DynamoDB_20120810`); unused
    /// outside `json`/`restjson`.
    pub target_prefix: Option<&'a str>,
    /// `query`/`ec2` protocol API version, injected as the `Version` field.
    pub api_version: &'a str,
}

pub struct RequestBuilder;

impl RequestBuilder {
    pub fn build(
        endpoint: &Url,
        region: Region,
        service: &str,
        spec: &RequestSpec<'_>,
        input: &dyn Shape,
    ) -> Result<AWSRequest, AWSError> {
        tracing::debug!(
            operation = spec.operation,
            path = spec.path,
            method = %spec.method,
            protocol = ?spec.protocol,
            "building request"
        );
        let path = substitute_path(spec.path, input)?;
        let mut url = endpoint.join(&path).map_err(|e| AWSError::InvalidUrl(e.to_string()))?;

        let mut headers = project_headers(input)?;
        let mut query: Vec<(String, String)> = project_query(input)?;

        let remaining = remaining_members(input);
        let payload_field = spec_payload(input, &remaining)?;

        let body = match spec.protocol {
            ServiceProtocol::Json { .. } | ServiceProtocol::RestJson => {
                build_json_or_restjson_body(input, &remaining, payload_field.as_ref(), &mut headers)?
            }
            ServiceProtocol::RestXml => build_restxml_body(
                spec.operation,
                input,
                &remaining,
                payload_field.as_ref(),
                &mut headers,
            )?,
            ServiceProtocol::Query => {
                let mut dict = flatten_query_members(&remaining, input, false);
                dict.push(("Action".to_string(), spec.operation.to_string()));
                dict.push(("Version".to_string(), spec.api_version.to_string()));
                dict.sort();
                if spec.method == Method::GET {
                    query.extend(dict);
                    query.sort();
                    Body::Empty
                } else {
                    Body::FormUrlEncoded(serde_urlencoded::to_string(&dict).unwrap_or_default().into_bytes())
                }
            }
            ServiceProtocol::Other(name) if name.eq_ignore_ascii_case("ec2") => {
                let mut dict = flatten_query_members(&remaining, input, true);
                dict.push(("Action".to_string(), spec.operation.to_string()));
                dict.push(("Version".to_string(), spec.api_version.to_string()));
                dict.sort();
                Body::FormUrlEncoded(serde_urlencoded::to_string(&dict).unwrap_or_default().into_bytes())
            }
            ServiceProtocol::Other(_) => Body::Empty,
        };

        query.sort();
        if !query.is_empty() {
            // `path` may already carry query items of its own (S3 subresource
            // flags like `?acl`); those are preserved in their given order
            // and the dictionary-derived items are appended after them.
            let existing: Vec<(String, String)> = url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (k, v) in &existing {
                pairs.append_pair(k, v);
            }
            for (k, v) in &query {
                pairs.append_pair(k, v);
            }
        }

        // `json`-protocol whole-structure bodies get the versioned
        // `application/x-amz-json-1.x` type; everything else uses the body's
        // own content type (raw/text payloads keep their specific type
        // rather than the protocol's generic one).
        let content_type = match (&spec.protocol, &body) {
            (ServiceProtocol::Json { .. }, Body::Json(_)) => spec.protocol.default_content_type(),
            _ => body.content_type(),
        };
        if let Some(content_type) = content_type {
            headers.insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static(content_type),
            );
        }

        let amz_target = match spec.protocol {
            ServiceProtocol::Json { .. } | ServiceProtocol::RestJson => spec
                .target_prefix
                .map(|prefix| format!("{prefix}.{}", spec.operation)),
            _ => None,
        };
        if let Some(target) = &amz_target {
            headers.insert(
                HeaderName::from_static("x-amz-target"),
                HeaderValue::from_str(target).map_err(|e| AWSError::InvalidUrl(e.to_string()))?,
            );
        }

        Ok(AWSRequest {
            region,
            service: service.to_string(),
            operation: spec.operation.to_string(),
            protocol: spec.protocol.clone(),
            amz_target,
            method: spec.method.clone(),
            url,
            headers,
            body,
        })
    }
}

/// `{name}` is substituted verbatim (callers are expected to have produced a
/// URI-safe value); `{name+}` applies URL-path percent-encoding.
fn substitute_path(template: &str, input: &dyn Shape) -> Result<String, AWSError> {
    let mut values: HashMap<&str, FieldValue> = HashMap::new();
    for (template_name, field_name) in input.path_params() {
        let value = input
            .get(field_name)
            .ok_or_else(|| AWSError::MissingParameter(format!("path parameter {template_name}")))?;
        values.insert(template_name, value);
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            return Err(AWSError::InvalidUrl(template.to_string()));
        };
        let token = &rest[open + 1..open + close];
        let (name, greedy) = token
            .strip_suffix('+')
            .map(|n| (n, true))
            .unwrap_or((token, false));
        let value = values
            .get(name)
            .ok_or_else(|| AWSError::MissingParameter(format!("path parameter {name}")))?
            .to_wire_string();
        if greedy {
            out.push_str(&escape_path_plus(&value));
        } else {
            out.push_str(&value);
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    if !out.starts_with('/') {
        out.insert(0, '/');
    }
    Ok(out)
}

fn project_headers(input: &dyn Shape) -> Result<HeaderMap, AWSError> {
    let mut headers = HeaderMap::new();
    for (wire_name, field_name) in input.header_params() {
        let Some(value) = input.get(field_name) else {
            continue;
        };
        if matches!(value, FieldValue::Null) {
            continue;
        }
        let name = HeaderName::try_from(*wire_name).map_err(|e| AWSError::InvalidUrl(e.to_string()))?;
        let rendered = value.to_wire_string();
        let header_value =
            HeaderValue::from_str(&rendered).map_err(|e| AWSError::InvalidUrl(e.to_string()))?;
        headers.insert(name, header_value);
    }
    Ok(headers)
}

fn project_query(input: &dyn Shape) -> Result<Vec<(String, String)>, AWSError> {
    let mut query = Vec::new();
    for (wire_name, field_name) in input.query_params() {
        let Some(value) = input.get(field_name) else {
            continue;
        };
        if matches!(value, FieldValue::Null) {
            continue;
        }
        query.push((wire_name.to_string(), value.to_wire_string()));
    }
    Ok(query)
}

/// Members not already claimed by `headerParams`/`queryParams`/`pathParams`
/// — these are what forms the body, per protocol.
fn remaining_members(input: &dyn Shape) -> Vec<&'static crate::shape::Member> {
    let claimed: std::collections::HashSet<&str> = input
        .header_params()
        .iter()
        .map(|(_, f)| *f)
        .chain(input.query_params().iter().map(|(_, f)| *f))
        .chain(input.path_params().iter().map(|(_, f)| *f))
        .collect();
    input
        .members()
        .iter()
        .filter(|m| !claimed.contains(m.field_name))
        .collect()
}

fn spec_payload(
    input: &dyn Shape,
    remaining: &[&crate::shape::Member],
) -> Result<Option<(String, PayloadValue)>, AWSError> {
    let Some(payload_field) = input.payload_path() else {
        return Ok(None);
    };
    let member = remaining
        .iter()
        .find(|m| m.field_name == payload_field)
        .copied()
        .or_else(|| input.member(payload_field))
        .ok_or_else(|| AWSError::UnsupportedOperation(format!("payloadPath {payload_field} not found")))?;
    let value = input
        .get(payload_field)
        .ok_or_else(|| AWSError::MissingParameter(payload_field.to_string()))?;
    let payload = PayloadValue::from_field(member.member_type, value).ok_or_else(|| {
        AWSError::UnsupportedOperation(format!(
            "payloadPath {payload_field} targets a {:?} member, which is not a structure/blob/text payload",
            member.member_type
        ))
    })?;
    Ok(Some((member.wire_name().to_string(), payload)))
}

fn build_json_or_restjson_body(
    input: &dyn Shape,
    remaining: &[&crate::shape::Member],
    payload: Option<&(String, PayloadValue)>,
    headers: &mut HeaderMap,
) -> Result<Body, AWSError> {
    if let Some((_, value)) = payload {
        return Ok(match value {
            PayloadValue::Structure(fields) => Body::Json(
                serde_json::to_vec(&fields_to_json(fields)).map_err(|e| AWSError::MalformedBody(e.to_string()))?,
            ),
            PayloadValue::Blob(bytes) => Body::Raw(bytes.clone()),
            PayloadValue::Text(text) => Body::Text(text.clone()),
        });
    }
    let _ = headers;
    if remaining.is_empty() {
        return Ok(Body::Empty);
    }
    let fields = remaining
        .iter()
        .filter_map(|m| input.get(m.field_name).map(|v| (m.wire_name().to_string(), v)))
        .collect::<Vec<_>>();
    if fields.is_empty() {
        return Ok(Body::Empty);
    }
    Ok(Body::Json(
        serde_json::to_vec(&fields_to_json(&fields)).map_err(|e| AWSError::MalformedBody(e.to_string()))?,
    ))
}

fn build_restxml_body(
    operation: &str,
    input: &dyn Shape,
    remaining: &[&crate::shape::Member],
    payload: Option<&(String, PayloadValue)>,
    _headers: &mut HeaderMap,
) -> Result<Body, AWSError> {
    if let Some((element_name, value)) = payload {
        return Ok(match value {
            PayloadValue::Structure(fields) => Body::Xml(xml_encode_element(element_name, fields)?),
            PayloadValue::Blob(bytes) => Body::Raw(bytes.clone()),
            PayloadValue::Text(text) => Body::Text(text.clone()),
        });
    }
    if remaining.is_empty() {
        return Ok(Body::Empty);
    }
    let fields = remaining
        .iter()
        .filter_map(|m| input.get(m.field_name).map(|v| (m.wire_name().to_string(), v)))
        .collect::<Vec<_>>();
    if fields.is_empty() {
        return Ok(Body::Empty);
    }
    Ok(Body::Xml(xml_encode_element(operation, &fields)?))
}

fn fields_to_json(fields: &[(String, FieldValue)]) -> Value {
    let mut map = serde_json::Map::new();
    for (name, value) in fields {
        map.insert(name.clone(), field_value_to_json(value));
    }
    Value::Object(map)
}

fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Scalar(v) => v.clone(),
        FieldValue::Blob(bytes) => Value::String(value_to_base64(bytes)),
        FieldValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
        FieldValue::List(items) => Value::Array(items.iter().map(field_value_to_json).collect()),
        FieldValue::Map(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), field_value_to_json(v));
            }
            Value::Object(out)
        }
        FieldValue::Structure(fields) => fields_to_json(fields),
    }
}

fn value_to_base64(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn xml_encode_element(name: &str, fields: &[(String, FieldValue)]) -> Result<Vec<u8>, AWSError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_xml_element(&mut writer, name, fields)
        .map_err(|e| AWSError::MalformedBody(e.to_string()))?;
    Ok(writer.into_inner().into_inner())
}

fn write_xml_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    fields: &[(String, FieldValue)],
) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    for (field_name, value) in fields {
        write_xml_value(writer, field_name, value)?;
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_xml_value(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    value: &FieldValue,
) -> quick_xml::Result<()> {
    match value {
        FieldValue::Structure(fields) => write_xml_element(writer, name, fields),
        FieldValue::List(items) => {
            for item in items {
                write_xml_value(writer, name, item)?;
            }
            Ok(())
        }
        FieldValue::Null => Ok(()),
        other => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            writer.write_event(Event::Text(BytesText::new(&other.to_wire_string())))?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
            Ok(())
        }
    }
}

/// Flatten the remaining members into AWS's dotted `query`/`ec2` form
/// encoding. `ec2_style` omits the `.member` segment lists otherwise carry
/// (`Filter.1.Name` vs `Filter.member.1.Name`).
fn flatten_query_members(
    members: &[&crate::shape::Member],
    input: &dyn Shape,
    ec2_style: bool,
) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for member in members {
        let Some(value) = input.get(member.field_name) else {
            continue;
        };
        flatten_value(member.wire_name(), &value, ec2_style, &mut out);
    }
    out
}

fn flatten_value(prefix: &str, value: &FieldValue, ec2_style: bool, out: &mut Vec<(String, String)>) {
    match value {
        FieldValue::Null => {}
        FieldValue::Structure(fields) => {
            for (name, child) in fields {
                flatten_value(&format!("{prefix}.{name}"), child, ec2_style, out);
            }
        }
        FieldValue::List(items) => {
            for (idx, item) in items.iter().enumerate() {
                let key = if ec2_style {
                    format!("{prefix}.{}", idx + 1)
                } else {
                    format!("{prefix}.member.{}", idx + 1)
                };
                flatten_value(&key, item, ec2_style, out);
            }
        }
        FieldValue::Map(map) => {
            for (idx, (key, val)) in map.iter().enumerate() {
                let entry_prefix = format!("{prefix}.entry.{}", idx + 1);
                out.push((format!("{entry_prefix}.key"), key.clone()));
                flatten_value(&format!("{entry_prefix}.value"), val, ec2_style, out);
            }
        }
        scalar => out.push((prefix.to_string(), scalar.to_wire_string())),
    }
}
