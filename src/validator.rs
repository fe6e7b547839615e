//! Response validation & decoding (§4.7): per-protocol body decode, HAL-JSON
//! embedded-link expansion, header-field merge, and the payload-path
//! short-circuit, landing in a typed output via `serde::Deserialize`.

use std::collections::HashMap;

use async_trait::async_trait;
use http::HeaderMap;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::{classify, extract_error_code, AWSError, ErrorRegistry};
use crate::protocol::ServiceProtocol;
use crate::transport::TransportResponse;

/// Abstraction over "issue a signed GET and return its body", so HAL link
/// following doesn't give `validator.rs` a dependency on `Client` (which
/// itself depends on `validator.rs` to decode responses). Implemented by
/// `Client`.
#[async_trait]
pub trait HalLinkFetcher: Send + Sync {
    async fn fetch(&self, href: &str) -> Result<TransportResponse, AWSError>;
}

/// Static metadata about one `_embedded` relation: the HAL relation name,
/// the output field it targets, and whether that field is a `list` or a
/// single `structure` member (§4.7 distinguishes the two).
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedRelation {
    pub rel: &'static str,
    pub field_name: &'static str,
    pub is_list: bool,
}

/// Everything about an output shape the validator needs that the `Shape`
/// trait doesn't carry (that trait is read-only over an *instance*; an
/// output doesn't exist yet when decoding starts). Mirrors `RequestSpec` on
/// the request side: explicit, codegen-supplied metadata rather than a
/// second reflection trait.
#[derive(Debug, Clone, Default)]
pub struct OutputSpec {
    pub payload_path: Option<&'static str>,
    pub header_params: &'static [(&'static str, &'static str)],
    pub embedded_relations: &'static [EmbeddedRelation],
    /// Root element descend rule target, e.g. `"ListUsersResult"` /
    /// `"ListUsersResponse"`, used only for `restxml`/`query`.
    pub result_wrapper_names: &'static [&'static str],
    pub follow_hal_links: bool,
}

pub struct ResponseValidator;

impl ResponseValidator {
    /// Decode `response` into `O`, or a classified `AWSError` if the status
    /// is outside `[200,300)`.
    pub async fn decode<O: DeserializeOwned>(
        response: &TransportResponse,
        protocol: &ServiceProtocol,
        spec: &OutputSpec,
        error_registry: &dyn ErrorRegistry,
        hal_fetcher: Option<&dyn HalLinkFetcher>,
    ) -> Result<O, AWSError> {
        if !response.is_success() {
            let header_map = headers_to_map(&response.headers);
            let extracted = extract_error_code(protocol, &header_map, &response.body);
            return Err(classify(
                response.status,
                extracted,
                response.body.to_vec(),
                error_registry,
            ));
        }

        if let Some(field_name) = spec.payload_path {
            let value = payload_value(response, protocol);
            let mut map = Map::new();
            map.insert(field_name.to_string(), value);
            merge_headers(&mut map, &response.headers, spec.header_params);
            return serde_json::from_value(Value::Object(map))
                .map_err(|e| AWSError::MalformedBody(e.to_string()));
        }

        let content_type = response.header("content-type").unwrap_or_default();
        let mut value = match protocol {
            ServiceProtocol::Json { .. } | ServiceProtocol::RestJson => {
                let mut decoded = if response.body.is_empty() {
                    Value::Object(Map::new())
                } else {
                    serde_json::from_slice(&response.body)
                        .map_err(|e| AWSError::MalformedBody(e.to_string()))?
                };
                if content_type.contains("hal+json") {
                    decoded = expand_hal(decoded, spec, hal_fetcher).await?;
                }
                decoded
            }
            ServiceProtocol::RestXml | ServiceProtocol::Query => {
                if response.body.is_empty() {
                    Value::Object(Map::new())
                } else {
                    let text = std::str::from_utf8(&response.body)
                        .map_err(|e| AWSError::MalformedBody(e.to_string()))?;
                    xml_to_value(text, spec.result_wrapper_names)?
                }
            }
            ServiceProtocol::Other(name) if name.eq_ignore_ascii_case("ec2") => {
                if response.body.is_empty() {
                    Value::Object(Map::new())
                } else {
                    let text = std::str::from_utf8(&response.body)
                        .map_err(|e| AWSError::MalformedBody(e.to_string()))?;
                    xml_to_value(text, spec.result_wrapper_names)?
                }
            }
            ServiceProtocol::Other(_) => {
                Value::String(base64_encode(&response.body))
            }
        };

        if let Value::Object(ref mut map) = value {
            merge_headers(map, &response.headers, spec.header_params);
        }

        serde_json::from_value(value).map_err(|e| AWSError::MalformedBody(e.to_string()))
    }
}

/// The raw bytes/text bound to a `payloadPath` field. Blobs are base64
/// encoded so they fit through the `serde_json::Value` intermediate; a
/// generated `Vec<u8>` field should be paired with a
/// `#[serde(with = "...")]` base64 adapter, matching how `FieldValue::Blob`
/// round-trips on the request side.
fn payload_value(response: &TransportResponse, _protocol: &ServiceProtocol) -> Value {
    match std::str::from_utf8(&response.body) {
        Ok(text) if response.header("content-type").map(|c| c.starts_with("text/")).unwrap_or(false) => {
            Value::String(text.to_string())
        }
        _ => Value::String(base64_encode(&response.body)),
    }
}

fn merge_headers(map: &mut Map<String, Value>, headers: &HeaderMap, header_params: &[(&str, &str)]) {
    for (wire_name, field_name) in header_params {
        let Some(raw) = headers
            .iter()
            .find(|(name, _)| name.as_str().eq_ignore_ascii_case(wire_name))
            .and_then(|(_, value)| value.to_str().ok())
        else {
            continue;
        };
        map.insert(field_name.to_string(), coerce_header_value(raw));
    }
}

/// §4.7: "coerce string values to number or boolean when they parse as
/// such (integers preferred if `value % 1 == 0`)".
fn coerce_header_value(raw: &str) -> Value {
    if raw == "true" {
        return Value::Bool(true);
    }
    if raw == "false" {
        return Value::Bool(false);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f % 1.0 == 0.0 {
            return Value::from(f as i64);
        }
        return Value::from(f);
    }
    Value::String(raw.to_string())
}

async fn expand_hal(
    decoded: Value,
    spec: &OutputSpec,
    hal_fetcher: Option<&dyn HalLinkFetcher>,
) -> Result<Value, AWSError> {
    let Value::Object(root) = decoded else {
        return Ok(decoded);
    };

    let mut out = root
        .get("properties")
        .cloned()
        .map(|v| match v {
            Value::Object(m) => m,
            _ => Map::new(),
        })
        .unwrap_or_else(|| root.clone());

    let Some(Value::Object(embedded)) = root.get("_embedded").cloned() else {
        return Ok(Value::Object(out));
    };

    for relation in spec.embedded_relations {
        let Some(value) = embedded.get(relation.rel) else {
            continue;
        };
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };

        let mut expanded = Vec::with_capacity(items.len());
        for item in items {
            let mut properties = extract_hal_properties(item.clone());
            if spec.follow_hal_links {
                if let Some(links) = item.get("_links").and_then(Value::as_object) {
                    for (rel, link) in links {
                        if rel == "self" {
                            continue;
                        }
                        let Some(href) = link.get("href").and_then(Value::as_str) else {
                            continue;
                        };
                        let Some(fetcher) = hal_fetcher else {
                            return Err(AWSError::UnsupportedOperation(format!(
                                "HAL link {rel} requires a fetcher but none was supplied"
                            )));
                        };
                        let response = fetcher.fetch(href).await?;
                        let nested: Value = serde_json::from_slice(&response.body)
                            .map_err(|e| AWSError::MalformedBody(e.to_string()))?;
                        let nested = extract_hal_properties(nested);
                        if let Value::Object(ref mut props) = properties {
                            props.insert(camel_case_key(rel), nested);
                        }
                    }
                }
            }
            expanded.push(properties);
        }

        let field_value = if relation.is_list {
            Value::Array(expanded)
        } else {
            expanded.into_iter().next().unwrap_or(Value::Null)
        };
        out.insert(relation.field_name.to_string(), field_value);
    }

    Ok(Value::Object(out))
}

/// A HAL resource's `properties` object (its non-properties fields live
/// under `_links`/`_embedded`, not in the value proper). Falls back to the
/// whole value when there's no `properties` wrapper, then strips
/// `_links`/`_embedded` either way — used for both `_embedded` items and
/// nested link-followed responses.
fn extract_hal_properties(value: Value) -> Value {
    let mut properties = value
        .get("properties")
        .cloned()
        .unwrap_or_else(|| value.clone());
    if let Value::Object(ref mut props) = properties {
        props.remove("_links");
        props.remove("_embedded");
    }
    properties
}

fn camel_case_key(rel: &str) -> String {
    let mut parts = rel.split(|c: char| c == '-' || c == '_');
    let mut out = String::new();
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Minimal XML→JSON bridge for `restxml`/`query` bodies: each element
/// becomes an object key; repeated sibling names collapse into an array;
/// leaf elements with only text content become strings. Built directly on
/// `quick_xml`'s event reader (no third reader library, no hand-rolled
/// byte-level parsing).
fn xml_to_value(xml: &str, result_wrapper_names: &[&'static str]) -> Result<Value, AWSError> {
    let node = parse_xml_tree(xml)?;
    let node = if result_wrapper_names.contains(&node.name.as_str()) && node.children.len() == 1 {
        node.children.into_iter().next().unwrap()
    } else {
        node
    };
    Ok(node_to_value(&node))
}

struct XmlNode {
    name: String,
    text: String,
    children: Vec<XmlNode>,
}

fn node_to_value(node: &XmlNode) -> Value {
    if node.children.is_empty() {
        return Value::String(node.text.clone());
    }
    let mut map: HashMap<&str, Vec<Value>> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for child in &node.children {
        if !map.contains_key(child.name.as_str()) {
            order.push(&child.name);
        }
        map.entry(&child.name).or_default().push(node_to_value(child));
    }
    let mut out = Map::new();
    for name in order {
        let mut values = map.remove(name).unwrap();
        if values.len() == 1 {
            out.insert(name.to_string(), values.pop().unwrap());
        } else {
            out.insert(name.to_string(), Value::Array(values));
        }
    }
    Value::Object(out)
}

fn parse_xml_tree(xml: &str) -> Result<XmlNode, AWSError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader
            .read_event()
            .map_err(|e| AWSError::MalformedBody(e.to_string()))?
        {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                stack.push(XmlNode {
                    name,
                    text: String::new(),
                    children: Vec::new(),
                });
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let node = XmlNode {
                    name,
                    text: String::new(),
                    children: Vec::new(),
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Event::Text(t) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&t.unescape().unwrap_or_default());
                }
            }
            Event::End(_) => {
                let Some(node) = stack.pop() else {
                    return Err(AWSError::MalformedBody("unbalanced XML".to_string()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or_else(|| AWSError::MalformedBody("empty XML document".to_string()))
}
