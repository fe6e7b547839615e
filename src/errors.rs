//! The `AWSError` taxonomy (§7) and per-protocol error-code extraction.

use std::collections::HashMap;

use thiserror::Error;

use crate::protocol::ServiceProtocol;

/// Errors the engine can surface: one `thiserror` enum covering the
/// transport, protocol, and classified-service-error taxonomy a generated
/// client needs.
#[derive(Debug, Error)]
pub enum AWSError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("malformed response head")]
    MalformedHead,

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("call cancelled")]
    Cancelled,

    #[error("AWS client error {code}: {message}")]
    AWSClientError { code: String, message: String },

    #[error("AWS server error {code}: {message}")]
    AWSServerError { code: String, message: String },

    #[error("AWS response error {code}: {message}")]
    AWSResponseError { code: String, message: String },

    /// A caller-supplied `possibleErrorTypes` registry matched this code and
    /// decoded a service-specific error payload.
    #[error("service error: {0}")]
    Service(Box<dyn std::error::Error + Send + Sync>),

    #[error("{message}")]
    Opaque {
        message: String,
        raw_body: Vec<u8>,
    },

    #[error("credential error: {0}")]
    Credential(#[from] crate::credential::CredentialError),
}

/// The (code, message) pair extracted from an error response body, before
/// classification against the client/server error code lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCode {
    pub code: String,
    pub message: String,
}

/// Extracts `(code, message)` from a non-2xx response per §7's per-protocol
/// rules. `body` is the raw response bytes; `headers` is used for the
/// `restjson` `x-amzn-ErrorType` header.
pub fn extract_error_code(
    protocol: &ServiceProtocol,
    headers: &HashMap<String, String>,
    body: &[u8],
) -> ErrorCode {
    match protocol {
        ServiceProtocol::Query => extract_query_error(body),
        ServiceProtocol::Other(name) if name.eq_ignore_ascii_case("ec2") => extract_query_error(body),
        ServiceProtocol::RestXml => extract_restxml_error(body),
        ServiceProtocol::RestJson => extract_restjson_error(headers, body),
        ServiceProtocol::Json { .. } => extract_json_error(body),
        ServiceProtocol::Other(_) => ErrorCode {
            code: String::new(),
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

fn extract_query_error(body: &[u8]) -> ErrorCode {
    let text = String::from_utf8_lossy(body);
    let doc = match roxml::parse(&text) {
        Some(doc) => doc,
        None => {
            return ErrorCode {
                code: String::new(),
                message: text.into_owned(),
            }
        }
    };
    let code = doc.find_text("Error", "Code").unwrap_or_default();
    let message = doc.find_text("Error", "Message").unwrap_or_default();
    ErrorCode { code, message }
}

fn extract_restxml_error(body: &[u8]) -> ErrorCode {
    let text = String::from_utf8_lossy(body);
    let doc = match roxml::parse(&text) {
        Some(doc) => doc,
        None => {
            return ErrorCode {
                code: String::new(),
                message: text.into_owned(),
            }
        }
    };
    let root = match doc.root() {
        Some(r) => r,
        None => {
            return ErrorCode {
                code: String::new(),
                message: text.into_owned(),
            }
        }
    };
    let code = root
        .children
        .iter()
        .find(|c| c.name == "Code")
        .map(|c| c.text.clone())
        .unwrap_or_default();
    let message = root
        .children
        .iter()
        .filter(|c| c.name != "Code")
        .map(|c| format!("{}: {}", c.name, c.text))
        .collect::<Vec<_>>()
        .join(", ");
    ErrorCode { code, message }
}

fn extract_restjson_error(headers: &HashMap<String, String>, body: &[u8]) -> ErrorCode {
    let code = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("x-amzn-errortype"))
        .map(|(_, v)| v.split(':').next().unwrap_or(v).to_string())
        .unwrap_or_default();
    let message = json_message_field(body);
    ErrorCode { code, message }
}

fn extract_json_error(body: &[u8]) -> ErrorCode {
    let value: serde_json::Value = serde_json::from_slice(body).unwrap_or(serde_json::Value::Null);
    let code = value
        .get("__type")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let message = json_message_field(body);
    ErrorCode { code, message }
}

/// Case-insensitive lookup of a body field named `message`.
fn json_message_field(body: &[u8]) -> String {
    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => return String::new(),
    };
    match value.as_object() {
        Some(obj) => obj
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("message"))
            .and_then(|(_, v)| v.as_str())
            .unwrap_or_default()
            .to_string(),
        None => String::new(),
    }
}

/// A caller-supplied registry of service-specific error types, tried first
/// in the §7 resolution order (`possibleErrorTypes → Client → Server →
/// Response → opaque`).
pub trait ErrorRegistry: Send + Sync {
    /// Attempt to decode `code`/`body` as one of this service's named error
    /// shapes. Returns `None` to fall through to the generic classifier.
    fn decode(&self, code: &str, body: &[u8]) -> Option<Box<dyn std::error::Error + Send + Sync>>;
}

/// A registry that never matches, used when the caller has no
/// service-specific error types registered.
#[derive(Debug, Default)]
pub struct NoErrorTypes;

impl ErrorRegistry for NoErrorTypes {
    fn decode(&self, _code: &str, _body: &[u8]) -> Option<Box<dyn std::error::Error + Send + Sync>> {
        None
    }
}

/// Error codes classified as caller-fault across the services this engine
/// has been exercised against. Not exhaustive — a code absent from either
/// list below falls through to `AWSResponseError` rather than being guessed
/// at, since AWS mints new exception names per service.
const CLIENT_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "AuthFailure",
    "ConditionalCheckFailedException",
    "EntityAlreadyExists",
    "ExpiredToken",
    "ExpiredTokenException",
    "IncompleteSignature",
    "InvalidAction",
    "InvalidClientTokenId",
    "InvalidParameterCombination",
    "InvalidParameterValue",
    "InvalidSignatureException",
    "LimitExceededException",
    "MalformedPolicyDocument",
    "MissingParameter",
    "NoSuchBucket",
    "NoSuchEntity",
    "NoSuchKey",
    "RequestExpired",
    "ResourceNotFoundException",
    "SignatureDoesNotMatch",
    "ThrottlingException",
    "TooManyRequestsException",
    "UnrecognizedClientException",
    "ValidationException",
];

/// Error codes classified as service-fault.
const SERVER_ERROR_CODES: &[&str] = &[
    "InternalError",
    "InternalFailure",
    "InternalServerError",
    "RequestTimeout",
    "RequestTimeoutException",
    "ServiceUnavailable",
    "ServiceUnavailableException",
];

fn code_in(list: &[&str], code: &str) -> bool {
    list.iter().any(|known| known.eq_ignore_ascii_case(code))
}

/// Classify a non-2xx response into an `AWSError` following §7's
/// resolution order: caller registry, then the well-known client/server
/// code lists keyed on the extracted error *code* (never the HTTP status),
/// then an opaque fallback for a response with no code at all.
pub fn classify(
    status: u16,
    extracted: ErrorCode,
    raw_body: Vec<u8>,
    registry: &dyn ErrorRegistry,
) -> AWSError {
    if let Some(service_err) = registry.decode(&extracted.code, &raw_body) {
        return AWSError::Service(service_err);
    }

    if extracted.code.is_empty() {
        return AWSError::Opaque {
            message: if extracted.message.is_empty() {
                format!("request failed with status {status}")
            } else {
                extracted.message
            },
            raw_body,
        };
    }

    if code_in(CLIENT_ERROR_CODES, &extracted.code) {
        AWSError::AWSClientError {
            code: extracted.code,
            message: extracted.message,
        }
    } else if code_in(SERVER_ERROR_CODES, &extracted.code) {
        AWSError::AWSServerError {
            code: extracted.code,
            message: extracted.message,
        }
    } else {
        AWSError::AWSResponseError {
            code: extracted.code,
            message: extracted.message,
        }
    }
}

/// A deliberately tiny XML reader used only for error-document extraction,
/// where the shape is always a shallow `<Root><Child>text</Child>...</Root>`
/// tree. The restxml/query body decode path in `validator.rs` uses the full
/// `quick-xml` reader; this one exists so error extraction has no
/// dependency on a successfully-typed output shape.
mod roxml {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    pub struct Node {
        pub name: String,
        pub text: String,
        pub children: Vec<Node>,
    }

    pub struct Document {
        root: Option<Node>,
    }

    impl Document {
        pub fn root(&self) -> Option<&Node> {
            self.root.as_ref()
        }

        /// Find `<path><leaf>text</leaf></path>` anywhere under the root.
        pub fn find_text(&self, path: &str, leaf: &str) -> Option<String> {
            let root = self.root.as_ref()?;
            let container = if root.name == path {
                Some(root)
            } else {
                find_descendant(root, path)
            };
            container
                .and_then(|c| c.children.iter().find(|n| n.name == leaf))
                .map(|n| n.text.clone())
        }
    }

    fn find_descendant<'a>(node: &'a Node, name: &str) -> Option<&'a Node> {
        for child in &node.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = find_descendant(child, name) {
                return Some(found);
            }
        }
        None
    }

    pub fn parse(xml: &str) -> Option<Document> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut stack: Vec<Node> = Vec::new();
        let mut root: Option<Node> = None;

        loop {
            match reader.read_event().ok()? {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    stack.push(Node {
                        name,
                        text: String::new(),
                        children: Vec::new(),
                    });
                }
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let node = Node {
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
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&t.unescape().ok()?);
                    }
                }
                Event::End(_) => {
                    let finished = stack.pop()?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(finished),
                        None => root = Some(finished),
                    }
                    if stack.is_empty() && root.is_some() {
                        // keep draining in case of trailing whitespace/comments
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.map(|root| Document { root: Some(root) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restxml_error_extraction() {
        let body = b"<Error><Code>NoSuchBucket</Code><Message>bk</Message></Error>";
        let extracted = extract_error_code(&ServiceProtocol::RestXml, &HashMap::new(), body);
        assert_eq!(extracted.code, "NoSuchBucket");
        assert_eq!(extracted.message, "bk");
    }

    #[test]
    fn query_error_extraction_nested_under_errorresponse() {
        let body = b"<ErrorResponse><Error><Code>AccessDenied</Code><Message>no</Message></Error></ErrorResponse>";
        let extracted = extract_error_code(&ServiceProtocol::Query, &HashMap::new(), body);
        assert_eq!(extracted.code, "AccessDenied");
        assert_eq!(extracted.message, "no");
    }

    #[test]
    fn restjson_error_strips_type_suffix_and_reads_message() {
        let mut headers = HashMap::new();
        headers.insert(
            "x-amzn-ErrorType".to_string(),
            "ResourceNotFoundException:http://...".to_string(),
        );
        let body = br#"{"Message":"missing thing"}"#;
        let extracted = extract_error_code(&ServiceProtocol::RestJson, &headers, body);
        assert_eq!(extracted.code, "ResourceNotFoundException");
        assert_eq!(extracted.message, "missing thing");
    }

    #[test]
    fn json_error_reads_dunder_type() {
        let body = br#"{"__type":"com.amazon#ThrottlingException","message":"slow down"}"#;
        let extracted = extract_error_code(&ServiceProtocol::Json { version: "1.1" }, &HashMap::new(), body);
        assert_eq!(extracted.code, "com.amazon#ThrottlingException");
        assert_eq!(extracted.message, "slow down");
    }

    #[test]
    fn classify_known_client_code_as_client_error() {
        let err = classify(
            400,
            ErrorCode {
                code: "NoSuchBucket".into(),
                message: "bk".into(),
            },
            Vec::new(),
            &NoErrorTypes,
        );
        assert!(matches!(err, AWSError::AWSClientError { .. }));
    }

    #[test]
    fn classify_known_server_code_as_server_error() {
        let err = classify(
            503,
            ErrorCode {
                code: "ServiceUnavailable".into(),
                message: "busy".into(),
            },
            Vec::new(),
            &NoErrorTypes,
        );
        assert!(matches!(err, AWSError::AWSServerError { .. }));
    }

    /// Classification is keyed on the extracted code, not the HTTP status —
    /// a known server-fault code wrapped in a 4xx response still classifies
    /// as a server error.
    #[test]
    fn classify_ignores_status_when_code_is_known() {
        let err = classify(
            400,
            ErrorCode {
                code: "InternalFailure".into(),
                message: "oops".into(),
            },
            Vec::new(),
            &NoErrorTypes,
        );
        assert!(matches!(err, AWSError::AWSServerError { .. }));
    }

    #[test]
    fn classify_unknown_code_is_response_error() {
        let err = classify(
            418,
            ErrorCode {
                code: "SomeServiceSpecificFault".into(),
                message: "teapot".into(),
            },
            Vec::new(),
            &NoErrorTypes,
        );
        assert!(matches!(err, AWSError::AWSResponseError { .. }));
    }

    #[test]
    fn classify_empty_code_is_opaque() {
        let err = classify(
            200,
            ErrorCode {
                code: String::new(),
                message: String::new(),
            },
            b"raw".to_vec(),
            &NoErrorTypes,
        );
        assert!(matches!(err, AWSError::Opaque { .. }));
    }
}
