//! Request/response body representation.

/// An outgoing request body. Kept as a small tagged enum rather than raw
/// bytes so `RequestBuilder` can record what shape produced it (useful for
/// `Content-Type` selection in `Transport`) without re-inspecting the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Empty,
    /// A `payloadPath` field whose member type is a scalar string.
    Text(String),
    Json(Vec<u8>),
    Xml(Vec<u8>),
    FormUrlEncoded(Vec<u8>),
    /// A `payloadPath` field whose member type is a blob.
    Raw(Vec<u8>),
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Empty => b"",
            Body::Text(s) => s.as_bytes(),
            Body::Json(b) | Body::Xml(b) | Body::FormUrlEncoded(b) | Body::Raw(b) => b,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Body::Empty => None,
            Body::Text(_) => Some("text/plain"),
            Body::Json(_) => Some("application/json"),
            Body::Xml(_) => Some("application/xml"),
            Body::FormUrlEncoded(_) => Some("application/x-www-form-urlencoded"),
            Body::Raw(_) => Some("application/octet-stream"),
        }
    }
}
