//! `AWSRequest`: everything a `Signer` and `Transport` need for one call, and
//! the `Middleware` hook interface observing requests/responses around it.

use async_trait::async_trait;
use http::{HeaderMap, Method};
use url::Url;

use crate::body::Body;
use crate::errors::AWSError;
use crate::protocol::ServiceProtocol;
use crate::region::Region;
use crate::transport::TransportResponse;

/// An assembled, not-yet-signed (or already-signed) request. `RequestBuilder`
/// produces these; `Signer` adds headers or rewrites `url`; `Transport` sends
/// them. Field visibility is crate-internal-plus-`client` by convention —
/// there is nothing private about shape here, generated client code is
/// expected to construct one directly when the builder's generic dispatch
/// doesn't fit an operation.
#[derive(Debug, Clone)]
pub struct AWSRequest {
    pub region: Region,
    pub service: String,
    pub operation: String,
    pub protocol: ServiceProtocol,
    /// The JSON-protocol `X-Amz-Target` header value (`Service.Operation`),
    /// set only for `json`/`restjson`.
    pub amz_target: Option<String>,
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
}

impl AWSRequest {
    pub fn headers_for_signing(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    pub fn apply_signed_headers(&mut self, signed: Vec<(String, String)>) -> Result<(), AWSError> {
        for (name, value) in signed {
            let header_name = http::HeaderName::try_from(name)
                .map_err(|e| AWSError::InvalidUrl(e.to_string()))?;
            let header_value = http::HeaderValue::from_str(&value)
                .map_err(|e| AWSError::InvalidUrl(e.to_string()))?;
            self.headers.insert(header_name, header_value);
        }
        Ok(())
    }
}

/// Onion-model hooks observed around one call (§5 "Ordering guarantees"):
/// requests are observed in declared order, responses in reverse order.
/// Object-safe so a `Client` can hold a heterogeneous
/// `Vec<Box<dyn Middleware + Send + Sync>>`.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn before_send(&self, request: &mut AWSRequest) -> Result<(), AWSError> {
        let _ = request;
        Ok(())
    }

    async fn after_receive(&self, response: &TransportResponse) -> Result<(), AWSError> {
        let _ = response;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_signed_headers_inserts_case_insensitively_lookup_able_header() {
        let mut request = AWSRequest {
            region: Region::UsEast1,
            service: "iam".to_string(),
            operation: "ListUsers".to_string(),
            protocol: ServiceProtocol::Query,
            amz_target: None,
            method: Method::GET,
            url: Url::parse("https://iam.amazonaws.com/").unwrap(),
            headers: HeaderMap::new(),
            body: Body::Empty,
        };
        request
            .apply_signed_headers(vec![("Authorization".to_string(), "AWS4-HMAC-SHA256 ...".to_string())])
            .unwrap();
        assert!(request.headers.get("authorization").is_some());
    }
}
