//! The wire protocol an operation is dispatched against.

/// One of AWS's handful of wire protocols. The request builder and response
/// validator both switch on `.kind()` to decide header/path/query/body
/// projection; everything else about a protocol (its JSON API version, or
/// an arbitrary unrecognized name) lives alongside the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceProtocol {
    /// `application/x-amz-json-{version}`, e.g. DynamoDB, STS.
    Json { version: &'static str },
    /// REST + JSON body, e.g. Lambda, ECS.
    RestJson,
    /// REST + XML body, e.g. S3, CloudFront.
    RestXml,
    /// Form-encoded `Action`/`Version` query protocol, e.g. IAM, SQS.
    Query,
    /// Anything else, named verbatim. `"ec2"` is the one name the core
    /// special-cases (query-shaped but always a form body).
    Other(&'static str),
}

impl ServiceProtocol {
    /// `true` for the `ec2` query variant, which forces a form body
    /// regardless of HTTP method.
    pub fn is_ec2(&self) -> bool {
        matches!(self, ServiceProtocol::Other(name) if name.eq_ignore_ascii_case("ec2"))
    }

    pub fn is_query_like(&self) -> bool {
        matches!(self, ServiceProtocol::Query) || self.is_ec2()
    }

    /// `Content-Type` the request builder stamps on a non-empty body for
    /// this protocol, used when the shape itself doesn't dictate one.
    pub fn default_content_type(&self) -> Option<&'static str> {
        match self {
            ServiceProtocol::Json { version } => {
                Some(match *version {
                    "1.0" => "application/x-amz-json-1.0",
                    "1.1" => "application/x-amz-json-1.1",
                    _ => "application/x-amz-json-1.1",
                })
            }
            ServiceProtocol::RestJson => Some("application/json"),
            ServiceProtocol::RestXml => Some("application/xml"),
            ServiceProtocol::Query => Some("application/x-www-form-urlencoded; charset=utf-8"),
            ServiceProtocol::Other(name) if name.eq_ignore_ascii_case("ec2") => {
                Some("application/x-www-form-urlencoded; charset=utf-8")
            }
            ServiceProtocol::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ec2_is_query_like_but_not_query() {
        let ec2 = ServiceProtocol::Other("ec2");
        assert!(ec2.is_ec2());
        assert!(ec2.is_query_like());
        assert_ne!(ec2, ServiceProtocol::Query);
    }

    #[test]
    fn unknown_other_has_no_default_content_type() {
        assert_eq!(ServiceProtocol::Other("wat").default_content_type(), None);
    }
}
