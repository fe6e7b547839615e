//! AWS Signature Version 4: header signing and pre-signed URLs.
//!
//! Canonicalization follows §4.5 exactly: a canonical request is built from
//! the method, path, query, headers and payload hash, hashed, folded into a
//! string-to-sign, and signed with the date/region/service-scoped HMAC chain.
//! Header signing and URL pre-signing share every step except where the
//! payload hash and signature placement differ.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use sha2::{Digest, Sha256};
use url::Url;

use crate::credential::Credential;
use crate::errors::AWSError;
use crate::region::Region;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of the empty string, used as the payload hash of bodiless GETs.
const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// AWS's canonical-URI allow-list: unreserved characters only (`A-Z a-z 0-9
/// - _ . ~`); everything else, including `/`, is percent-encoded segment by
/// segment so the separators themselves survive.
const URI_UNRESERVED: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'!')
    .add(b'"')
    .add(b'#')
    .add(b'$')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// The query-string allow-list is the same unreserved set (AWS encodes `/`
/// and `=` within values too, since key and value are encoded separately and
/// rejoined with a literal `=`).
const QUERY_UNRESERVED: &AsciiSet = URI_UNRESERVED;

fn encode_uri_segment(segment: &str) -> String {
    utf8_percent_encode(segment, URI_UNRESERVED).to_string()
}

fn encode_query_component(component: &str) -> String {
    utf8_percent_encode(component, QUERY_UNRESERVED).to_string()
}

/// One already-sorted `(key, value)` pair to sign; the builder feeds these
/// in from the assembled request so the signer never re-derives encoding
/// rules already applied by `RequestBuilder`.
#[derive(Debug, Clone)]
pub struct SignableQueryParam {
    pub key: String,
    pub value: String,
}

/// Everything the signer needs about a request; deliberately narrower than
/// `AWSRequest` so `Signer` has no dependency on the builder/transport types.
pub struct SigningInput<'a> {
    pub method: &'a str,
    pub url: &'a Url,
    pub headers: &'a [(String, String)],
    pub body: &'a [u8],
    pub date: DateTime<Utc>,
}

pub struct Signer {
    pub credential: Credential,
    pub region: Region,
    pub service: String,
}

impl Signer {
    pub fn new(credential: Credential, region: Region, service: impl Into<String>) -> Self {
        Signer {
            credential,
            region,
            service: service.into(),
        }
    }

    fn credential_scope(&self, date: DateTime<Utc>) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            date.format("%Y%m%d"),
            self.region.as_str(),
            self.service
        )
    }

    fn signing_key(&self, date: DateTime<Utc>) -> Vec<u8> {
        let k_date = hmac_sha256(
            format!("AWS4{}", self.credential.secret_access_key).as_bytes(),
            date.format("%Y%m%d").to_string().as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.region.as_str().as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }

    /// Canonical URI: the path, percent-encoded segment by segment so `/`
    /// separators are preserved. An empty path signs as `/`.
    fn canonical_uri(url: &Url) -> String {
        let path = url.path();
        if path.is_empty() {
            return "/".to_string();
        }
        path.split('/')
            .map(encode_uri_segment)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Canonical query string: pairs sorted by key then value, both
    /// percent-encoded, joined with `&`.
    fn canonical_query_string(url: &Url) -> String {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", encode_query_component(&k), encode_query_component(&v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn canonical_headers(headers: &[(String, String)]) -> (String, String) {
        let mut normalized: Vec<(String, String)> = headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), collapse_whitespace(v)))
            .collect();
        normalized.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical = normalized
            .iter()
            .map(|(k, v)| format!("{k}:{v}\n"))
            .collect::<String>();
        let signed = normalized
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        (canonical, signed)
    }

    fn canonical_request(
        method: &str,
        canonical_uri: &str,
        canonical_query: &str,
        canonical_headers: &str,
        signed_headers: &str,
        payload_hash: &str,
    ) -> String {
        format!(
            "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
        )
    }

    fn string_to_sign(&self, date: DateTime<Utc>, canonical_request: &str) -> String {
        format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date(date),
            self.credential_scope(date),
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        )
    }

    fn sign(&self, date: DateTime<Utc>, string_to_sign: &str) -> String {
        hex::encode(hmac_sha256(&self.signing_key(date), string_to_sign.as_bytes()))
    }

    /// Sign `input` as headers, returning the headers to add
    /// (`Authorization`, `X-Amz-Date`, and `X-Amz-Security-Token` when a
    /// session token is present). The caller merges these into the outgoing
    /// request; `Signer` never mutates a request type directly so it stays
    /// independent of the transport/request layer.
    pub fn sign_headers(&self, input: &SigningInput<'_>) -> Result<Vec<(String, String)>, AWSError> {
        let amz_date_value = amz_date(input.date);
        let mut headers = input.headers.to_vec();
        headers.push(("x-amz-date".to_string(), amz_date_value.clone()));
        if let Some(token) = &self.credential.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        let (canonical_headers, signed_headers) = Self::canonical_headers(&headers);
        let payload_hash = if input.body.is_empty() {
            EMPTY_PAYLOAD_HASH.to_string()
        } else {
            hex::encode(Sha256::digest(input.body))
        };
        let canonical_request = Self::canonical_request(
            input.method,
            &Self::canonical_uri(input.url),
            &Self::canonical_query_string(input.url),
            &canonical_headers,
            &signed_headers,
            &payload_hash,
        );
        let string_to_sign = self.string_to_sign(input.date, &canonical_request);
        tracing::trace!(canonical_request, string_to_sign, "computed SigV4 string to sign");
        let signature = self.sign(input.date, &string_to_sign);

        let mut out = vec![
            ("x-amz-date".to_string(), amz_date_value),
            (
                "authorization".to_string(),
                format!(
                    "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
                    self.credential.access_key_id,
                    self.credential_scope(input.date),
                    signed_headers,
                    signature
                ),
            ),
        ];
        if let Some(token) = &self.credential.session_token {
            out.push(("x-amz-security-token".to_string(), token.clone()));
        }
        Ok(out)
    }

    /// Build a pre-signed URL by appending the five (six with a session
    /// token) `X-Amz-*` query parameters per §4.5. `url` is consumed and
    /// returned rather than mutated in place, since the caller typically
    /// wants the final `Url` and nothing else.
    pub fn presign_url(
        &self,
        method: &str,
        mut url: Url,
        date: DateTime<Utc>,
        expires_in: chrono::Duration,
    ) -> Result<Url, AWSError> {
        let amz_date_value = amz_date(date);
        let credential_param = format!("{}/{}", self.credential.access_key_id, self.credential_scope(date));
        let host = host_header(&url)?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("X-Amz-Algorithm", "AWS4-HMAC-SHA256");
            pairs.append_pair("X-Amz-Credential", &credential_param);
            pairs.append_pair("X-Amz-Date", &amz_date_value);
            pairs.append_pair("X-Amz-Expires", &expires_in.num_seconds().to_string());
            pairs.append_pair("X-Amz-SignedHeaders", "host");
            if let Some(token) = &self.credential.session_token {
                pairs.append_pair("X-Amz-Security-Token", token);
            }
        }

        let headers = vec![("host".to_string(), host)];
        let (canonical_headers, signed_headers) = Self::canonical_headers(&headers);
        let canonical_request = Self::canonical_request(
            method,
            &Self::canonical_uri(&url),
            &Self::canonical_query_string(&url),
            &canonical_headers,
            &signed_headers,
            UNSIGNED_PAYLOAD,
        );
        let string_to_sign = self.string_to_sign(date, &canonical_request);
        tracing::trace!(canonical_request, string_to_sign, "computed SigV4 string to sign");
        let signature = self.sign(date, &string_to_sign);

        url.query_pairs_mut()
            .append_pair("X-Amz-Signature", &signature);
        Ok(url)
    }
}

fn host_header(url: &Url) -> Result<String, AWSError> {
    let host = url
        .host_str()
        .ok_or_else(|| AWSError::InvalidUrl(url.to_string()))?;
    match url.port() {
        Some(port) if !is_default_port(url.scheme(), port) => Ok(format!("{host}:{port}")),
        _ => Ok(host.to_string()),
    }
}

fn is_default_port(scheme: &str, port: u16) -> bool {
    matches!((scheme, port), ("https", 443) | ("http", 80))
}

fn amz_date(date: DateTime<Utc>) -> String {
    date.format("%Y%m%dT%H%M%SZ").to_string()
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn example_credential() -> Credential {
        Credential {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: None,
            expiration: None,
        }
    }

    /// §8 scenario 1: the canonical AWS SigV4 worked example (IAM
    /// `ListUsers`, header signing).
    #[test]
    fn sigv4_header_signing_canonical_example() {
        let signer = Signer::new(example_credential(), Region::UsEast1, "iam");
        let url = Url::parse("https://iam.amazonaws.com/?Action=ListUsers&Version=2010-05-08").unwrap();
        let date = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let input = SigningInput {
            method: "GET",
            url: &url,
            headers: &[("host".to_string(), "iam.amazonaws.com".to_string())],
            body: b"",
            date,
        };

        let headers = signer.sign_headers(&input).unwrap();
        let auth = headers
            .iter()
            .find(|(k, _)| k == "authorization")
            .unwrap()
            .1
            .clone();
        assert!(auth.contains("Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"));
        assert!(auth.contains("Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request"));
        assert!(auth.contains("SignedHeaders=host;x-amz-date"));
    }

    /// §8 scenario 2: S3 pre-signed GET.
    #[test]
    fn sigv4_presign_s3_get() {
        let signer = Signer::new(example_credential(), Region::UsEast1, "s3");
        let url = Url::parse("https://examplebucket.s3.amazonaws.com/test.txt").unwrap();
        let date = Utc.with_ymd_and_hms(2013, 5, 24, 0, 0, 0).unwrap();

        let signed = signer
            .presign_url("GET", url, date, chrono::Duration::seconds(86400))
            .unwrap();

        let signature = signed
            .query_pairs()
            .find(|(k, _)| k == "X-Amz-Signature")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(
            signature,
            "aeeed9bbccd4d02ee5c0109b86d86835f995330da4c265957d157751f604d404"
        );
        assert!(!signed.as_str().contains("Authorization"));
    }

    #[test]
    fn presigned_url_has_no_authorization_header_and_header_signed_has_no_amz_signature_query() {
        let signer = Signer::new(example_credential(), Region::UsEast1, "s3");
        let url = Url::parse("https://examplebucket.s3.amazonaws.com/test.txt").unwrap();
        let date = Utc.with_ymd_and_hms(2013, 5, 24, 0, 0, 0).unwrap();
        let presigned = signer
            .presign_url("GET", url.clone(), date, chrono::Duration::seconds(60))
            .unwrap();
        assert!(presigned.query_pairs().any(|(k, _)| k == "X-Amz-Algorithm"));
        assert!(presigned.query_pairs().any(|(k, _)| k == "X-Amz-Credential"));
        assert!(presigned.query_pairs().any(|(k, _)| k == "X-Amz-Date"));
        assert!(presigned.query_pairs().any(|(k, _)| k == "X-Amz-SignedHeaders"));
        assert!(presigned.query_pairs().any(|(k, _)| k == "X-Amz-Signature"));

        let input = SigningInput {
            method: "GET",
            url: &url,
            headers: &[("host".to_string(), "examplebucket.s3.amazonaws.com".to_string())],
            body: b"",
            date,
        };
        let headers = signer.sign_headers(&input).unwrap();
        assert!(headers.iter().any(|(k, _)| k == "authorization"));
        assert!(!headers.iter().any(|(k, v)| k == "authorization" && v.contains("X-Amz-Signature")));
    }

    #[test]
    fn signing_key_changes_deterministically_with_date() {
        let signer = Signer::new(example_credential(), Region::UsEast1, "iam");
        let d1 = Utc.with_ymd_and_hms(2015, 8, 30, 0, 0, 0).unwrap();
        let d2 = Utc.with_ymd_and_hms(2015, 8, 31, 0, 0, 0).unwrap();
        assert_ne!(signer.signing_key(d1), signer.signing_key(d2));
        assert_eq!(signer.signing_key(d1), signer.signing_key(d1));
    }

    #[test]
    fn canonical_query_string_sorts_by_key_then_value() {
        let url = Url::parse("https://example.com/?b=2&a=2&a=1").unwrap();
        assert_eq!(Signer::canonical_query_string(&url), "a=1&a=2&b=2");
    }

    #[test]
    fn canonical_headers_lowercases_sorts_and_collapses_whitespace() {
        let headers = vec![
            ("X-Amz-Date".to_string(), "20150830T123600Z".to_string()),
            ("Host".to_string(), "  iam.amazonaws.com  example  ".to_string()),
        ];
        let (canonical, signed) = Signer::canonical_headers(&headers);
        assert_eq!(
            canonical,
            "host:iam.amazonaws.com example\nx-amz-date:20150830T123600Z\n"
        );
        assert_eq!(signed, "host;x-amz-date");
    }

    proptest::proptest! {
        /// `signed_headers` is always sorted and lowercased regardless of
        /// input order or case.
        #[test]
        fn canonical_headers_signed_list_is_sorted_and_lowercase(
            names in proptest::collection::vec("[A-Za-z-]{1,12}", 1..8),
        ) {
            let headers: Vec<(String, String)> = names
                .iter()
                .map(|n| (n.clone(), "v".to_string()))
                .collect();
            let (_, signed) = Signer::canonical_headers(&headers);
            let parts: Vec<&str> = signed.split(';').collect();
            let mut sorted = parts.clone();
            sorted.sort();
            proptest::prop_assert_eq!(parts, sorted);
            proptest::prop_assert!(signed.chars().all(|c| !c.is_ascii_uppercase()));
        }

        /// Re-encoding an already-canonical query string is a no-op: the
        /// percent-encoding allow-list is idempotent on its own output.
        #[test]
        fn query_component_encoding_is_idempotent(
            value in "[a-zA-Z0-9._~-]{0,20}",
        ) {
            let once = encode_query_component(&value);
            let twice = encode_query_component(&once);
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
