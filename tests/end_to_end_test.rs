//! Builds, signs, sends (against a loopback listener), and decodes a full
//! `restjson` call — the full pipeline §8's unit-level scenarios exercise
//! piecewise.

use std::io::{Read, Write};

use aws_client_core::builder::{RequestBuilder, RequestSpec};
use aws_client_core::credential::Credential;
use aws_client_core::errors::NoErrorTypes;
use aws_client_core::protocol::ServiceProtocol;
use aws_client_core::region::Region;
use aws_client_core::shape::{FieldValue, Member, Shape};
use aws_client_core::signer::{Signer, SigningInput};
use aws_client_core::transport::{Transport, TransportRequest};
use aws_client_core::validator::{OutputSpec, ResponseValidator};
use chrono::Utc;
use http::Method;
use serde::Deserialize;
use serde_json::json;
use url::Url;

#[derive(Debug)]
struct CreateThingInput {
    name: String,
}

impl Shape for CreateThingInput {
    fn members(&self) -> &'static [Member] {
        &[Member {
            field_name: "name",
            label: "Name",
            location: None,
            member_type: aws_client_core::shape::MemberType::Scalar,
        }]
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
    fn get(&self, field_name: &str) -> Option<FieldValue> {
        match field_name {
            "name" => Some(FieldValue::Scalar(json!(self.name))),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct CreateThingOutput {
    #[serde(rename = "Id")]
    id: String,
}

#[tokio::test]
async fn restjson_call_round_trips_through_a_loopback_server() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).unwrap();
        let request = String::from_utf8_lossy(&buf[..n]);
        assert!(request.starts_with("PUT /things"));
        assert!(request.contains("authorization:") || request.contains("Authorization:"));
        assert!(request.contains("\"Name\":\"widget\""));

        let body = b"{\"Id\":\"thing-1\"}";
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        stream.write_all(response.as_bytes()).unwrap();
        stream.write_all(body).unwrap();
    });

    let endpoint = Url::parse(&format!("http://{addr}")).unwrap();
    let region = Region::UsEast1;
    let spec = RequestSpec {
        operation: "CreateThing",
        path: "/things",
        method: Method::PUT,
        protocol: ServiceProtocol::RestJson,
        target_prefix: None,
        api_version: "",
    };
    let input = CreateThingInput {
        name: "widget".to_string(),
    };

    let mut request = RequestBuilder::build(&endpoint, region.clone(), "things-service", &spec, &input).unwrap();

    let credential = Credential {
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
        session_token: None,
        expiration: None,
    };
    let signer = Signer::new(credential, region, "things-service");
    let headers_for_signing = request.headers_for_signing();
    let signing_input = SigningInput {
        method: request.method.as_str(),
        url: &request.url,
        headers: &headers_for_signing,
        body: request.body.as_bytes(),
        date: Utc::now(),
    };
    let signed_headers = signer.sign_headers(&signing_input).unwrap();
    request.apply_signed_headers(signed_headers).unwrap();
    request
        .headers
        .insert(http::header::CONNECTION, "close".parse().unwrap());

    let transport = Transport::new();
    let transport_request = TransportRequest {
        method: request.method.clone(),
        url: request.url.clone(),
        headers: request.headers.clone(),
        body: bytes::Bytes::copy_from_slice(request.body.as_bytes()),
    };
    let response = transport.send(transport_request).await.unwrap();

    let output: CreateThingOutput = ResponseValidator::decode(
        &response,
        &ServiceProtocol::RestJson,
        &OutputSpec::default(),
        &NoErrorTypes,
        None,
    )
    .await
    .unwrap();

    assert_eq!(output.id, "thing-1");
    server.join().unwrap();
}
