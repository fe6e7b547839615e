//! A minimal, non-pooling HTTP/1.1 client (§4.6): one TCP connection (or TLS
//! session) per call, handshake, send, read the full response, close.
//!
//! Grounded on `a10y-fusio`'s `test_instance_metadata`, the one pack example
//! that drives `hyper::client::conn::http1::handshake` directly rather than
//! going through a pooled `hyper::Client`/`reqwest::Client` — exactly the
//! "no connection reuse between calls" contract this module must hold.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method};
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::errors::AWSError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub struct Transport {
    tls_connector: TlsConnector,
}

impl Default for Transport {
    fn default() -> Self {
        Transport::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        let mut root_store = tokio_rustls::rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = tokio_rustls::rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        Transport {
            tls_connector: TlsConnector::from(Arc::new(config)),
        }
    }

    pub async fn send(&self, request: TransportRequest) -> Result<TransportResponse, AWSError> {
        let host = request
            .url
            .host_str()
            .ok_or_else(|| AWSError::InvalidUrl(request.url.to_string()))?
            .to_string();
        let use_tls = request.url.scheme() == "https";
        let port = request
            .url
            .port_or_known_default()
            .ok_or_else(|| AWSError::InvalidUrl(request.url.to_string()))?;

        tracing::debug!(host, port, tls = use_tls, "connecting");
        let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| {
                tracing::warn!(host, port, "connect timed out");
                AWSError::ConnectTimeout(CONNECT_TIMEOUT)
            })?
            .map_err(|e| {
                tracing::warn!(host, port, error = %e, "transport connect error");
                AWSError::Transport(e.to_string())
            })?;

        if use_tls {
            let server_name = ServerName::try_from(host.clone())
                .map_err(|_| AWSError::InvalidUrl(request.url.to_string()))?;
            let tls_stream = self
                .tls_connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| AWSError::Transport(e.to_string()))?;
            self.send_on(TokioIo::new(tls_stream), request).await
        } else {
            self.send_on(TokioIo::new(tcp), request).await
        }
    }

    async fn send_on<S>(&self, io: TokioIo<S>, request: TransportRequest) -> Result<TransportResponse, AWSError>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sender, connection) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| AWSError::Transport(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::debug!(error = %err, "transport connection ended");
            }
        });

        let mut builder = hyper::Request::builder()
            .method(request.method)
            .uri(request.url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        let hyper_request = if request.body.is_empty() {
            builder
                .body(Empty::<Bytes>::new().boxed())
                .map_err(|e| AWSError::InvalidUrl(e.to_string()))?
        } else {
            builder
                .body(Full::new(request.body).boxed())
                .map_err(|e| AWSError::InvalidUrl(e.to_string()))?
        };

        let response = sender
            .send_request(hyper_request)
            .await
            .map_err(|e| AWSError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = collect_body(response.into_body())
            .await
            .map_err(|e| AWSError::MalformedBody(e.to_string()))?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

async fn collect_body(body: Incoming) -> Result<Bytes, hyper::Error> {
    Ok(body.collect().await?.to_bytes())
}

pub fn user_agent_header() -> HeaderValue {
    HeaderValue::from_static(concat!("aws-client-core/", env!("CARGO_PKG_VERSION")))
}
