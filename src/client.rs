//! The client façade (§4.1): threads credential resolution, signing, request
//! building, transport, and response validation together behind four
//! `send`/`send_async` overloads.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use http::Method;
use url::Url;

use crate::body::Body;
use crate::builder::{RequestBuilder, RequestSpec};
use crate::credential::{
    resolve_credential, resolve_region, CredentialResolutionContext, EnvSource,
    ExplicitCredentials, ProcessEnv,
};
use crate::errors::{AWSError, ErrorRegistry, NoErrorTypes};
use crate::protocol::ServiceProtocol;
use crate::region::Region;
use crate::request::{AWSRequest, Middleware};
use crate::shape::{Shape, UnitShape};
use crate::signer::{SigningInput, Signer};
use crate::transport::{Transport, TransportRequest, TransportResponse};
use crate::validator::{HalLinkFetcher, OutputSpec, ResponseValidator};

/// Builder-style construction config: one place that gathers every
/// construction-time choice, consumed once by [`Client::new`].
#[derive(Clone)]
pub struct ClientConfig {
    pub service: String,
    pub protocol: ServiceProtocol,
    pub region: Option<Region>,
    pub explicit_credentials: ExplicitCredentials,
    pub credentials_file_path: Option<PathBuf>,
    pub endpoint_override: Option<Url>,
    pub service_endpoints: HashMap<Region, Url>,
    pub partition_endpoint: Option<String>,
    pub follow_hal_links: bool,
    pub error_registry: std::sync::Arc<dyn ErrorRegistry>,
    /// `query`/`ec2` protocol API version, injected into every request as
    /// the `Version` field (e.g. `"2010-05-08"` for IAM).
    pub api_version: String,
    /// `json`/`restjson` `X-Amz-Target` prefix (e.g. `DynamoDB_20120810`),
    /// combined with the operation name as `{prefix}.{operation}`.
    pub target_prefix: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("service", &self.service)
            .field("protocol", &self.protocol)
            .field("region", &self.region)
            .field("explicit_credentials", &"<redacted>")
            .field("credentials_file_path", &self.credentials_file_path)
            .field("endpoint_override", &self.endpoint_override)
            .field("service_endpoints", &self.service_endpoints)
            .field("partition_endpoint", &self.partition_endpoint)
            .field("follow_hal_links", &self.follow_hal_links)
            .field("api_version", &self.api_version)
            .field("target_prefix", &self.target_prefix)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(service: impl Into<String>, protocol: ServiceProtocol) -> Self {
        ClientConfig {
            service: service.into(),
            protocol,
            region: None,
            explicit_credentials: ExplicitCredentials::default(),
            credentials_file_path: None,
            endpoint_override: None,
            service_endpoints: HashMap::new(),
            partition_endpoint: None,
            follow_hal_links: true,
            error_registry: std::sync::Arc::new(NoErrorTypes),
            api_version: String::new(),
            target_prefix: None,
        }
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn target_prefix(mut self, target_prefix: impl Into<String>) -> Self {
        self.target_prefix = Some(target_prefix.into());
        self
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn credentials(mut self, access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        self.explicit_credentials.access_key_id = Some(access_key_id.into());
        self.explicit_credentials.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn endpoint_override(mut self, endpoint: Url) -> Self {
        self.endpoint_override = Some(endpoint);
        self
    }

    pub fn error_registry(mut self, registry: std::sync::Arc<dyn ErrorRegistry>) -> Self {
        self.error_registry = registry;
        self
    }

    pub fn follow_hal_links(mut self, follow: bool) -> Self {
        self.follow_hal_links = follow;
        self
    }
}

/// An immutable, thread-safe client bundle. Construction resolves
/// credentials and region once (§4.3, §5 "Shared resources"); every call
/// after that is stateless with respect to the client.
pub struct Client {
    config: ClientConfig,
    signer: Signer,
    region: Region,
    transport: Transport,
    middleware: Vec<Box<dyn Middleware + Send + Sync>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, AWSError> {
        Self::with_env(config, &ProcessEnv)
    }

    /// Testable constructor: takes an `EnvSource` so credential/region
    /// resolution doesn't depend on real process environment variables.
    pub fn with_env(config: ClientConfig, env: &dyn EnvSource) -> Result<Self, AWSError> {
        let credential_ctx = CredentialResolutionContext {
            explicit: config.explicit_credentials.clone(),
            credentials_file_path: config.credentials_file_path.clone(),
        };
        let credential = resolve_credential(&credential_ctx, env)?;
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| resolve_region(None, config.partition_endpoint.as_deref(), env));

        let signer = Signer::new(credential, region.clone(), config.service.clone());
        Ok(Client {
            config,
            signer,
            region,
            transport: Transport::new(),
            middleware: Vec::new(),
        })
    }

    pub fn with_middleware(mut self, middleware: Box<dyn Middleware + Send + Sync>) -> Self {
        self.middleware.push(middleware);
        self
    }

    fn endpoint(&self) -> Result<Url, AWSError> {
        if let Some(endpoint) = &self.config.endpoint_override {
            return Ok(endpoint.clone());
        }
        if let Some(endpoint) = self.config.service_endpoints.get(&self.region) {
            return Ok(endpoint.clone());
        }
        let host = self.region.default_hostname(&self.config.service);
        Url::parse(&format!("https://{host}")).map_err(|e| AWSError::InvalidUrl(e.to_string()))
    }

    /// Decides header-signing vs. URL pre-signing: `RestJson` signs as
    /// headers on GET; every other protocol pre-signs on GET; any non-GET
    /// method always signs as headers. The "GET + other protocol" bucket is
    /// applied literally across all five `ServiceProtocol` variants rather
    /// than singling out `Other(_)`.
    fn should_presign(&self, method: &Method, protocol: &ServiceProtocol) -> bool {
        *method == Method::GET && !matches!(protocol, ServiceProtocol::RestJson)
    }

    async fn dispatch_signing(&self, request: &mut AWSRequest) -> Result<(), AWSError> {
        let date = Utc::now();
        if self.should_presign(&request.method, &request.protocol) {
            let presigned = self.signer.presign_url(
                request.method.as_str(),
                request.url.clone(),
                date,
                chrono::Duration::minutes(15),
            )?;
            request.url = presigned;
            insert_host_header(request)?;
        } else {
            insert_host_header(request)?;
            let headers_for_signing = request.headers_for_signing();
            let input = SigningInput {
                method: request.method.as_str(),
                url: &request.url,
                headers: &headers_for_signing,
                body: request.body.as_bytes(),
                date,
            };
            let signed = self.signer.sign_headers(&input)?;
            request.apply_signed_headers(signed)?;
        }
        Ok(())
    }

    async fn dispatch(&self, mut request: AWSRequest) -> Result<TransportResponse, AWSError> {
        for mw in &self.middleware {
            mw.before_send(&mut request).await?;
        }

        self.dispatch_signing(&mut request).await?;

        request
            .headers
            .entry(http::header::USER_AGENT)
            .or_insert_with(crate::transport::user_agent_header);
        request
            .headers
            .entry(http::header::ACCEPT)
            .or_insert_with(|| http::HeaderValue::from_static("*/*"));
        request.headers.insert(
            http::header::CONTENT_LENGTH,
            http::HeaderValue::from_str(&request.body.as_bytes().len().to_string())
                .map_err(|e| AWSError::InvalidUrl(e.to_string()))?,
        );
        request
            .headers
            .insert(http::header::CONNECTION, http::HeaderValue::from_static("close"));

        let transport_request = TransportRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: bytes::Bytes::copy_from_slice(request.body.as_bytes()),
        };
        let response = self.transport.send(transport_request).await?;
        if !response.is_success() {
            tracing::warn!(status = response.status, "non-2xx response");
        }

        for mw in self.middleware.iter().rev() {
            mw.after_receive(&response).await?;
        }

        Ok(response)
    }

    /// `send(op, path, method)` — no input, no output.
    pub async fn send_async(
        &self,
        operation: &str,
        path: &str,
        method: Method,
    ) -> Result<(), AWSError> {
        self.send_with_input_async(operation, path, method, &UnitShape).await
    }

    /// `send(op, path, method, input)` — typed input, no output.
    pub async fn send_with_input_async(
        &self,
        operation: &str,
        path: &str,
        method: Method,
        input: &dyn Shape,
    ) -> Result<(), AWSError> {
        let spec = RequestSpec {
            operation,
            path,
            method,
            protocol: self.config.protocol.clone(),
            target_prefix: self.config.target_prefix.as_deref(),
            api_version: &self.config.api_version,
        };
        let request = RequestBuilder::build(&self.endpoint()?, self.region.clone(), &self.config.service, &spec, input)?;
        self.dispatch(request).await?;
        Ok(())
    }

    /// `send(op, path, method) -> Output` — no input, typed output.
    pub async fn send_for_output_async<O: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        method: Method,
        output_spec: &OutputSpec,
    ) -> Result<O, AWSError> {
        self.send_with_input_for_output_async(operation, path, method, &UnitShape, output_spec)
            .await
    }

    /// `send(op, path, method, input) -> Output` — typed input and output.
    pub async fn send_with_input_for_output_async<O: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        method: Method,
        input: &dyn Shape,
        output_spec: &OutputSpec,
    ) -> Result<O, AWSError> {
        let spec = RequestSpec {
            operation,
            path,
            method,
            protocol: self.config.protocol.clone(),
            target_prefix: self.config.target_prefix.as_deref(),
            api_version: &self.config.api_version,
        };
        let request = RequestBuilder::build(&self.endpoint()?, self.region.clone(), &self.config.service, &spec, input)?;
        let response = self.dispatch(request).await?;
        ResponseValidator::decode(
            &response,
            &self.config.protocol,
            output_spec,
            self.config.error_registry.as_ref(),
            Some(self as &dyn HalLinkFetcher),
        )
        .await
    }

    /// The blocking mirror of the four async overloads: `wait()` on a
    /// single-threaded current-thread runtime, as §4.1/§9 call for.
    pub fn send(&self, operation: &str, path: &str, method: Method) -> Result<(), AWSError> {
        block_on(self.send_async(operation, path, method))
    }

    pub fn send_with_input(
        &self,
        operation: &str,
        path: &str,
        method: Method,
        input: &dyn Shape,
    ) -> Result<(), AWSError> {
        block_on(self.send_with_input_async(operation, path, method, input))
    }

    pub fn send_for_output<O: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        method: Method,
        output_spec: &OutputSpec,
    ) -> Result<O, AWSError> {
        block_on(self.send_for_output_async(operation, path, method, output_spec))
    }

    pub fn send_with_input_for_output<O: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        method: Method,
        input: &dyn Shape,
        output_spec: &OutputSpec,
    ) -> Result<O, AWSError> {
        block_on(self.send_with_input_for_output_async(operation, path, method, input, output_spec))
    }
}

fn insert_host_header(request: &mut AWSRequest) -> Result<(), AWSError> {
    let host = request
        .url
        .host_str()
        .ok_or_else(|| AWSError::InvalidUrl(request.url.to_string()))?;
    request.headers.insert(
        http::header::HOST,
        http::HeaderValue::from_str(host).map_err(|e| AWSError::InvalidUrl(e.to_string()))?,
    );
    Ok(())
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("building a current-thread runtime for the blocking façade")
        .block_on(future)
}

#[async_trait]
impl HalLinkFetcher for Client {
    async fn fetch(&self, href: &str) -> Result<TransportResponse, AWSError> {
        tracing::debug!(href, "following HAL link");
        let url = self
            .endpoint()?
            .join(href)
            .map_err(|e| AWSError::InvalidUrl(e.to_string()))?;
        let mut request = AWSRequest {
            region: self.region.clone(),
            service: self.config.service.clone(),
            operation: "HalLinkFollow".to_string(),
            protocol: self.config.protocol.clone(),
            amz_target: None,
            method: Method::GET,
            url,
            headers: http::HeaderMap::new(),
            body: Body::Empty,
        };
        self.dispatch_signing(&mut request).await?;
        let transport_request = TransportRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: bytes::Bytes::new(),
        };
        self.transport.send(transport_request).await
    }
}
