use async_trait::async_trait;
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
	Get,
	Post,
	Put,
	Delete,
	Patch,
}

impl HttpMethod {
	fn as_reqwest(self) -> reqwest::Method {
		match self {
			HttpMethod::Get => reqwest::Method::GET,
			HttpMethod::Post => reqwest::Method::POST,
			HttpMethod::Put => reqwest::Method::PUT,
			HttpMethod::Delete => reqwest::Method::DELETE,
			HttpMethod::Patch => reqwest::Method::PATCH,
		}
	}
}

#[derive(Debug, Clone)]
pub struct DownstreamResponse {
	pub status: u16,
	pub body: Value,
}

impl DownstreamResponse {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	pub fn is_not_found(&self) -> bool {
		self.status == 404
	}
}

/// The injectable seam the `Forwarder` talks to instead of a hardwired
/// `reqwest::Client` call, so tests can substitute `FakeTransport` and the
/// one real implementation (`HttpTransport`) reuses `reqwest` the way the
/// teacher's `ProviderClients` lazily builds and caches per-target clients.
#[async_trait]
pub trait DownstreamTransport: Send + Sync {
	async fn call(
		&self,
		base_url: &str,
		method: HttpMethod,
		path: &str,
		headers: &[(String, String)],
		body: Option<Value>,
	) -> GatewayResult<DownstreamResponse>;
}

/// The one real implementation: a lazily built, cached `reqwest::Client`.
pub struct HttpTransport {
	client: reqwest::Client,
}

impl HttpTransport {
	pub fn new() -> GatewayResult<Self> {
		let client = reqwest::Client::builder()
			.use_rustls_tls()
			.build()
			.map_err(|e| GatewayError::ServiceUnavailable(format!("failed to build downstream client: {e}")))?;
		Ok(Self { client })
	}
}

#[async_trait]
impl DownstreamTransport for HttpTransport {
	async fn call(
		&self,
		base_url: &str,
		method: HttpMethod,
		path: &str,
		headers: &[(String, String)],
		body: Option<Value>,
	) -> GatewayResult<DownstreamResponse> {
		let url = format!("{}{}", base_url.trim_end_matches('/'), path);
		let mut request = self.client.request(method.as_reqwest(), &url);
		for (key, value) in headers {
			request = request.header(key, value);
		}
		if let Some(body) = body {
			request = request.json(&body);
		}

		let response = request
			.send()
			.await
			.map_err(|e| GatewayError::EndpointNotAvailable(format!("{url}: {e}")))?;

		let status = response.status().as_u16();
		let body = response.json::<Value>().await.unwrap_or(Value::Null);
		Ok(DownstreamResponse { status, body })
	}
}
