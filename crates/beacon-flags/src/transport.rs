// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Transport adapter used for every call to the flags service.
//!
//! The SDK never talks HTTP directly; it hands a [`TransportRequest`] to a
//! [`Transport`]. [`HttpTransport`] is the default, backed by `reqwest`.
//! Retries, timeouts, and TLS are the transport's business.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

/// Header carrying the environment key on every request.
pub const ENVIRONMENT_KEY_HEADER: &str = "x-environment-key";

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// HTTP method used by the flags API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
	Get,
	Post,
	Put,
}

impl Method {
	pub fn as_str(&self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
		}
	}
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A single request to the flags service.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
	pub url: String,
	pub method: Method,
	pub headers: Vec<(String, String)>,
	pub body: Option<String>,
}

impl TransportRequest {
	/// Builds a request with the environment key header, plus the JSON content
	/// type for anything other than GET.
	pub fn new(
		url: impl Into<String>,
		method: Method,
		environment_id: &str,
		body: Option<String>,
	) -> Self {
		let mut headers = vec![(
			ENVIRONMENT_KEY_HEADER.to_string(),
			environment_id.to_string(),
		)];
		if method != Method::Get {
			headers.push(("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()));
		}
		Self {
			url: url.into(),
			method,
			headers,
			body,
		}
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(k, _)| k.eq_ignore_ascii_case(name))
			.map(|(_, v)| v.as_str())
	}
}

/// Failure reported by a transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
	/// The service answered with a non-2xx status. `body` is the parsed JSON
	/// error body, or the raw text as a JSON string when it was not JSON.
	#[error("server error ({status}): {body}")]
	Status { status: u16, body: serde_json::Value },

	/// The request never produced a response.
	#[error("network error: {0}")]
	Network(String),

	/// A 2xx response whose body was not JSON.
	#[error("invalid response body: {0}")]
	InvalidBody(String),
}

/// Performs requests against the flags service.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
	/// Sends the request and returns the parsed JSON response body.
	///
	/// An empty 2xx body is returned as `Value::Null`.
	async fn request(&self, request: TransportRequest)
		-> Result<serde_json::Value, TransportError>;
}

/// Type alias for a shared transport.
pub type SharedTransport = Arc<dyn Transport>;

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
	async fn request(
		&self,
		request: TransportRequest,
	) -> Result<serde_json::Value, TransportError> {
		(**self).request(request).await
	}
}

/// Default transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
	client: Client,
}

impl HttpTransport {
	/// Creates a transport with the shared Beacon client settings.
	pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
		Ok(Self {
			client: beacon_common_http::new_client_with_timeout(timeout)?,
		})
	}

	/// Wraps an already configured client.
	pub fn with_client(client: Client) -> Self {
		Self { client }
	}
}

#[async_trait]
impl Transport for HttpTransport {
	async fn request(
		&self,
		request: TransportRequest,
	) -> Result<serde_json::Value, TransportError> {
		let method = match request.method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
		};

		debug!(url = %request.url, method = %request.method, "Sending request");

		let mut builder = self.client.request(method, &request.url);
		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if let Some(body) = request.body {
			builder = builder.body(body);
		}

		let response = builder
			.send()
			.await
			.map_err(|e| TransportError::Network(e.to_string()))?;

		let status = response.status();
		let text = response
			.text()
			.await
			.map_err(|e| TransportError::Network(e.to_string()))?;

		if !status.is_success() {
			let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
			warn!(url = %request.url, status = status.as_u16(), "Request rejected");
			return Err(TransportError::Status {
				status: status.as_u16(),
				body,
			});
		}

		if text.trim().is_empty() {
			return Ok(serde_json::Value::Null);
		}

		serde_json::from_str(&text).map_err(|e| TransportError::InvalidBody(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use wiremock::matchers::{body_string, header, method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn transport() -> HttpTransport {
		HttpTransport::new(Duration::from_secs(5)).unwrap()
	}

	#[test]
	fn test_get_request_has_no_content_type() {
		let request = TransportRequest::new("https://x.test/flags/", Method::Get, "abc", None);
		assert_eq!(request.header(ENVIRONMENT_KEY_HEADER), Some("abc"));
		assert_eq!(request.header("content-type"), None);
	}

	#[test]
	fn test_post_request_has_json_content_type() {
		let request = TransportRequest::new(
			"https://x.test/traits/",
			Method::Post,
			"abc",
			Some("{}".to_string()),
		);
		assert_eq!(request.header("Content-Type"), Some(JSON_CONTENT_TYPE));
	}

	#[tokio::test]
	async fn test_get_returns_json() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/flags/"))
			.and(header(ENVIRONMENT_KEY_HEADER, "abc"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
			.expect(1)
			.mount(&server)
			.await;

		let url = format!("{}/flags/", server.uri());
		let body = transport()
			.request(TransportRequest::new(url, Method::Get, "abc", None))
			.await
			.unwrap();

		assert_eq!(body, json!([{"id": 1}]));
	}

	#[tokio::test]
	async fn test_query_and_body_are_forwarded() {
		let server = MockServer::start().await;
		Mock::given(method("PUT"))
			.and(path("/traits/bulk/"))
			.and(body_string("[1,2]"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/identities/"))
			.and(query_param("identifier", "jane doe"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"flags": []})))
			.mount(&server)
			.await;

		let put = TransportRequest::new(
			format!("{}/traits/bulk/", server.uri()),
			Method::Put,
			"abc",
			Some("[1,2]".to_string()),
		);
		assert_eq!(transport().request(put).await.unwrap(), json!({"ok": true}));

		let get = TransportRequest::new(
			format!("{}/identities/?identifier=jane%20doe", server.uri()),
			Method::Get,
			"abc",
			None,
		);
		assert_eq!(transport().request(get).await.unwrap(), json!({"flags": []}));
	}

	#[tokio::test]
	async fn test_error_status_carries_parsed_body() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "bad"})))
			.mount(&server)
			.await;

		let err = transport()
			.request(TransportRequest::new(server.uri(), Method::Get, "abc", None))
			.await
			.unwrap_err();

		match err {
			TransportError::Status { status, body } => {
				assert_eq!(status, 500);
				assert_eq!(body, json!({"error": "bad"}));
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_error_status_with_text_body() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
			.mount(&server)
			.await;

		let err = transport()
			.request(TransportRequest::new(server.uri(), Method::Get, "abc", None))
			.await
			.unwrap_err();

		assert!(matches!(
			err,
			TransportError::Status { status: 403, body } if body == json!("forbidden")
		));
	}

	#[tokio::test]
	async fn test_empty_success_body_is_null() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;

		let body = transport()
			.request(TransportRequest::new(
				server.uri(),
				Method::Post,
				"abc",
				Some("{}".to_string()),
			))
			.await
			.unwrap();

		assert_eq!(body, serde_json::Value::Null);
	}

	#[tokio::test]
	async fn test_connection_failure_is_network_error() {
		let err = transport()
			.request(TransportRequest::new(
				"http://127.0.0.1:1/flags/",
				Method::Get,
				"abc",
				None,
			))
			.await
			.unwrap_err();

		assert!(matches!(err, TransportError::Network(_)));
	}
}
