// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire transports.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use loom_report_core::{Dsn, EventId};
use reqwest::{Certificate, Client};
use tracing::debug;

use crate::error::{ReportError, Result};

/// Header set by the collector with a human-readable rejection reason.
const ERROR_HEADER: &str = "x-sentry-error";

/// One encoded event on its way to the collector.
#[derive(Debug, Clone)]
pub struct TransportRequest {
	pub dsn: Dsn,
	/// Base64 of the zlib-deflated JSON event.
	pub payload: String,
	pub headers: BTreeMap<String, String>,
	pub event_id: EventId,
	pub send_timeout: Duration,
	/// PEM bundle trusted for this request, if configured.
	pub ca: Option<Arc<[u8]>>,
}

/// Delivers an encoded event. Exactly one attempt; the returned future's
/// output is the delivery outcome.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
	async fn send(&self, request: TransportRequest) -> Result<()>;
}

/// HTTP(S) transport that POSTs to the DSN's store endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
	client: Client,
}

impl HttpTransport {
	/// Builds a transport whose requests time out after `send_timeout`.
	pub fn new(send_timeout: Duration, ca: Option<&[u8]>) -> Result<Self> {
		let mut builder = Client::builder().timeout(send_timeout);
		if let Some(pem) = ca {
			let cert = Certificate::from_pem(pem).map_err(ReportError::HttpClient)?;
			builder = builder.add_root_certificate(cert);
		}
		let client = builder.build().map_err(ReportError::HttpClient)?;
		Ok(Self { client })
	}

	/// Wraps an existing client.
	pub fn with_client(client: Client) -> Self {
		Self { client }
	}
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
	async fn send(&self, request: TransportRequest) -> Result<()> {
		let url = request.dsn.store_url();
		debug!(url = %url, event_id = %request.event_id, "Sending report event");

		let mut builder = self.client.post(&url).timeout(request.send_timeout);
		for (name, value) in &request.headers {
			builder = builder.header(name, value);
		}

		let response = builder.body(request.payload).send().await?;

		if response.status().is_success() {
			return Ok(());
		}

		let status = response.status().as_u16();
		let message = match response.headers().get(ERROR_HEADER).and_then(|v| v.to_str().ok()) {
			Some(reason) => reason.to_string(),
			None => response.text().await.unwrap_or_default(),
		};
		Err(ReportError::ServerError { status, message })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{body_string, header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn request_for(server: &MockServer) -> TransportRequest {
		let dsn = Dsn::parse(&format!("{}/42", server.uri().replace("://", "://pub:priv@")))
			.unwrap();
		TransportRequest {
			dsn,
			payload: "eJzLSM3JyQcABiwCFQ==".to_string(),
			headers: BTreeMap::from([(
				"X-Sentry-Auth".to_string(),
				"Sentry sentry_version=5".to_string(),
			)]),
			event_id: EventId::new(),
			send_timeout: Duration::from_secs(1),
			ca: None,
		}
	}

	#[tokio::test]
	async fn posts_payload_to_store_endpoint() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/42/store/"))
			.and(header("X-Sentry-Auth", "Sentry sentry_version=5"))
			.and(body_string("eJzLSM3JyQcABiwCFQ=="))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;

		let transport = HttpTransport::new(Duration::from_secs(1), None).unwrap();
		transport.send(request_for(&server)).await.unwrap();
	}

	#[tokio::test]
	async fn non_success_carries_error_header() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(
				ResponseTemplate::new(403).insert_header("x-sentry-error", "Invalid api key"),
			)
			.mount(&server)
			.await;

		let transport = HttpTransport::new(Duration::from_secs(1), None).unwrap();
		let err = transport.send(request_for(&server)).await.unwrap_err();
		match err {
			ReportError::ServerError { status, message } => {
				assert_eq!(status, 403);
				assert_eq!(message, "Invalid api key");
			}
			other => panic!("unexpected error: {other}"),
		}
	}

	#[tokio::test]
	async fn slow_collector_times_out() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
			.mount(&server)
			.await;

		let transport = HttpTransport::new(Duration::from_millis(50), None).unwrap();
		let mut request = request_for(&server);
		request.send_timeout = Duration::from_millis(50);
		let err = transport.send(request).await.unwrap_err();
		assert!(matches!(err, ReportError::Transport(_)));
	}
}
