// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event encoding and one-shot delivery.
//!
//! Every delivery is a single attempt: serialize, deflate, base64, sign, hand
//! to the transport. The outcome is reported to the capture's completion
//! callback and broadcast as a [`DeliveryNotice`]; it is never returned to
//! the code that captured the event.

use std::collections::BTreeMap;
use std::future::Future;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use loom_report_core::{auth_header, Dsn, Event, EventId, AUTH_HEADER_NAME};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ReportError, Result};
use crate::transport::{Transport, TransportRequest};

/// Nesting deeper than this is replaced by [`DEPTH_PLACEHOLDER`].
pub const MAX_PAYLOAD_DEPTH: usize = 32;
pub const DEPTH_PLACEHOLDER: &str = "[max depth reached]";

const NOTICE_CAPACITY: usize = 64;

/// Completion callback for a capture: `(delivery error, event id)`.
pub type CaptureCallback = Box<dyn FnOnce(Option<ReportError>, EventId) + Send + 'static>;

/// Outcome of a delivery, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryNotice {
	Logged { event_id: EventId },
	Failed { event_id: EventId, error: String },
}

pub struct Dispatcher {
	dsn: Option<Dsn>,
	transport: Arc<dyn Transport>,
	send_timeout: Duration,
	ca: Option<Arc<[u8]>>,
	notices: broadcast::Sender<DeliveryNotice>,
	runtime: Handle,
}

impl Dispatcher {
	pub fn new(
		dsn: Option<Dsn>,
		transport: Arc<dyn Transport>,
		send_timeout: Duration,
		ca: Option<Vec<u8>>,
		runtime: Handle,
	) -> Self {
		let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
		Self {
			dsn,
			transport,
			send_timeout,
			ca: ca.map(Arc::from),
			notices,
			runtime,
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<DeliveryNotice> {
		self.notices.subscribe()
	}

	pub fn runtime(&self) -> &Handle {
		&self.runtime
	}

	/// Spawns on the runtime the caller runs in, or on the client's runtime
	/// outside of any. A fatal report made from a side runtime is then
	/// driven by that runtime.
	pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		spawn_here_or(&self.runtime, future)
	}

	/// Starts delivery of `event` in the background and returns immediately.
	pub fn send(self: &Arc<Self>, event: Event, callback: Option<CaptureCallback>) {
		let this = Arc::clone(self);
		self.spawn(async move {
			let event_id = event.event_id.clone();
			let result = this.deliver(&event).await;
			this.complete(event_id, result, callback);
		});
	}

	/// Encodes and delivers one event, waiting for the transport.
	pub async fn deliver(&self, event: &Event) -> Result<()> {
		let dsn = self.dsn.as_ref().ok_or(ReportError::Disabled)?;
		let json = serialize_event(event)?;
		let payload = encode_payload(json).await?;

		let auth = auth_header(
			Utc::now().timestamp_millis(),
			&dsn.public_key,
			dsn.private_key.as_deref(),
		);
		let headers = BTreeMap::from([
			(AUTH_HEADER_NAME.to_string(), auth),
			(
				"Content-Type".to_string(),
				"application/octet-stream".to_string(),
			),
		]);

		self.transport
			.send(TransportRequest {
				dsn: dsn.clone(),
				payload,
				headers,
				event_id: event.event_id.clone(),
				send_timeout: self.send_timeout,
				ca: self.ca.clone(),
			})
			.await
	}

	fn complete(&self, event_id: EventId, result: Result<()>, callback: Option<CaptureCallback>) {
		let error = match result {
			Ok(()) => {
				debug!(event_id = %event_id, "Report event delivered");
				let _ = self.notices.send(DeliveryNotice::Logged {
					event_id: event_id.clone(),
				});
				None
			}
			Err(e) => {
				warn!(event_id = %event_id, error = %e, "Failed to deliver report event");
				let _ = self.notices.send(DeliveryNotice::Failed {
					event_id: event_id.clone(),
					error: e.to_string(),
				});
				Some(e)
			}
		};

		if let Some(callback) = callback {
			callback(error, event_id);
		}
	}
}

pub(crate) fn spawn_here_or<F>(fallback: &Handle, future: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	match Handle::try_current() {
		Ok(current) => current.spawn(future),
		Err(_) => fallback.spawn(future),
	}
}

/// Serializes an event to JSON, replacing anything nested deeper than
/// [`MAX_PAYLOAD_DEPTH`] with a placeholder.
pub fn serialize_event(event: &Event) -> Result<Vec<u8>> {
	let mut value = serde_json::to_value(event)?;
	truncate_depth(&mut value, 0);
	Ok(serde_json::to_vec(&value)?)
}

fn truncate_depth(value: &mut Value, depth: usize) {
	match value {
		Value::Object(_) | Value::Array(_) if depth >= MAX_PAYLOAD_DEPTH => {
			*value = Value::from(DEPTH_PLACEHOLDER);
		}
		Value::Object(map) => map.values_mut().for_each(|v| truncate_depth(v, depth + 1)),
		Value::Array(items) => items.iter_mut().for_each(|v| truncate_depth(v, depth + 1)),
		_ => {}
	}
}

/// Deflates and base64-encodes a serialized event on the blocking pool.
pub async fn encode_payload(json: Vec<u8>) -> Result<String> {
	tokio::task::spawn_blocking(move || -> Result<String> {
		let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(&json)?;
		let compressed = encoder.finish()?;
		Ok(STANDARD.encode(compressed))
	})
	.await
	.map_err(|e| ReportError::Other(format!("payload encoding task failed: {e}")))?
}

/// Reverses [`encode_payload`]. Used by collectors and tests.
pub fn decode_payload(payload: &str) -> Result<Value> {
	let compressed = STANDARD
		.decode(payload)
		.map_err(|e| ReportError::Other(format!("invalid base64 payload: {e}")))?;
	let mut json = Vec::new();
	ZlibDecoder::new(compressed.as_slice()).read_to_end(&mut json)?;
	Ok(serde_json::from_slice(&json)?)
}
