// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the report SDK.

use thiserror::Error;

/// Result type alias for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Errors that can occur in the report SDK.
///
/// Delivery failures never propagate out of the capture API; they reach
/// callers only through completion callbacks and delivery notices.
#[derive(Debug, Error)]
pub enum ReportError {
	/// The client was built outside of a tokio runtime.
	#[error("no tokio runtime available; build the client inside a runtime")]
	NoRuntime,

	/// HTTP client construction failed.
	#[error("failed to build HTTP client: {0}")]
	HttpClient(#[source] reqwest::Error),

	/// The transport could not reach the endpoint.
	#[error("transport error: {0}")]
	Transport(#[from] reqwest::Error),

	/// The endpoint rejected the event.
	#[error("server error (status {status}): {message}")]
	ServerError {
		/// HTTP status code.
		status: u16,
		/// Error reported by the endpoint.
		message: String,
	},

	/// Failed to serialize the event.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	/// Failed to compress the payload.
	#[error("compression error: {0}")]
	Compression(#[from] std::io::Error),

	/// Sending is disabled (no DSN configured).
	#[error("sending is disabled: no valid DSN configured")]
	Disabled,

	/// A custom transport failed.
	#[error("{0}")]
	Other(String),
}
