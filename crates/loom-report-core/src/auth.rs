// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authentication header sent with every delivery.

/// Name of the header carrying the credentials.
pub const AUTH_HEADER_NAME: &str = "X-Sentry-Auth";
/// Protocol version announced in the header.
pub const PROTOCOL_VERSION: u32 = 5;
/// Client identifier announced in the header.
pub const CLIENT_NAME: &str = concat!("loom-report-rust/", env!("CARGO_PKG_VERSION"));

/// Builds the auth header value. Identical inputs always produce identical
/// output.
pub fn auth_header(timestamp_millis: i64, public_key: &str, private_key: Option<&str>) -> String {
	let mut parts = vec![
		format!("Sentry sentry_version={PROTOCOL_VERSION}"),
		format!("sentry_timestamp={timestamp_millis}"),
		format!("sentry_client={CLIENT_NAME}"),
		format!("sentry_key={public_key}"),
	];
	if let Some(secret) = private_key.filter(|s| !s.is_empty()) {
		parts.push(format!("sentry_secret={secret}"));
	}
	parts.join(", ")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn header_contains_all_fields() {
		let header = auth_header(1_700_000_000_123, "pub", Some("priv"));
		assert_eq!(
			header,
			format!(
				"Sentry sentry_version=5, sentry_timestamp=1700000000123, sentry_client={CLIENT_NAME}, sentry_key=pub, sentry_secret=priv"
			)
		);
	}

	#[test]
	fn header_omits_missing_secret() {
		let header = auth_header(1, "pub", None);
		assert!(!header.contains("sentry_secret"));
		assert!(header.ends_with("sentry_key=pub"));
	}

	#[test]
	fn header_is_deterministic() {
		assert_eq!(
			auth_header(42, "pub", Some("priv")),
			auth_header(42, "pub", Some("priv"))
		);
		assert_ne!(auth_header(42, "pub", None), auth_header(43, "pub", None));
	}
}
