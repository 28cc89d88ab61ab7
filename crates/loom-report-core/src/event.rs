// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The outbound event record and its exception/stacktrace interfaces.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::breadcrumb::{Breadcrumb, BreadcrumbLevel};
use crate::error::CoreError;
use crate::Map;

/// Client-generated event identifier: 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
	pub fn new() -> Self {
		Self(Uuid::new_v4().simple().to_string())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for EventId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for EventId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for EventId {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.replace('-', "").to_ascii_lowercase();
		if s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit()) {
			Ok(Self(s))
		} else {
			Err(CoreError::InvalidEventId(s))
		}
	}
}

/// Formats a timestamp as ISO-8601 UTC truncated to whole seconds, without
/// an offset suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
	at.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// A single stack frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub module: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub filename: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub abs_path: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub lineno: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub colno: Option<u32>,
	#[serde(default)]
	pub in_app: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stacktrace {
	pub frames: Vec<Frame>,
}

/// Exception interface of an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exception {
	#[serde(rename = "type")]
	pub ty: String,
	pub value: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub module: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stacktrace: Option<Stacktrace>,
}

impl Exception {
	/// Function of the innermost in-app frame, if any. Frames are ordered
	/// innermost last.
	pub fn culprit(&self) -> Option<String> {
		self.stacktrace
			.as_ref()?
			.frames
			.iter()
			.rfind(|f| f.in_app)
			.and_then(|f| f.function.clone())
	}
}

/// Breadcrumb interface of an event: `{ "values": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreadcrumbValues {
	pub values: Vec<Breadcrumb>,
}

/// Identifies the client that produced an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SdkInfo {
	pub name: String,
	pub version: String,
}

/// A fully assembled event, ready for delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
	pub event_id: EventId,
	pub timestamp: String,
	pub platform: String,
	pub level: BreadcrumbLevel,
	pub server_name: String,
	pub logger: String,
	pub environment: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub release: Option<String>,
	pub project: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub exception: Vec<Exception>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub culprit: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub fingerprint: Vec<String>,
	#[serde(default)]
	pub user: Map,
	#[serde(default)]
	pub tags: Map,
	#[serde(default)]
	pub extra: Map,
	#[serde(default)]
	pub request: Map,
	#[serde(default)]
	pub breadcrumbs: BreadcrumbValues,
	#[serde(default)]
	pub modules: BTreeMap<String, String>,
	#[serde(default)]
	pub sdk: SdkInfo,
}

impl Event {
	/// Creates an empty event with the given id.
	pub fn new(event_id: EventId) -> Self {
		Self {
			event_id,
			level: BreadcrumbLevel::Error,
			..Default::default()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn event_id_is_32_hex_chars() {
		let id = EventId::new();
		assert_eq!(id.as_str().len(), 32);
		assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
		assert_ne!(id, EventId::new());
	}

	#[test]
	fn event_id_parses_hyphenated_uuid() {
		let id: EventId = "0F8FAD5B-D9CB-469F-A165-70867728950E".parse().unwrap();
		assert_eq!(id.as_str(), "0f8fad5bd9cb469fa16570867728950e");
		assert!("nope".parse::<EventId>().is_err());
	}

	#[test]
	fn timestamp_is_truncated_to_seconds() {
		let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
			+ chrono::Duration::milliseconds(891);
		assert_eq!(format_timestamp(at), "2024-03-09T14:05:07");
	}

	#[test]
	fn culprit_is_innermost_in_app_frame() {
		let frame = |function: &str, in_app: bool| Frame {
			function: Some(function.to_string()),
			in_app,
			..Default::default()
		};
		let exception = Exception {
			ty: "Error".to_string(),
			value: "boom".to_string(),
			module: None,
			stacktrace: Some(Stacktrace {
				frames: vec![
					frame("std::rt::lang_start", false),
					frame("my_app::main", true),
					frame("my_app::handler", true),
					frame("std::panicking::begin_panic", false),
				],
			}),
		};
		assert_eq!(exception.culprit().as_deref(), Some("my_app::handler"));
	}

	#[test]
	fn serialized_event_omits_absent_interfaces() {
		let value = serde_json::to_value(Event::new(EventId::new())).unwrap();
		assert!(value.get("release").is_none());
		assert!(value.get("exception").is_none());
		assert_eq!(value["level"], "error");
		assert_eq!(value["breadcrumbs"]["values"], serde_json::json!([]));
	}
}
