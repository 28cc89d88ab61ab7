// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request and user context types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Map;

/// Typed user context. Converts into the free-form `user` map of a scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	/// IP address (sensitive)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ip_address: Option<String>,
}

impl UserContext {
	pub fn into_map(self) -> Map {
		match serde_json::to_value(self) {
			Ok(serde_json::Value::Object(map)) => map,
			_ => Map::new(),
		}
	}
}

impl From<UserContext> for Map {
	fn from(user: UserContext) -> Self {
		user.into_map()
	}
}

/// Framework-level view of an incoming HTTP request, attached to a scope so
/// that a request parser can derive the `request` (and optionally `user`)
/// interface of an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRequest {
	pub method: Option<String>,
	/// Absolute URL, or a path when `host` is set.
	pub url: Option<String>,
	pub host: Option<String>,
	/// "http" or "https"
	pub protocol: Option<String>,
	pub query_string: Option<String>,
	#[serde(default)]
	pub headers: BTreeMap<String, String>,
	#[serde(default)]
	pub cookies: BTreeMap<String, String>,
	pub data: Option<serde_json::Value>,
	pub remote_addr: Option<String>,
	/// Authenticated user object attached by the application, if any.
	#[serde(default)]
	pub user: Map,
}

impl RawRequest {
	pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
		Self {
			method: Some(method.into()),
			url: Some(url.into()),
			..Default::default()
		}
	}

	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());
		self
	}

	pub fn with_user(mut self, user: impl Into<Map>) -> Self {
		self.user = user.into();
		self
	}

	/// Absolute URL of the request, built from `protocol`/`host` when `url`
	/// is only a path.
	pub fn absolute_url(&self) -> Option<String> {
		let url = self.url.as_deref()?;
		if url.contains("://") {
			return Some(url.to_string());
		}
		let host = self
			.host
			.as_deref()
			.or_else(|| self.headers.get("host").map(String::as_str))?;
		let protocol = self.protocol.as_deref().unwrap_or("http");
		Some(format!("{protocol}://{host}{url}"))
	}
}
