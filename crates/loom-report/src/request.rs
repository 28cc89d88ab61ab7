// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Derives the `request` (and optionally `user`) interface from a raw request.

use std::fmt;
use std::sync::Arc;

use loom_report_core::{Map, RawRequest};
use serde_json::Value;

/// User fields copied from a raw request by [`ParseUser::Default`].
const DEFAULT_USER_FIELDS: &[&str] = &["id", "username", "email"];

/// How user data is inferred from a raw request.
#[derive(Clone, Default)]
pub enum ParseUser {
	Disabled,
	/// Copy `id`, `username` and `email`, plus the remote address.
	#[default]
	Default,
	/// Copy the named fields.
	Fields(Vec<String>),
	Custom(Arc<dyn Fn(&RawRequest) -> Map + Send + Sync>),
}

impl fmt::Debug for ParseUser {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Disabled => write!(f, "Disabled"),
			Self::Default => write!(f, "Default"),
			Self::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
			Self::Custom(_) => write!(f, "Custom(..)"),
		}
	}
}

/// Output of a request parser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRequest {
	pub request: Map,
	/// Only set when user parsing was requested and produced something.
	pub user: Option<Map>,
}

/// Collaborator that turns a raw request into event interfaces.
///
/// `parse_user` is `None` when the event already carries explicit user data,
/// which must never be overwritten by inference.
pub trait RequestParser: Send + Sync {
	fn parse(&self, req: &RawRequest, parse_user: Option<&ParseUser>) -> ParsedRequest;
}

/// Straightforward field copy with no framework-specific heuristics.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRequestParser;

impl RequestParser for DefaultRequestParser {
	fn parse(&self, req: &RawRequest, parse_user: Option<&ParseUser>) -> ParsedRequest {
		let mut request = Map::new();
		if let Some(method) = &req.method {
			request.insert("method".into(), Value::from(method.to_uppercase()));
		}
		if let Some(url) = req.absolute_url() {
			let url = url.split('?').next().unwrap_or(&url).to_string();
			request.insert("url".into(), Value::from(url));
		}
		let query = req.query_string.clone().or_else(|| {
			req.url
				.as_deref()
				.and_then(|u| u.split_once('?'))
				.map(|(_, q)| q.to_string())
		});
		if let Some(query) = query {
			request.insert("query_string".into(), Value::from(query));
		}
		if !req.headers.is_empty() {
			request.insert("headers".into(), string_map(&req.headers));
		}
		if !req.cookies.is_empty() {
			request.insert("cookies".into(), string_map(&req.cookies));
		}
		if let Some(data) = &req.data {
			request.insert("data".into(), data.clone());
		}
		if let Some(addr) = &req.remote_addr {
			let mut env = Map::new();
			env.insert("REMOTE_ADDR".into(), Value::from(addr.clone()));
			request.insert("env".into(), Value::Object(env));
		}

		let user = parse_user
			.and_then(|mode| parse_user_fields(req, mode))
			.filter(|user| !user.is_empty());

		ParsedRequest { request, user }
	}
}

fn string_map(map: &std::collections::BTreeMap<String, String>) -> Value {
	Value::Object(
		map.iter()
			.map(|(k, v)| (k.clone(), Value::from(v.clone())))
			.collect(),
	)
}

fn parse_user_fields(req: &RawRequest, mode: &ParseUser) -> Option<Map> {
	let pick = |fields: &mut dyn Iterator<Item = &str>| -> Map {
		fields
			.filter_map(|field| req.user.get(field).map(|v| (field.to_string(), v.clone())))
			.collect()
	};

	match mode {
		ParseUser::Disabled => None,
		ParseUser::Default => {
			let mut user = pick(&mut DEFAULT_USER_FIELDS.iter().copied());
			if let Some(addr) = &req.remote_addr {
				user.insert("ip_address".into(), Value::from(addr.clone()));
			}
			Some(user)
		}
		ParseUser::Fields(fields) => Some(pick(&mut fields.iter().map(String::as_str))),
		ParseUser::Custom(f) => Some(f(req)),
	}
}
