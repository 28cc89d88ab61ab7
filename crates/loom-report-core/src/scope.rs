// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scopes: bundles of contextual data attached to the process or to a single
//! unit of work.

use serde::{Deserialize, Serialize};

use crate::breadcrumb::{Breadcrumb, BreadcrumbBuffer};
use crate::context::RawRequest;
use crate::Map;

/// Contextual data merged into every event captured while the scope is
/// active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
	#[serde(default)]
	pub user: Map,
	#[serde(default)]
	pub tags: Map,
	#[serde(default)]
	pub extra: Map,
	/// Already-parsed HTTP request interface.
	#[serde(default)]
	pub request: Map,
	/// Raw request, parsed lazily when `request` ends up empty.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub req: Option<RawRequest>,
	#[serde(default)]
	pub breadcrumbs: BreadcrumbBuffer,
}

impl Scope {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_user(mut self, user: impl Into<Map>) -> Self {
		self.user = user.into();
		self
	}

	pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
		self.tags.insert(key.into(), value.into());
		self
	}

	pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
		self.extra.insert(key.into(), value.into());
		self
	}

	pub fn with_request(mut self, request: Map) -> Self {
		self.request = request;
		self
	}

	pub fn with_req(mut self, req: RawRequest) -> Self {
		self.req = Some(req);
		self
	}

	pub fn with_breadcrumb(mut self, breadcrumb: Breadcrumb, max: usize) -> Self {
		self.breadcrumbs.push(breadcrumb, max);
		self
	}

	/// Merges `other` into this scope field by field. Map keys from `other`
	/// override existing keys, a raw request in `other` replaces ours, and
	/// its breadcrumbs are appended to the trail.
	pub fn merge(&mut self, other: Scope, max_breadcrumbs: usize) {
		self.user.extend(other.user);
		self.tags.extend(other.tags);
		self.extra.extend(other.extra);
		self.request.extend(other.request);
		if other.req.is_some() {
			self.req = other.req;
		}
		self.breadcrumbs.extend_from(&other.breadcrumbs, max_breadcrumbs);
	}

	pub fn is_empty(&self) -> bool {
		self.user.is_empty()
			&& self.tags.is_empty()
			&& self.extra.is_empty()
			&& self.request.is_empty()
			&& self.req.is_none()
			&& self.breadcrumbs.is_empty()
	}
}

/// Key-wise merge of `layers`, later layers overriding earlier ones.
pub fn merge_maps<'a>(layers: impl IntoIterator<Item = &'a Map>) -> Map {
	let mut merged = Map::new();
	for layer in layers {
		for (key, value) in layer {
			merged.insert(key.clone(), value.clone());
		}
	}
	merged
}
