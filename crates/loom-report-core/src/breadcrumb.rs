// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Breadcrumbs (diagnostic events leading up to a capture) and the bounded
//! trail that holds them.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::Map;

/// Default number of breadcrumbs kept per scope.
pub const DEFAULT_MAX_BREADCRUMBS: usize = 30;
/// Hard ceiling for the configured breadcrumb limit.
pub const MAX_BREADCRUMBS_CEILING: usize = 100;

/// Clamps a configured breadcrumb limit into `[0, 100]`.
pub fn clamp_max_breadcrumbs(max: usize) -> usize {
	max.min(MAX_BREADCRUMBS_CEILING)
}

/// Current time as fractional seconds since the Unix epoch.
pub fn now_seconds() -> f64 {
	Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A breadcrumb recorded before an event was captured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
	/// Seconds since the epoch. Stamped at record time when absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<f64>,
	/// "http", "console", "navigation", ...
	#[serde(default)]
	pub category: String,
	#[serde(rename = "type", default)]
	pub ty: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub level: Option<BreadcrumbLevel>,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub data: Map,
}

impl Breadcrumb {
	/// Creates a breadcrumb in the given category with type `default`.
	pub fn new(category: impl Into<String>) -> Self {
		Self {
			category: category.into(),
			ty: "default".to_string(),
			..Default::default()
		}
	}

	pub fn with_type(mut self, ty: impl Into<String>) -> Self {
		self.ty = ty.into();
		self
	}

	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());
		self
	}

	pub fn with_level(mut self, level: BreadcrumbLevel) -> Self {
		self.level = Some(level);
		self
	}

	pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
		self.data.insert(key.into(), value.into());
		self
	}

	/// Fills in the timestamp if the caller did not provide one.
	pub fn stamped(mut self) -> Self {
		if self.timestamp.is_none() {
			self.timestamp = Some(now_seconds());
		}
		self
	}
}

/// Severity level of a breadcrumb or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadcrumbLevel {
	Debug,
	#[default]
	Info,
	Warning,
	Error,
	Fatal,
}

impl fmt::Display for BreadcrumbLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Debug => write!(f, "debug"),
			Self::Info => write!(f, "info"),
			Self::Warning => write!(f, "warning"),
			Self::Error => write!(f, "error"),
			Self::Fatal => write!(f, "fatal"),
		}
	}
}

impl FromStr for BreadcrumbLevel {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"debug" => Ok(Self::Debug),
			"info" => Ok(Self::Info),
			"warning" | "warn" => Ok(Self::Warning),
			"error" => Ok(Self::Error),
			"fatal" => Ok(Self::Fatal),
			_ => Err(CoreError::InvalidBreadcrumbLevel(s.to_string())),
		}
	}
}

/// Insertion-ordered trail of breadcrumbs, bounded at push time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BreadcrumbBuffer {
	entries: VecDeque<Breadcrumb>,
}

impl BreadcrumbBuffer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a breadcrumb, evicting the oldest entries while the trail is
	/// longer than `max` (itself clamped to the hard ceiling).
	pub fn push(&mut self, breadcrumb: Breadcrumb, max: usize) {
		let max = clamp_max_breadcrumbs(max);
		self.entries.push_back(breadcrumb);
		while self.entries.len() > max {
			self.entries.pop_front();
		}
	}

	/// Appends every breadcrumb of `other`, oldest first.
	pub fn extend_from(&mut self, other: &BreadcrumbBuffer, max: usize) {
		for breadcrumb in other.iter() {
			self.push(breadcrumb.clone(), max);
		}
	}

	/// Copy of the current trail, oldest first.
	pub fn snapshot(&self) -> Vec<Breadcrumb> {
		self.entries.iter().cloned().collect()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Breadcrumb> {
		self.entries.iter()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}
}

impl FromIterator<Breadcrumb> for BreadcrumbBuffer {
	fn from_iter<I: IntoIterator<Item = Breadcrumb>>(iter: I) -> Self {
		Self {
			entries: iter.into_iter().collect(),
		}
	}
}
