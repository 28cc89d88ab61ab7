// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client configuration and environment fallbacks.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;

use loom_report_core::{Dsn, DEFAULT_MAX_BREADCRUMBS};
use tracing::warn;

/// Environment variable consulted when no DSN is configured.
pub const ENV_DSN: &str = "LOOM_REPORT_DSN";
/// Environment variable consulted when no client name is configured.
pub const ENV_NAME: &str = "LOOM_REPORT_NAME";
/// Environment variable consulted when no release is configured.
pub const ENV_RELEASE: &str = "LOOM_REPORT_RELEASE";
/// Environment variable consulted when no environment is configured.
pub const ENV_ENVIRONMENT: &str = "LOOM_REPORT_ENVIRONMENT";

/// Default time a delivery is expected to take before it is considered failed.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);
/// Default environment name.
pub const DEFAULT_ENVIRONMENT: &str = "production";

static DSN_ALERT: Once = Once::new();

/// Which instrumentation categories emit breadcrumbs automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoBreadcrumbs {
	/// All categories on or off.
	All(bool),
	/// Per-category switches; unknown categories are off.
	Categories(HashMap<String, bool>),
}

impl AutoBreadcrumbs {
	pub fn is_enabled(&self, category: &str) -> bool {
		match self {
			Self::All(enabled) => *enabled,
			Self::Categories(map) => map.get(category).copied().unwrap_or(false),
		}
	}
}

impl Default for AutoBreadcrumbs {
	fn default() -> Self {
		Self::All(false)
	}
}

impl From<bool> for AutoBreadcrumbs {
	fn from(enabled: bool) -> Self {
		Self::All(enabled)
	}
}

/// Which panics outside a tokio task are treated as the process going down.
///
/// A panic hook runs before unwinding, so it cannot see whether the panic
/// will be caught with `catch_unwind` or by a `join`ing parent thread. Only
/// the main thread is fatal by default; panics caught on the main thread are
/// still reported as fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FatalPanics {
	#[default]
	MainThread,
	AnyThread,
}

impl FatalPanics {
	pub fn is_fatal(self, thread: &std::thread::Thread) -> bool {
		match self {
			Self::MainThread => thread.name() == Some("main"),
			Self::AnyThread => true,
		}
	}
}

/// Resolved, immutable client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// `None` disables sending.
	pub dsn: Option<Dsn>,
	/// Reported as `server_name` unless a capture overrides it.
	pub name: String,
	/// Frame paths under this directory are reported relative to it.
	pub root: Option<PathBuf>,
	pub send_timeout: Duration,
	pub release: Option<String>,
	pub environment: String,
	pub auto_breadcrumbs: AutoBreadcrumbs,
	/// Already clamped to `[0, 100]`.
	pub max_breadcrumbs: usize,
	pub capture_unhandled_rejections: bool,
	pub fatal_panics: FatalPanics,
	pub logger: String,
	/// Already clamped to `[0, 1]`.
	pub sample_rate: f64,
	/// PEM bundle trusted by the HTTPS transport.
	pub ca: Option<Vec<u8>>,
	/// Dependency name -> version, reported with every event.
	pub modules: BTreeMap<String, String>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			dsn: None,
			name: default_name(),
			root: std::env::current_dir().ok(),
			send_timeout: DEFAULT_SEND_TIMEOUT,
			release: None,
			environment: DEFAULT_ENVIRONMENT.to_string(),
			auto_breadcrumbs: AutoBreadcrumbs::default(),
			max_breadcrumbs: DEFAULT_MAX_BREADCRUMBS,
			capture_unhandled_rejections: false,
			fatal_panics: FatalPanics::default(),
			logger: String::new(),
			sample_rate: 1.0,
			ca: None,
			modules: BTreeMap::new(),
		}
	}
}

impl ClientConfig {
	/// Sending happens only with a valid DSN.
	pub fn is_enabled(&self) -> bool {
		self.dsn.is_some()
	}
}

/// Reads a non-empty environment variable.
pub fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Host name of the machine, falling back to `localhost`.
pub fn default_name() -> String {
	env_var(ENV_NAME).unwrap_or_else(|| {
		hostname::get()
			.map(|h| h.to_string_lossy().into_owned())
			.unwrap_or_else(|_| "localhost".to_string())
	})
}

/// Parses the configured (or environment) DSN. A missing or invalid DSN
/// disables sending and is reported once per process.
pub fn resolve_dsn(raw: Option<String>) -> Option<Dsn> {
	let Some(raw) = raw.or_else(|| env_var(ENV_DSN)) else {
		DSN_ALERT.call_once(|| warn!("no DSN provided, error reporting disabled"));
		return None;
	};

	match Dsn::parse(&raw) {
		Ok(dsn) => Some(dsn),
		Err(e) => {
			DSN_ALERT.call_once(|| warn!(error = %e, "invalid DSN, error reporting disabled"));
			None
		}
	}
}
