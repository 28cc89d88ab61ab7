// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Automatic breadcrumb sources.
//!
//! An [`Instrumentation`] observes some part of the application (outgoing
//! HTTP, log output) and records breadcrumbs through a [`BreadcrumbSink`]
//! once the client attaches one. Until then, and after detaching, it records
//! nothing.

mod console;
mod http;

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use loom_report_core::Breadcrumb;
use tracing::debug;

use crate::config::AutoBreadcrumbs;

pub use console::{ConsoleBreadcrumbs, CONSOLE_CATEGORY};
pub use http::{HttpBreadcrumbs, HTTP_CATEGORY};

/// Where instrumentations deliver breadcrumbs.
pub trait BreadcrumbSink: Send + Sync {
	fn record(&self, breadcrumb: Breadcrumb);

	/// Whether `url` points at the collector. Requests made by the client
	/// itself are never recorded.
	fn is_own_endpoint(&self, url: &str) -> bool;
}

/// A source of automatic breadcrumbs.
pub trait Instrumentation: Send + Sync {
	/// Category used to enable or disable this source.
	fn category(&self) -> &'static str;

	fn instrument(&self, sink: Arc<dyn BreadcrumbSink>);

	fn deinstrument(&self);
}

/// Attach point shared between an instrumentation and its clones.
#[derive(Clone, Default)]
pub struct SinkSlot(Arc<RwLock<Option<Arc<dyn BreadcrumbSink>>>>);

impl SinkSlot {
	pub fn attach(&self, sink: Arc<dyn BreadcrumbSink>) {
		*self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
	}

	pub fn detach(&self) {
		*self.0.write().unwrap_or_else(PoisonError::into_inner) = None;
	}

	pub fn get(&self) -> Option<Arc<dyn BreadcrumbSink>> {
		self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
	}
}

impl std::fmt::Debug for SinkSlot {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("SinkSlot")
			.field(&self.get().is_some())
			.finish()
	}
}

/// Registered instrumentations and the ones currently attached.
#[derive(Default)]
pub struct Instrumentor {
	registered: Vec<Arc<dyn Instrumentation>>,
	active: Mutex<Vec<Arc<dyn Instrumentation>>>,
}

impl Instrumentor {
	pub fn new(registered: Vec<Arc<dyn Instrumentation>>) -> Self {
		Self {
			registered,
			active: Mutex::new(Vec::new()),
		}
	}

	/// Attaches `sink` to every registered instrumentation whose category is
	/// enabled.
	pub fn instrument(&self, sink: Arc<dyn BreadcrumbSink>, auto: &AutoBreadcrumbs) {
		let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
		for instrumentation in &self.registered {
			if !auto.is_enabled(instrumentation.category()) {
				continue;
			}
			instrumentation.instrument(Arc::clone(&sink));
			debug!(category = instrumentation.category(), "Instrumented breadcrumb source");
			active.push(Arc::clone(instrumentation));
		}
	}

	pub fn deinstrument(&self) {
		let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
		for instrumentation in active.drain(..) {
			instrumentation.deinstrument();
		}
	}

	pub fn active_categories(&self) -> Vec<&'static str> {
		self.active
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.map(|i| i.category())
			.collect()
	}
}


#[cfg(test)]
mod tests {
	use super::testing::RecordingSink;
	use super::*;
	use std::collections::HashMap;

	#[test]
	fn only_enabled_categories_are_instrumented() {
		let http = HttpBreadcrumbs::new();
		let console = ConsoleBreadcrumbs::new();
		let instrumentor = Instrumentor::new(vec![
			Arc::new(http.clone()),
			Arc::new(console.clone()),
		]);
		let sink = Arc::new(RecordingSink::default());
		let auto = AutoBreadcrumbs::Categories(HashMap::from([(HTTP_CATEGORY.to_string(), true)]));

		instrumentor.instrument(sink.clone(), &auto);
		assert_eq!(instrumentor.active_categories(), vec![HTTP_CATEGORY]);

		http.observe_response("GET", "https://api.example/users", 200);
		assert_eq!(sink.breadcrumbs.lock().unwrap().len(), 1);

		instrumentor.deinstrument();
		http.observe_response("GET", "https://api.example/users", 200);
		assert_eq!(sink.breadcrumbs.lock().unwrap().len(), 1);
		assert!(instrumentor.active_categories().is_empty());
	}
}
