// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Breadcrumbs for outgoing HTTP requests.

use std::sync::Arc;

use loom_report_core::Breadcrumb;

use super::{BreadcrumbSink, Instrumentation, SinkSlot};

pub const HTTP_CATEGORY: &str = "http";

/// Records `{method, url, status_code}` for each observed response.
///
/// Clone it into the code that makes requests and register another clone
/// with the client builder; all clones share one attach point.
#[derive(Debug, Clone, Default)]
pub struct HttpBreadcrumbs {
	sink: SinkSlot,
}

impl HttpBreadcrumbs {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn observe_response(&self, method: &str, url: &str, status_code: u16) {
		let Some(sink) = self.sink.get() else {
			return;
		};
		if sink.is_own_endpoint(url) {
			return;
		}

		sink.record(
			Breadcrumb::new(HTTP_CATEGORY)
				.with_type(HTTP_CATEGORY)
				.with_data("method", method.to_uppercase())
				.with_data("url", url)
				.with_data("status_code", status_code),
		);
	}

	/// Convenience for `reqwest` callers.
	pub fn observe_reqwest(&self, method: &reqwest::Method, response: &reqwest::Response) {
		self.observe_response(
			method.as_str(),
			response.url().as_str(),
			response.status().as_u16(),
		);
	}
}

impl Instrumentation for HttpBreadcrumbs {
	fn category(&self) -> &'static str {
		HTTP_CATEGORY
	}

	fn instrument(&self, sink: Arc<dyn BreadcrumbSink>) {
		self.sink.attach(sink);
	}

	fn deinstrument(&self) {
		self.sink.detach();
	}
}
