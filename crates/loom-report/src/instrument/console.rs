// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tracing layer that turns log events into breadcrumbs.

use std::fmt;
use std::sync::Arc;

use loom_report_core::{Breadcrumb, BreadcrumbLevel, Map};
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use super::{BreadcrumbSink, Instrumentation, SinkSlot};

pub const CONSOLE_CATEGORY: &str = "console";

/// Crates whose log events are never recorded.
const OWN_CRATES: &[&str] = &["loom_report", "loom_report_core"];

/// A tracing Layer that records every log event as a `console` breadcrumb
/// while attached to a client.
///
/// ```ignore
/// let console = ConsoleBreadcrumbs::new();
/// tracing_subscriber::registry().with(console.clone()).init();
/// let client = ReportClient::builder().instrumentation(console).build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConsoleBreadcrumbs {
	sink: SinkSlot,
}

impl ConsoleBreadcrumbs {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Instrumentation for ConsoleBreadcrumbs {
	fn category(&self) -> &'static str {
		CONSOLE_CATEGORY
	}

	fn instrument(&self, sink: Arc<dyn BreadcrumbSink>) {
		self.sink.attach(sink);
	}

	fn deinstrument(&self) {
		self.sink.detach();
	}
}

impl<S: Subscriber> Layer<S> for ConsoleBreadcrumbs {
	fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
		let metadata = event.metadata();
		if is_own_target(metadata.target()) {
			return;
		}
		let Some(sink) = self.sink.get() else {
			return;
		};

		let mut visitor = BreadcrumbVisitor::default();
		event.record(&mut visitor);

		let mut breadcrumb = Breadcrumb::new(CONSOLE_CATEGORY)
			.with_level(level_of(metadata.level()))
			.with_data("logger", metadata.target());
		if let Some(message) = visitor.message {
			breadcrumb = breadcrumb.with_message(message);
		}
		breadcrumb.data.extend(visitor.fields);

		sink.record(breadcrumb);
	}
}

/// The target is one of the SDK crates or a module inside one.
fn is_own_target(target: &str) -> bool {
	let krate = target.split("::").next().unwrap_or(target);
	OWN_CRATES.contains(&krate)
}

fn level_of(level: &Level) -> BreadcrumbLevel {
	match *level {
		Level::ERROR => BreadcrumbLevel::Error,
		Level::WARN => BreadcrumbLevel::Warning,
		Level::INFO => BreadcrumbLevel::Info,
		_ => BreadcrumbLevel::Debug,
	}
}

#[derive(Default)]
struct BreadcrumbVisitor {
	message: Option<String>,
	fields: Map,
}

impl BreadcrumbVisitor {
	fn put(&mut self, field: &Field, value: Value) {
		if field.name() == "message" {
			self.message = Some(match value {
				Value::String(s) => s,
				other => other.to_string(),
			});
		} else {
			self.fields.insert(field.name().to_string(), value);
		}
	}
}

impl Visit for BreadcrumbVisitor {
	fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
		self.put(field, Value::from(format!("{value:?}")));
	}

	fn record_str(&mut self, field: &Field, value: &str) {
		self.put(field, Value::from(value));
	}

	fn record_i64(&mut self, field: &Field, value: i64) {
		self.put(field, Value::from(value));
	}

	fn record_u64(&mut self, field: &Field, value: u64) {
		self.put(field, Value::from(value));
	}

	fn record_bool(&mut self, field: &Field, value: bool) {
		self.put(field, Value::from(value));
	}

	fn record_f64(&mut self, field: &Field, value: f64) {
		self.put(field, Value::from(value));
	}

	fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
		self.put(field, Value::from(value.to_string()));
	}
}
