// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Turns a capture into an outbound event and decides whether to send it.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use loom_report_core::{
	format_timestamp, merge_maps, BreadcrumbLevel, BreadcrumbValues, Event, EventId, Map, RawRequest,
	SdkInfo,
};
use tracing::debug;

use crate::config::ClientConfig;
use crate::context::ContextStore;
use crate::dispatch::{CaptureCallback, Dispatcher};
use crate::failure::Failure;
use crate::request::{ParseUser, RequestParser};

/// SDK version for identification.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
/// SDK name for identification.
pub const SDK_NAME: &str = "loom-report-rust";

const PLATFORM: &str = "rust";

/// Replaces or mutates an event right before the send decision.
pub type DataCallback = Arc<dyn Fn(Event) -> Event + Send + Sync>;
/// Vetoes sending an event by returning `false`.
pub type ShouldSendCallback = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Per-capture overrides. Map fields are merged over the active scope key by
/// key; everything else replaces the configured value.
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
	pub level: Option<BreadcrumbLevel>,
	pub logger: Option<String>,
	pub server_name: Option<String>,
	pub environment: Option<String>,
	pub tags: Map,
	pub extra: Map,
	pub user: Map,
	pub request: Map,
	pub req: Option<RawRequest>,
	pub fingerprint: Vec<String>,
}

impl CaptureOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn level(mut self, level: BreadcrumbLevel) -> Self {
		self.level = Some(level);
		self
	}

	pub fn logger(mut self, logger: impl Into<String>) -> Self {
		self.logger = Some(logger.into());
		self
	}

	pub fn server_name(mut self, name: impl Into<String>) -> Self {
		self.server_name = Some(name.into());
		self
	}

	pub fn environment(mut self, environment: impl Into<String>) -> Self {
		self.environment = Some(environment.into());
		self
	}

	pub fn tag(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
		self.tags.insert(key.into(), value.into());
		self
	}

	pub fn extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
		self.extra.insert(key.into(), value.into());
		self
	}

	pub fn user(mut self, user: impl Into<Map>) -> Self {
		self.user = user.into();
		self
	}

	pub fn request(mut self, request: Map) -> Self {
		self.request = request;
		self
	}

	pub fn req(mut self, req: RawRequest) -> Self {
		self.req = Some(req);
		self
	}

	pub fn fingerprint(mut self, fingerprint: Vec<String>) -> Self {
		self.fingerprint = fingerprint;
		self
	}
}

/// What was captured.
#[derive(Debug, Clone)]
pub enum Payload {
	Message(String),
	Exception(Failure),
}

pub struct EventProcessor {
	config: Arc<ClientConfig>,
	context: Arc<ContextStore>,
	dispatcher: Arc<Dispatcher>,
	parser: Arc<dyn RequestParser>,
	parse_user: ParseUser,
	data_callback: RwLock<Option<DataCallback>>,
	should_send_callback: RwLock<Option<ShouldSendCallback>>,
}

impl EventProcessor {
	pub fn new(
		config: Arc<ClientConfig>,
		context: Arc<ContextStore>,
		dispatcher: Arc<Dispatcher>,
		parser: Arc<dyn RequestParser>,
		parse_user: ParseUser,
	) -> Self {
		Self {
			config,
			context,
			dispatcher,
			parser,
			parse_user,
			data_callback: RwLock::new(None),
			should_send_callback: RwLock::new(None),
		}
	}

	/// Builds the event, applies the data callback, and either hands it to
	/// the dispatcher or completes the capture without sending.
	pub fn process(
		&self,
		event_id: EventId,
		payload: Payload,
		options: CaptureOptions,
		callback: Option<CaptureCallback>,
	) {
		let event = self.build_event(event_id.clone(), payload, options);
		let event = match self.data_callback() {
			Some(data_callback) => data_callback(event),
			None => event,
		};

		if self.should_send(&event) {
			self.dispatcher.send(event, callback);
			return;
		}

		debug!(event_id = %event_id, "Report event not sent");
		if let Some(callback) = callback {
			self.dispatcher.spawn(async move {
				callback(None, event_id);
			});
		}
	}

	/// Merges context and stamps the event. Does not consult callbacks.
	pub fn build_event(&self, event_id: EventId, payload: Payload, options: CaptureOptions) -> Event {
		let resolved = self.context.resolve();
		let global = &resolved.global;
		let task = resolved.task.as_ref();

		let mut user = merge_maps(
			[Some(&global.user), task.map(|t| &t.user), Some(&options.user)]
				.into_iter()
				.flatten(),
		);
		let tags = merge_maps(
			[Some(&global.tags), task.map(|t| &t.tags), Some(&options.tags)]
				.into_iter()
				.flatten(),
		);
		let extra = merge_maps(
			[Some(&global.extra), task.map(|t| &t.extra), Some(&options.extra)]
				.into_iter()
				.flatten(),
		);
		let mut request = merge_maps(
			[Some(&global.request), task.map(|t| &t.request), Some(&options.request)]
				.into_iter()
				.flatten(),
		);

		let breadcrumbs = match task {
			Some(task) if !task.breadcrumbs.is_empty() => task.breadcrumbs.snapshot(),
			_ => global.breadcrumbs.snapshot(),
		};

		let req = options
			.req
			.as_ref()
			.or_else(|| task.and_then(|t| t.req.as_ref()))
			.or(global.req.as_ref());
		if let Some(req) = req.filter(|_| request.is_empty()) {
			let parse_user = user.is_empty().then_some(&self.parse_user);
			let parsed = self.parser.parse(req, parse_user);
			request = parsed.request;
			if let Some(parsed_user) = parsed.user {
				user = parsed_user;
			}
		}

		let mut modules = self.config.modules.clone();
		modules.insert(SDK_NAME.to_string(), SDK_VERSION.to_string());

		let mut event = Event {
			timestamp: format_timestamp(Utc::now()),
			platform: PLATFORM.to_string(),
			level: options.level.unwrap_or(BreadcrumbLevel::Error),
			server_name: options.server_name.unwrap_or_else(|| self.config.name.clone()),
			logger: options.logger.unwrap_or_else(|| self.config.logger.clone()),
			environment: options
				.environment
				.unwrap_or_else(|| self.config.environment.clone()),
			release: self.config.release.clone(),
			project: self
				.config
				.dsn
				.as_ref()
				.map(|dsn| dsn.project_id.clone())
				.unwrap_or_default(),
			fingerprint: options.fingerprint,
			user,
			tags,
			extra,
			request,
			breadcrumbs: BreadcrumbValues {
				values: breadcrumbs,
			},
			modules,
			sdk: SdkInfo {
				name: SDK_NAME.to_string(),
				version: SDK_VERSION.to_string(),
			},
			..Event::new(event_id)
		};

		match payload {
			Payload::Message(text) => event.message = Some(text),
			Payload::Exception(failure) => {
				let exception = failure.to_exception(self.config.root.as_deref());
				event.message = Some(failure.message());
				event.culprit = exception.culprit();
				event.exception.push(exception);
			}
		}

		event
	}

	/// `enabled && should_send_callback && random < sample_rate`.
	pub fn should_send(&self, event: &Event) -> bool {
		if !self.config.is_enabled() {
			return false;
		}
		if let Some(should_send) = self.should_send_callback() {
			if !should_send(event) {
				return false;
			}
		}
		fastrand::f64() < self.config.sample_rate
	}

	/// Installs a data callback. `f` receives the previously installed
	/// callback, if any, so callbacks can be chained.
	pub fn set_data_callback<F>(&self, f: F)
	where
		F: Fn(Event, Option<&DataCallback>) -> Event + Send + Sync + 'static,
	{
		let mut slot = self
			.data_callback
			.write()
			.unwrap_or_else(PoisonError::into_inner);
		let previous = slot.take();
		let chained: DataCallback = Arc::new(move |event: Event| f(event, previous.as_ref()));
		*slot = Some(chained);
	}

	/// Installs a should-send callback, chained like [`Self::set_data_callback`].
	pub fn set_should_send_callback<F>(&self, f: F)
	where
		F: Fn(&Event, Option<&ShouldSendCallback>) -> bool + Send + Sync + 'static,
	{
		let mut slot = self
			.should_send_callback
			.write()
			.unwrap_or_else(PoisonError::into_inner);
		let previous = slot.take();
		let chained: ShouldSendCallback =
			Arc::new(move |event: &Event| f(event, previous.as_ref()));
		*slot = Some(chained);
	}

	fn data_callback(&self) -> Option<DataCallback> {
		self.data_callback
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	fn should_send_callback(&self) -> Option<ShouldSendCallback> {
		self.should_send_callback
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}
}
