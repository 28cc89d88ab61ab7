// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Integration tests for the capture pipeline: context merge, sampling,
//! completion callbacks and delivery.

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loom_report::{
	Breadcrumb, CaptureOptions, DeliveryNotice, RawRequest, ReportClient, ReportError, Scope,
};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use support::{RecordingTransport, TEST_DSN};

fn client(transport: Arc<RecordingTransport>, sample_rate: f64) -> ReportClient {
	ReportClient::builder()
		.dsn(TEST_DSN)
		.name("pipeline-test")
		.sample_rate(sample_rate)
		.transport(transport)
		.build()
		.unwrap()
}

async fn capture_many(client: &ReportClient, count: usize) -> Vec<Option<ReportError>> {
	let (tx, mut rx) = mpsc::unbounded_channel();
	for i in 0..count {
		let tx = tx.clone();
		client.capture_message_with(format!("message {i}"), CaptureOptions::new(), move |error, _| {
			let _ = tx.send(error);
		});
	}
	drop(tx);

	let mut outcomes = Vec::with_capacity(count);
	while let Some(outcome) = rx.recv().await {
		outcomes.push(outcome);
	}
	outcomes
}

/// Test that a zero sample rate never sends.
/// **Why Important**: The comparison is strict, so 0 must mean "never" even
/// over many draws, while every capture still completes.
#[tokio::test]
async fn test_sample_rate_zero_sends_nothing() {
	let transport = RecordingTransport::new();
	let client = client(Arc::clone(&transport), 0.0);

	let outcomes = capture_many(&client, 10_000).await;

	assert_eq!(outcomes.len(), 10_000);
	assert!(outcomes.iter().all(Option::is_none));
	assert_eq!(transport.count(), 0);
}

/// Test that a sample rate of one sends every event.
#[tokio::test]
async fn test_sample_rate_one_sends_everything() {
	let transport = RecordingTransport::new();
	let client = client(Arc::clone(&transport), 1.0);

	let outcomes = capture_many(&client, 500).await;

	assert_eq!(outcomes.len(), 500);
	assert_eq!(transport.count(), 500);
}

/// Test that the completion callback of a suppressed event never runs on
/// the caller's stack.
/// **Why Important**: Callers may hold locks or be mid-update when they
/// capture; a synchronous callback would re-enter them.
#[tokio::test]
async fn test_suppressed_callback_runs_asynchronously() {
	let transport = RecordingTransport::new();
	let client = client(Arc::clone(&transport), 1.0);
	client.set_should_send_callback(|_event, _previous| false);

	let called = Arc::new(AtomicBool::new(false));
	let (tx, rx) = oneshot::channel();
	let flag = Arc::clone(&called);
	let event_id = client.capture_message_with("dropped", CaptureOptions::new(), move |error, id| {
		flag.store(true, Ordering::SeqCst);
		let _ = tx.send((error.is_none(), id));
	});

	assert!(!called.load(Ordering::SeqCst));
	let (no_error, callback_id) = rx.await.unwrap();
	assert!(no_error);
	assert_eq!(callback_id, event_id);
	assert_eq!(transport.count(), 0);
}

/// Test that captures in interleaved scoped tasks only see their own scope.
/// **Why Important**: Per-request context must never leak between
/// concurrently handled requests.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_scoped_isolation_across_captures() {
	let transport = RecordingTransport::new();
	let client = client(Arc::clone(&transport), 1.0);
	client.merge_context(Scope::new().with_tag("service", "checkout"));

	let run = |user: &'static str, delay: u64| {
		let client = client.clone();
		tokio::spawn(async move {
			let scoped = client.clone();
			client
				.run_scoped(Scope::new().with_tag("user", user), async move {
					tokio::time::sleep(Duration::from_millis(delay)).await;
					scoped.merge_context(Scope::new().with_extra("step", user));
					tokio::time::sleep(Duration::from_millis(delay)).await;
					let (tx, rx) = oneshot::channel();
					scoped.capture_message_with(user, CaptureOptions::new(), move |error, _| {
						let _ = tx.send(error.is_none());
					});
					rx.await.unwrap()
				})
				.await
		})
	};

	let a = run("alice", 7);
	let b = run("bob", 3);
	assert!(a.await.unwrap());
	assert!(b.await.unwrap());

	let events = transport.events();
	assert_eq!(events.len(), 2);
	for event in events {
		let user = event["message"].as_str().unwrap();
		assert_eq!(event["tags"]["user"], json!(user));
		assert_eq!(event["tags"]["service"], json!("checkout"));
		assert_eq!(event["extra"]["step"], json!(user));
	}
	assert!(client.get_context().extra.is_empty());
}

/// Test that work spawned with `spawn_scoped` shares the spawning scope.
#[tokio::test]
async fn test_spawn_scoped_inherits_scope() {
	let transport = RecordingTransport::new();
	let client = client(Arc::clone(&transport), 1.0);

	let outer = client.clone();
	let tags = client
		.run_scoped(Scope::new().with_tag("request_id", "r-1"), async move {
			let inner = outer.clone();
			outer
				.spawn_scoped(async move { inner.get_context().tags })
				.await
				.unwrap()
		})
		.await;

	assert_eq!(tags["request_id"], json!("r-1"));
}

/// Test that a plain `tokio::spawn` inside a scoped task does not carry the
/// scope, while `spawn_scoped` does.
#[tokio::test]
async fn test_plain_spawn_does_not_inherit_scope() {
	let transport = RecordingTransport::new();
	let client = client(Arc::clone(&transport), 1.0);

	let outer = client.clone();
	let (plain, scoped) = client
		.run_scoped(Scope::new().with_tag("request_id", "r-2"), async move {
			let plain_client = outer.clone();
			let plain = tokio::spawn(async move { plain_client.get_context().tags })
				.await
				.unwrap();
			let scoped_client = outer.clone();
			let scoped = outer
				.spawn_scoped(async move { scoped_client.get_context().tags })
				.await
				.unwrap();
			(plain, scoped)
		})
		.await;

	assert!(plain.get("request_id").is_none());
	assert_eq!(scoped["request_id"], json!("r-2"));
}

/// Test that a delivered exception carries the full event shape.
#[tokio::test]
async fn test_exception_event_shape() {
	let transport = RecordingTransport::new();
	let client = client(Arc::clone(&transport), 1.0);
	let mut notices = client.subscribe();

	let event_id = client.capture_exception(
		"something awesome",
		CaptureOptions::new()
			.tag("handler", "orders")
			.fingerprint(vec!["orders".to_string()]),
	);

	match notices.recv().await.unwrap() {
		DeliveryNotice::Logged { event_id: delivered } => assert_eq!(delivered, event_id),
		other => panic!("unexpected notice: {other:?}"),
	}

	let event = &transport.events()[0];
	assert_eq!(event["event_id"], json!(event_id.as_str()));
	assert_eq!(event["message"], json!("Error: something awesome"));
	assert_eq!(event["exception"][0]["type"], json!("Error"));
	assert_eq!(event["exception"][0]["value"], json!("something awesome"));
	assert_eq!(event["level"], json!("error"));
	assert_eq!(event["project"], json!("42"));
	assert_eq!(event["server_name"], json!("pipeline-test"));
	assert_eq!(event["tags"]["handler"], json!("orders"));
	assert_eq!(event["fingerprint"], json!(["orders"]));
	assert_eq!(event["sdk"]["name"], json!("loom-report-rust"));
}

/// Test that request parsing fills the request but keeps explicit user data.
/// **Why Important**: Inferred user data must never overwrite what the
/// application set explicitly.
#[tokio::test]
async fn test_request_parsing_keeps_explicit_user() {
	let transport = RecordingTransport::new();
	let client = client(Arc::clone(&transport), 1.0);

	let req = RawRequest::new("GET", "https://shop.example/cart?step=2").with_user(
		json!({"id": "inferred"}).as_object().cloned().unwrap(),
	);
	let explicit = json!({"id": "explicit"}).as_object().cloned().unwrap();

	let (tx, rx) = oneshot::channel();
	client
		.run_scoped(Scope::new().with_req(req).with_user(explicit), async {
			client.capture_message_with("cart", CaptureOptions::new(), move |_, _| {
				let _ = tx.send(());
			});
		})
		.await;
	rx.await.unwrap();

	let event = &transport.events()[0];
	assert_eq!(event["request"]["url"], json!("https://shop.example/cart"));
	assert_eq!(event["request"]["query_string"], json!("step=2"));
	assert_eq!(event["user"]["id"], json!("explicit"));
}

/// Test that the data callback can rewrite events before they are sent.
#[tokio::test]
async fn test_data_callback_rewrites_event() {
	let transport = RecordingTransport::new();
	let client = client(Arc::clone(&transport), 1.0);
	client.set_data_callback(|mut event, _previous| {
		event.extra.insert("scrubbed".into(), json!(true));
		event
	});

	let (tx, rx) = oneshot::channel();
	client.capture_message_with("hello", CaptureOptions::new(), move |_, _| {
		let _ = tx.send(());
	});
	rx.await.unwrap();

	assert_eq!(transport.events()[0]["extra"]["scrubbed"], json!(true));
}

/// Test that breadcrumbs are ignored until the client is installed.
#[tokio::test]
async fn test_breadcrumbs_require_install() {
	let transport = RecordingTransport::new();
	let client = client(transport, 1.0);

	client.capture_breadcrumb(Breadcrumb::new("navigation").with_message("/home"));

	assert!(!client.is_installed());
	assert!(client.get_context().breadcrumbs.is_empty());
}
