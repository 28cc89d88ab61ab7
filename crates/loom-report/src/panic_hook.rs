// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Panic hook that routes panics into the report pipeline.
//!
//! A panic outside any tokio task on a thread selected by [`FatalPanics`]
//! (the main thread by default) is treated as the process going down and is
//! handed to the [`ShutdownCoordinator`]. Any other panic is captured as a
//! regular exception when task panic capture is enabled. The previously
//! installed hook always runs afterwards.
//!
//! When the panicking thread is the one driving a current-thread runtime,
//! that runtime will not be polled again. The report then runs to completion
//! on a short-lived thread with its own runtime while the panicking thread
//! waits for it.

use std::future::Future;
use std::panic::PanicHookInfo;
use std::sync::Arc;
use std::time::Duration;

use loom_report_core::EventId;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{info, warn};

use crate::config::FatalPanics;
use crate::dispatch::CaptureCallback;
use crate::error::ReportError;
use crate::failure::Failure;
use crate::shutdown::ShutdownCoordinator;

/// A panic hook that can be shared and restored.
pub type PanicHandler = Arc<dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static>;

/// Captures a non-fatal failure, returning the event id. The callback runs
/// once delivery settles.
pub type TaskPanicCapture = Arc<dyn Fn(Failure, Option<CaptureCallback>) -> EventId + Send + Sync>;

/// Extra time the panicking thread waits, beyond the send timeout, for the
/// report to settle.
pub const FATAL_WAIT_GRACE: Duration = Duration::from_secs(2);

const REPORT_THREAD_NAME: &str = "loom-report-panic";

/// How the hook treats panics.
#[derive(Clone)]
pub struct PanicPolicy {
	pub fatal_panics: FatalPanics,
	pub task_panics: Option<TaskPanicCapture>,
	pub send_timeout: Duration,
}

/// Installs the report hook in front of the current one and returns the
/// hook it replaced.
pub fn install_panic_hook(coordinator: ShutdownCoordinator, policy: PanicPolicy) -> PanicHandler {
	let previous: PanicHandler = Arc::from(std::panic::take_hook());
	let chained = Arc::clone(&previous);
	let wait = policy.send_timeout + FATAL_WAIT_GRACE;

	std::panic::set_hook(Box::new(move |info| {
		let failure = Failure::from_panic(info.payload(), info.location());
		let in_task = tokio::task::try_id().is_some();

		if !in_task && policy.fatal_panics.is_fatal(&std::thread::current()) {
			report_fatal(&coordinator, failure, wait);
		} else if let Some(capture) = &policy.task_panics {
			report_non_fatal(capture, failure, in_task, wait);
		}

		chained(info);
	}));

	previous
}

/// Reinstates a hook returned by [`install_panic_hook`].
pub fn restore_panic_hook(previous: PanicHandler) {
	std::panic::set_hook(Box::new(move |info| previous(info)));
}

fn report_fatal(coordinator: &ShutdownCoordinator, failure: Failure, wait: Duration) {
	if can_block_for_report() {
		coordinator.handle_failure(failure);
		coordinator.wait_for_fatal(wait);
		return;
	}

	let coordinator = coordinator.clone();
	run_on_report_thread(move || async move {
		coordinator.handle_failure(failure);
		let waiter = coordinator.clone();
		let _ = tokio::task::spawn_blocking(move || waiter.wait_for_fatal(wait)).await;
	});
}

fn report_non_fatal(capture: &TaskPanicCapture, failure: Failure, in_task: bool, wait: Duration) {
	// A task panic leaves its runtime running; only a panic unwinding out of
	// `block_on` on a current-thread runtime strands the delivery.
	if in_task || can_block_for_report() {
		let event_id = capture(failure, None);
		info!(event_id = %event_id, in_task, "Captured non-fatal panic");
		return;
	}

	let capture = Arc::clone(capture);
	run_on_report_thread(move || async move {
		let (tx, rx) = tokio::sync::oneshot::channel();
		let settled: CaptureCallback = Box::new(move |_: Option<ReportError>, _: EventId| {
			let _ = tx.send(());
		});
		let event_id = capture(failure, Some(settled));
		if tokio::time::timeout(wait, rx).await.is_err() {
			warn!(event_id = %event_id, "Panic report did not settle in time");
		}
		info!(event_id = %event_id, "Captured non-fatal panic");
	});
}

/// Runs `report` on a new thread with its own current-thread runtime and
/// blocks until it finishes.
fn run_on_report_thread<F, Fut>(report: F)
where
	F: FnOnce() -> Fut + Send + 'static,
	Fut: Future<Output = ()>,
{
	let spawned = std::thread::Builder::new()
		.name(REPORT_THREAD_NAME.to_string())
		.spawn(move || {
			match tokio::runtime::Builder::new_current_thread()
				.enable_all()
				.build()
			{
				Ok(runtime) => runtime.block_on(report()),
				Err(e) => warn!(error = %e, "Failed to start runtime for panic report"),
			}
		});

	match spawned {
		Ok(handle) => {
			let _ = handle.join();
		}
		Err(e) => warn!(error = %e, "Failed to start panic report thread"),
	}
}

/// Blocking the panicking thread is only safe when some other thread drives
/// the runtime, which is not the case on a current-thread runtime.
fn can_block_for_report() -> bool {
	match Handle::try_current() {
		Ok(handle) => handle.runtime_flavor() != RuntimeFlavor::CurrentThread,
		Err(_) => true,
	}
}
