// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fatal-failure coordination.
//!
//! When the process is going down, the coordinator makes one attempt to
//! report the first failure before the fatal action runs. Failures that
//! arrive while that report is in flight are treated as a cascade: the
//! second one starts a disambiguation window of `send_timeout + 1s`. If the
//! report has not completed by then, the second failure is assumed to be the
//! report failing and is passed to the fatal action as the send error.
//!
//! ```text
//! Idle --E1--> CapturingFirst --capture done--> FatalCalled
//!                    |                              ^
//!                    E2                             |
//!                    v                              |
//!             WaitingOnSecond --capture done / timer-+
//! ```
//!
//! Once the fatal action has run, any further failure goes straight to the
//! default action without a capture.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use loom_report_core::EventId;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use crate::dispatch::{spawn_here_or, CaptureCallback};
use crate::error::ReportError;
use crate::failure::Failure;

/// Extra time, on top of the send timeout, the coordinator waits before
/// attributing a second failure to the report itself.
pub const CASCADE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
	Idle,
	CapturingFirst,
	WaitingOnSecond,
	FatalCalled,
}

/// Why the fatal report may not have reached the collector.
#[derive(Debug)]
pub enum SendFailure {
	Delivery(ReportError),
	/// A second failure that arrived while the first was being reported and
	/// outlived the disambiguation window.
	Cascade(Failure),
}

impl fmt::Display for SendFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Delivery(e) => write!(f, "{e}"),
			Self::Cascade(failure) => write!(f, "{failure}"),
		}
	}
}

/// Argument to the fatal action.
#[derive(Debug)]
pub struct FatalReport {
	pub failure: Failure,
	pub send_error: Option<SendFailure>,
	pub event_id: Option<EventId>,
}

/// Runs once the fatal report is settled. The default logs and exits.
pub type FatalHandler = Arc<dyn Fn(FatalReport) + Send + Sync>;

/// Captures a fatal failure and signals completion through `callback`.
pub trait FatalReporter: Send + Sync {
	fn report_fatal(&self, failure: Failure, callback: CaptureCallback) -> EventId;
}

/// Logs the failure, prints its diagnostic to stderr, and exits with status 1.
pub fn default_fatal_action(report: FatalReport) {
	error!(
		error = %report.failure,
		event_id = ?report.event_id.as_ref().map(EventId::as_str),
		send_error = ?report.send_error.as_ref().map(ToString::to_string),
		"Fatal error, exiting"
	);
	eprintln!("{}", report.failure.render());
	std::process::exit(1);
}

struct Machine {
	state: ShutdownState,
	first: Option<Failure>,
	event_id: Option<EventId>,
}

struct Shared {
	reporter: Arc<dyn FatalReporter>,
	on_fatal: FatalHandler,
	default_action: FatalHandler,
	window: Duration,
	runtime: Handle,
	machine: Mutex<Machine>,
	settled: Condvar,
}

impl Shared {
	fn machine(&self) -> MutexGuard<'_, Machine> {
		self.machine.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn capture_completed(&self, error: Option<ReportError>, event_id: EventId) {
		let mut machine = self.machine();
		if !matches!(
			machine.state,
			ShutdownState::CapturingFirst | ShutdownState::WaitingOnSecond
		) {
			debug!(event_id = %event_id, "Fatal report completed after fatal action");
			return;
		}
		let Some(failure) = machine.first.take() else {
			return;
		};
		machine.state = ShutdownState::FatalCalled;
		drop(machine);

		(self.on_fatal)(FatalReport {
			failure,
			send_error: error.map(SendFailure::Delivery),
			event_id: Some(event_id),
		});
		self.settled.notify_all();
	}

	fn window_elapsed(&self, second: Failure) {
		let mut machine = self.machine();
		if machine.state != ShutdownState::WaitingOnSecond {
			return;
		}
		let Some(failure) = machine.first.take() else {
			return;
		};
		let event_id = machine.event_id.clone();
		machine.state = ShutdownState::FatalCalled;
		drop(machine);

		warn!(error = %second, "Fatal report did not complete, treating second failure as send error");
		(self.on_fatal)(FatalReport {
			failure,
			send_error: Some(SendFailure::Cascade(second)),
			event_id,
		});
		self.settled.notify_all();
	}
}

/// One per installed client.
#[derive(Clone)]
pub struct ShutdownCoordinator {
	shared: Arc<Shared>,
}

impl ShutdownCoordinator {
	pub fn new(
		reporter: Arc<dyn FatalReporter>,
		on_fatal: FatalHandler,
		send_timeout: Duration,
		runtime: Handle,
	) -> Self {
		Self::with_default_action(
			reporter,
			on_fatal,
			Arc::new(default_fatal_action),
			send_timeout,
			runtime,
		)
	}

	/// Like [`Self::new`] with a custom action for failures after the fatal
	/// action has run.
	pub fn with_default_action(
		reporter: Arc<dyn FatalReporter>,
		on_fatal: FatalHandler,
		default_action: FatalHandler,
		send_timeout: Duration,
		runtime: Handle,
	) -> Self {
		Self {
			shared: Arc::new(Shared {
				reporter,
				on_fatal,
				default_action,
				window: send_timeout + CASCADE_GRACE,
				runtime,
				machine: Mutex::new(Machine {
					state: ShutdownState::Idle,
					first: None,
					event_id: None,
				}),
				settled: Condvar::new(),
			}),
		}
	}

	pub fn state(&self) -> ShutdownState {
		self.shared.machine().state
	}

	/// Disambiguation window for a second failure.
	pub fn window(&self) -> Duration {
		self.shared.window
	}

	/// Feeds a fatal failure into the state machine.
	pub fn handle_failure(&self, failure: Failure) {
		let mut machine = self.shared.machine();
		match machine.state {
			ShutdownState::Idle => {
				machine.state = ShutdownState::CapturingFirst;
				machine.first = Some(failure.clone());
				drop(machine);

				let shared = Arc::clone(&self.shared);
				let event_id = self.shared.reporter.report_fatal(
					failure,
					Box::new(move |error, event_id| shared.capture_completed(error, event_id)),
				);
				self.shared.machine().event_id.get_or_insert(event_id);
			}
			ShutdownState::CapturingFirst => {
				machine.state = ShutdownState::WaitingOnSecond;
				drop(machine);

				debug!(error = %failure, "Second failure while reporting, waiting for report");
				let shared = Arc::clone(&self.shared);
				let window = self.shared.window;
				spawn_here_or(&self.shared.runtime, async move {
					tokio::time::sleep(window).await;
					shared.window_elapsed(failure);
				});
			}
			ShutdownState::WaitingOnSecond => {
				debug!(error = %failure, "Ignoring failure while waiting on fatal report");
			}
			ShutdownState::FatalCalled => {
				drop(machine);
				(self.shared.default_action)(FatalReport {
					failure,
					send_error: None,
					event_id: None,
				});
			}
		}
	}

	/// Blocks the calling thread until the fatal action has run or `timeout`
	/// elapses. Returns whether the fatal action ran.
	pub fn wait_for_fatal(&self, timeout: Duration) -> bool {
		let machine = self.shared.machine();
		let (machine, _) = self
			.shared
			.settled
			.wait_timeout_while(machine, timeout, |m| m.state != ShutdownState::FatalCalled)
			.unwrap_or_else(PoisonError::into_inner);
		machine.state == ShutdownState::FatalCalled
	}
}
