// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error-shaped values handed to the capture pipeline.

use std::any::Any;
use std::fmt;
use std::panic::Location;
use std::path::Path;

use loom_report_core::{Exception, Stacktrace};

use crate::backtrace::capture_stacktrace;

/// An error-shaped value: a type, a value, and the stack it was raised on.
///
/// Anything passed to `capture_exception` is coerced into a `Failure`; plain
/// strings become a generic `Error` so a stack trace is still recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
	pub ty: String,
	pub value: String,
	pub module: Option<String>,
	/// `file:line:col` for panics.
	pub location: Option<String>,
	pub stacktrace: Stacktrace,
}

impl Failure {
	/// Creates a failure, capturing the current stack.
	pub fn new(ty: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			ty: ty.into(),
			value: value.into(),
			module: None,
			location: None,
			stacktrace: capture_stacktrace(),
		}
	}

	/// Builds a failure from an error, folding its source chain into the value.
	pub fn from_error<E: std::error::Error + ?Sized>(error: &E) -> Self {
		let full_name = std::any::type_name::<E>();
		let (module, ty) = match full_name.rsplit_once("::") {
			Some((module, ty)) => (Some(module.to_string()), ty.to_string()),
			None => (None, full_name.to_string()),
		};

		let mut value = error.to_string();
		let mut source = error.source();
		while let Some(cause) = source {
			value.push_str("\nCaused by: ");
			value.push_str(&cause.to_string());
			source = cause.source();
		}

		Self {
			module,
			..Self::new(ty, value)
		}
	}

	/// Builds a failure from a panic payload and location.
	pub fn from_panic(payload: &(dyn Any + Send), location: Option<&Location<'_>>) -> Self {
		let value = if let Some(s) = payload.downcast_ref::<&str>() {
			(*s).to_string()
		} else if let Some(s) = payload.downcast_ref::<String>() {
			s.clone()
		} else {
			"Box<dyn Any>".to_string()
		};

		Self {
			location: location.map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
			..Self::new("panic", value)
		}
	}

	/// `"<type>: <value>"`, the event message for exceptions.
	pub fn message(&self) -> String {
		format!("{}: {}", self.ty, self.value)
	}

	/// Converts into the exception interface, making frame paths under
	/// `root` relative to it.
	pub fn to_exception(&self, root: Option<&Path>) -> Exception {
		let mut stacktrace = self.stacktrace.clone();
		if let Some(root) = root {
			for frame in &mut stacktrace.frames {
				let relative = frame
					.abs_path
					.as_deref()
					.and_then(|p| Path::new(p).strip_prefix(root).ok())
					.map(|p| p.to_string_lossy().into_owned());
				if let Some(relative) = relative {
					frame.filename = Some(relative);
				}
			}
		}

		Exception {
			ty: self.ty.clone(),
			value: self.value.clone(),
			module: self.module.clone(),
			stacktrace: (!stacktrace.frames.is_empty()).then_some(stacktrace),
		}
	}

	/// Multi-line diagnostic used when the process is about to exit.
	pub fn render(&self) -> String {
		let mut out = self.message();
		if let Some(location) = &self.location {
			out.push_str(&format!("\n    at {location}"));
		}
		for frame in self.stacktrace.frames.iter().rev().filter(|f| f.in_app) {
			if let Some(function) = &frame.function {
				out.push_str(&format!("\n    in {function}"));
			}
		}
		out
	}
}

impl fmt::Display for Failure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.ty, self.value)
	}
}

impl From<&str> for Failure {
	fn from(value: &str) -> Self {
		Self::new("Error", value)
	}
}

impl From<String> for Failure {
	fn from(value: String) -> Self {
		Self::new("Error", value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_report_core::Frame;

	#[derive(Debug)]
	struct Outer(std::io::Error);

	impl fmt::Display for Outer {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			write!(f, "outer failed")
		}
	}

	impl std::error::Error for Outer {
		fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
			Some(&self.0)
		}
	}

	#[test]
	fn strings_are_coerced_into_generic_errors() {
		let failure = Failure::from("something awesome");
		assert_eq!(failure.ty, "Error");
		assert_eq!(failure.value, "something awesome");
		assert_eq!(failure.message(), "Error: something awesome");
	}

	#[test]
	fn from_error_uses_type_name_and_source_chain() {
		let error = Outer(std::io::Error::other("disk full"));
		let failure = Failure::from_error(&error);
		assert_eq!(failure.ty, "Outer");
		assert!(failure.module.is_some());
		assert_eq!(failure.value, "outer failed\nCaused by: disk full");
	}

	#[test]
	fn from_panic_reads_str_and_string_payloads() {
		let payload: Box<dyn Any + Send> = Box::new("boom");
		assert_eq!(Failure::from_panic(payload.as_ref(), None).value, "boom");

		let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
		let failure = Failure::from_panic(payload.as_ref(), None);
		assert_eq!(failure.ty, "panic");
		assert_eq!(failure.value, "owned boom");
	}

	#[test]
	fn to_exception_relativizes_paths_under_root() {
		let failure = Failure {
			ty: "Error".to_string(),
			value: "x".to_string(),
			module: None,
			location: None,
			stacktrace: Stacktrace {
				frames: vec![Frame {
					function: Some("my_app::run".to_string()),
					abs_path: Some("/srv/app/src/main.rs".to_string()),
					filename: Some("main.rs".to_string()),
					in_app: true,
					..Default::default()
				}],
			},
		};

		let exception = failure.to_exception(Some(Path::new("/srv/app")));
		let frame = &exception.stacktrace.unwrap().frames[0];
		assert_eq!(frame.filename.as_deref(), Some("src/main.rs"));
	}
}
