// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Backtrace capture and parsing into stack frames.

use std::backtrace::{Backtrace, BacktraceStatus};

use loom_report_core::{Frame, Stacktrace};
use rustc_demangle::demangle;

/// Frames from these prefixes are never attributed to the application.
const SYSTEM_PREFIXES: &[&str] = &[
	"std::",
	"core::",
	"alloc::",
	"<std::",
	"<core::",
	"<alloc::",
	"tokio::",
	"<tokio::",
	"futures::",
	"<futures::",
	"async_trait::",
	"tracing::",
	"<tracing::",
	"backtrace::",
	"panic_unwind::",
	"loom_report::",
	"<loom_report::",
	"loom_report_core::",
	"<loom_report_core::",
	"rust_begin_unwind",
	"rust_panic",
	"__rust_",
	"_rust_",
];

const SYSTEM_CONTAINS: &[&str] = &[
	"::panic::",
	"::panicking::",
	"::rt::",
	"::runtime::",
	"::sys_common::",
];

/// Captures a backtrace at the call site and parses it.
pub fn capture_stacktrace() -> Stacktrace {
	parse_backtrace(&Backtrace::force_capture())
}

/// Symbols std could not resolve.
const UNKNOWN_SYMBOL: &str = "<unknown>";

/// Parses a captured backtrace, innermost frame last (the order the
/// collector expects).
pub fn parse_backtrace(backtrace: &Backtrace) -> Stacktrace {
	if backtrace.status() != BacktraceStatus::Captured {
		return Stacktrace::default();
	}
	// The short format prints symbols without addresses or hashes.
	let mut frames = parse_backtrace_string(&backtrace.to_string());
	frames.reverse();
	Stacktrace { frames }
}

/// Parses the `Display` output of a backtrace. Each `N: symbol` line starts a
/// frame and a following `at path:line:col` line fills in its location.
fn parse_backtrace_string(text: &str) -> Vec<Frame> {
	let mut frames: Vec<Frame> = Vec::new();

	for line in text.lines() {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}

		if let Some(location) = line.strip_prefix("at ") {
			if let Some(frame) = frames.last_mut() {
				apply_location(frame, location);
			}
			continue;
		}

		if let Some(frame) = parse_symbol_line(line) {
			frames.push(frame);
		}
	}

	frames
}

fn parse_symbol_line(line: &str) -> Option<Frame> {
	let symbol = match line.split_once(':') {
		Some((prefix, rest)) if prefix.trim().parse::<u32>().is_ok() => rest.trim(),
		_ => return None,
	};
	let symbol = strip_address(symbol);
	if symbol.is_empty() {
		return None;
	}

	let demangled = demangle(symbol).to_string();
	let function = strip_hash(&demangled).to_string();
	let module = function.rfind("::").map(|idx| function[..idx].to_string());
	let in_app = is_in_app_frame(&function);

	Some(Frame {
		function: Some(function),
		module,
		in_app,
		..Default::default()
	})
}

/// Drops the `0x7f3a... - ` prefix of the full backtrace format.
fn strip_address(symbol: &str) -> &str {
	match symbol.split_once(" - ") {
		Some((address, rest)) if address.starts_with("0x") => rest.trim(),
		_ => symbol,
	}
}

/// Drops a trailing `::h0123456789abcdef` symbol hash.
fn strip_hash(function: &str) -> &str {
	match function.rsplit_once("::") {
		Some((path, hash))
			if hash.len() == 17
				&& hash.starts_with('h')
				&& hash[1..].chars().all(|c| c.is_ascii_hexdigit()) =>
		{
			path
		}
		_ => function,
	}
}

/// `path/to/file.rs:12:5`. Paths may themselves contain `:` on Windows, so
/// numbers are taken from the right.
fn apply_location(frame: &mut Frame, location: &str) {
	let mut parts = location.rsplitn(3, ':');
	let col = parts.next().and_then(|s| s.parse::<u32>().ok());
	let line = parts.next().and_then(|s| s.parse::<u32>().ok());
	let path = match (line, parts.next()) {
		(Some(_), Some(path)) => path,
		_ => location,
	};

	frame.abs_path = Some(path.to_string());
	frame.filename = path.rsplit(|c: char| c == '/' || c == '\\').next().map(str::to_string);
	frame.lineno = line;
	frame.colno = line.and(col);
	if path.contains("/.cargo/registry/") || path.starts_with("/rustc/") {
		frame.in_app = false;
	}
}

/// Heuristic: application code is anything that is not the standard library,
/// the runtime, or this SDK.
fn is_in_app_frame(function: &str) -> bool {
	function != UNKNOWN_SYMBOL
		&& !SYSTEM_PREFIXES.iter().any(|p| function.starts_with(p))
		&& !SYSTEM_CONTAINS.iter().any(|c| function.contains(c))
}
