// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the report core.

use thiserror::Error;

/// Errors produced while parsing or validating core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
	#[error("invalid DSN: {0}")]
	InvalidDsn(String),

	#[error("DSN is missing a public key")]
	MissingPublicKey,

	#[error("DSN is missing a project id")]
	MissingProjectId,

	#[error("unsupported DSN protocol: {0}")]
	UnsupportedProtocol(String),

	#[error("invalid event id: {0}")]
	InvalidEventId(String),

	#[error("invalid breadcrumb level: {0}")]
	InvalidBreadcrumbLevel(String),
}

/// Result type for report core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
