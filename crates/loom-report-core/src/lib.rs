// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom error reporting client.
//!
//! This crate holds the I/O-free pieces shared by the client SDK:
//! - Scopes and their key-wise merge rules
//! - Breadcrumbs and the bounded breadcrumb trail
//! - The outbound event record
//! - Endpoint identifier (DSN) parsing and the auth header

pub mod auth;
pub mod breadcrumb;
pub mod context;
pub mod dsn;
pub mod error;
pub mod event;
pub mod scope;

pub use auth::{auth_header, AUTH_HEADER_NAME, CLIENT_NAME};
pub use breadcrumb::{
	clamp_max_breadcrumbs, Breadcrumb, BreadcrumbBuffer, BreadcrumbLevel, DEFAULT_MAX_BREADCRUMBS,
	MAX_BREADCRUMBS_CEILING,
};
pub use context::{RawRequest, UserContext};
pub use dsn::Dsn;
pub use error::{CoreError, Result};
pub use event::{
	format_timestamp, BreadcrumbValues, Event, EventId, Exception, Frame, SdkInfo, Stacktrace,
};
pub use scope::{merge_maps, Scope};

/// Free-form JSON object used for user, tags, extra, request and data maps.
pub type Map = serde_json::Map<String, serde_json::Value>;
