// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Context store: one process-wide scope plus task-local scopes.
//!
//! A task scope is attached with [`ContextStore::run_scoped`] and lives in
//! tokio task-local storage for as long as the wrapped future runs. While it
//! is active, every context operation on that task targets it instead of the
//! global scope. Futures spawned through [`ContextStore::bind`] share the
//! scope of the task that spawned them; a plain `tokio::spawn` does not.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use loom_report_core::{Breadcrumb, Scope};
use tracing::warn;

tokio::task_local! {
	static TASK_SCOPE: ScopeHandle;
}

/// Shared handle to a task scope. `None` means a task boundary exists but no
/// scope has been attached yet.
#[derive(Debug, Clone, Default)]
struct ScopeHandle(Arc<Mutex<Option<Scope>>>);

impl ScopeHandle {
	fn seeded(scope: Scope) -> Self {
		Self(Arc::new(Mutex::new(Some(scope))))
	}

	fn lock(&self) -> MutexGuard<'_, Option<Scope>> {
		self.0.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

/// Consistent view of the scopes that apply to one capture.
#[derive(Debug, Clone)]
pub struct ResolvedContext {
	pub global: Scope,
	pub task: Option<Scope>,
}

/// Holds the global scope and resolves the active scope for the calling task.
#[derive(Debug)]
pub struct ContextStore {
	global: RwLock<Scope>,
	max_breadcrumbs: usize,
}

impl ContextStore {
	pub fn new(global: Scope, max_breadcrumbs: usize) -> Self {
		Self {
			global: RwLock::new(global),
			max_breadcrumbs,
		}
	}

	fn current_task() -> Option<ScopeHandle> {
		TASK_SCOPE.try_with(ScopeHandle::clone).ok()
	}

	/// Runs `f` against the active scope: the task scope when one is active,
	/// the global scope otherwise.
	fn with_active<R>(&self, f: impl FnOnce(&mut Scope) -> R) -> R {
		match Self::current_task() {
			Some(handle) => {
				let mut slot = handle.lock();
				let scope = slot.get_or_insert_with(|| {
					warn!("report context not found on active task, attaching an empty scope");
					Scope::default()
				});
				f(scope)
			}
			None => {
				let mut global = self.global.write().unwrap_or_else(PoisonError::into_inner);
				f(&mut global)
			}
		}
	}

	/// Replaces the active scope.
	pub fn set_context(&self, scope: Scope) {
		self.with_active(|active| *active = scope);
	}

	/// Merges `scope` into the active scope field by field.
	pub fn merge_context(&self, scope: Scope) {
		let max = self.max_breadcrumbs;
		self.with_active(|active| active.merge(scope, max));
	}

	/// Snapshot of the active scope.
	pub fn get_context(&self) -> Scope {
		match Self::current_task() {
			Some(_) => self.with_active(|active| active.clone()),
			None => self
				.global
				.read()
				.unwrap_or_else(PoisonError::into_inner)
				.clone(),
		}
	}

	/// Appends a breadcrumb to the active scope's trail.
	pub fn record_breadcrumb(&self, breadcrumb: Breadcrumb) {
		let max = self.max_breadcrumbs;
		self.with_active(|active| active.breadcrumbs.push(breadcrumb, max));
	}

	/// Snapshots the global scope and the task scope (if any) for a capture.
	/// Both locks are held only for the copy.
	pub fn resolve(&self) -> ResolvedContext {
		let task = Self::current_task().map(|handle| handle.lock().clone().unwrap_or_default());
		let global = self
			.global
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone();
		ResolvedContext { global, task }
	}

	/// Whether the caller runs inside a task scope.
	pub fn in_task_scope() -> bool {
		Self::current_task().is_some()
	}

	/// Runs `future` with a fresh task scope seeded from `seed`. The scope is
	/// dropped when the future completes.
	pub async fn run_scoped<F: Future>(seed: Scope, future: F) -> F::Output {
		TASK_SCOPE.scope(ScopeHandle::seeded(seed), future).await
	}

	/// Runs `future` inside a task boundary that has no scope attached; the
	/// first context access attaches an empty one.
	pub async fn task_boundary<F: Future>(future: F) -> F::Output {
		TASK_SCOPE.scope(ScopeHandle::default(), future).await
	}

	/// Ties `future` to the caller's task scope, captured now, so it keeps
	/// that scope when spawned elsewhere.
	pub fn bind<F: Future>(future: F) -> impl Future<Output = F::Output> {
		let handle = Self::current_task();
		async move {
			match handle {
				Some(handle) => TASK_SCOPE.scope(handle, future).await,
				None => future.await,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_report_core::clamp_max_breadcrumbs;
	use proptest::prelude::*;
	use serde_json::json;
	use std::time::Duration;

	fn store() -> ContextStore {
		ContextStore::new(Scope::new().with_tag("a", 1).with_tag("b", 2), 30)
	}

	#[test]
	fn outside_a_task_operations_target_global() {
		let store = store();
		store.merge_context(Scope::new().with_tag("b", 3));
		let scope = store.get_context();
		assert_eq!(scope.tags["a"], json!(1));
		assert_eq!(scope.tags["b"], json!(3));
		assert!(store.resolve().task.is_none());
	}

	#[test]
	fn global_reads_do_not_block_each_other() {
		let store = Arc::new(store());
		let held = store.global.read().unwrap();

		let (tx, rx) = std::sync::mpsc::channel();
		let reader = Arc::clone(&store);
		let handle = std::thread::spawn(move || {
			let _ = tx.send(reader.get_context().tags["a"].clone());
		});

		let seen = rx.recv_timeout(Duration::from_secs(5));
		drop(held);
		handle.join().unwrap();
		assert_eq!(seen.unwrap(), json!(1));
	}

	#[tokio::test]
	async fn task_scope_shadows_global() {
		let store = store();
		ContextStore::run_scoped(Scope::new().with_tag("b", 3), async {
			store.merge_context(Scope::new().with_extra("job", "sync"));
			let resolved = store.resolve();
			let task = resolved.task.unwrap();
			assert_eq!(task.tags["b"], json!(3));
			assert_eq!(task.extra["job"], json!("sync"));
			assert_eq!(resolved.global.tags["b"], json!(2));
			assert!(resolved.global.extra.is_empty());
		})
		.await;

		assert!(store.get_context().extra.is_empty());
	}

	#[tokio::test]
	async fn set_context_replaces_active_scope_only() {
		let store = store();
		ContextStore::run_scoped(Scope::new().with_tag("x", 1), async {
			store.set_context(Scope::new().with_tag("y", 2));
			let task = store.get_context();
			assert!(task.tags.get("x").is_none());
			assert_eq!(task.tags["y"], json!(2));
		})
		.await;
		assert_eq!(store.get_context().tags["a"], json!(1));
	}

	#[tokio::test]
	async fn interleaved_tasks_are_isolated() {
		let store = Arc::new(store());

		let run = |user: &'static str, delay: u64| {
			let store = Arc::clone(&store);
			tokio::spawn(ContextStore::run_scoped(Scope::new(), async move {
				store.merge_context(Scope::new().with_user(
					json!({ "id": user }).as_object().cloned().unwrap(),
				));
				tokio::time::sleep(Duration::from_millis(delay)).await;
				store.record_breadcrumb(Breadcrumb::new(user));
				tokio::time::sleep(Duration::from_millis(delay)).await;
				store.resolve().task.unwrap()
			}))
		};

		let a = run("alice", 5);
		let b = run("bob", 3);
		let (a, b) = (a.await.unwrap(), b.await.unwrap());

		assert_eq!(a.user["id"], json!("alice"));
		assert_eq!(b.user["id"], json!("bob"));
		assert_eq!(a.breadcrumbs.snapshot()[0].category, "alice");
		assert_eq!(b.breadcrumbs.len(), 1);
		assert!(store.get_context().user.is_empty());
	}

	#[tokio::test]
	async fn bound_futures_share_the_spawning_scope() {
		let store = Arc::new(store());
		let inner = Arc::clone(&store);
		ContextStore::run_scoped(Scope::new(), async move {
			let child = Arc::clone(&inner);
			tokio::spawn(ContextStore::bind(async move {
				child.merge_context(Scope::new().with_tag("child", true));
			}))
			.await
			.unwrap();
			assert_eq!(inner.get_context().tags["child"], json!(true));
		})
		.await;
		assert!(store.get_context().tags.get("child").is_none());
	}

	proptest! {
		#[test]
		fn recorded_trail_never_exceeds_clamped_max(max in 0usize..200, records in 0usize..300) {
			let limit = clamp_max_breadcrumbs(max);
			let store = ContextStore::new(Scope::new(), limit);
			for i in 0..records {
				store.record_breadcrumb(Breadcrumb::new(format!("c{i}")));
			}
			let trail = store.get_context().breadcrumbs.snapshot();
			prop_assert_eq!(trail.len(), records.min(limit));
			if let Some(last) = trail.last() {
				prop_assert_eq!(&last.category, &format!("c{}", records - 1));
			}
		}
	}

	#[tokio::test]
	async fn task_boundary_attaches_empty_scope_lazily() {
		let store = store();
		ContextStore::task_boundary(async {
			assert!(ContextStore::in_task_scope());
			assert!(store.get_context().is_empty());
			store.merge_context(Scope::new().with_tag("late", 1));
			assert_eq!(store.get_context().tags["late"], json!(1));
		})
		.await;
		assert!(store.get_context().tags.get("late").is_none());
	}
}
