//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! it registers the current computation as a subscriber and records a
//! [`Subscription`] the computation can cancel before its next run.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (running a derived signal or evaluating
//! an effect's dependencies), we push the subscriber onto the stack. When the
//! computation completes, the guard pops it.
//!
//! An entry without a subscriber suspends tracking, which is how
//! [`untrack`] works.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::signal::Subscription;
use super::subscriber::Subscriber;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The computation being tracked, or `None` while tracking is suspended.
    subscriber: Option<Subscriber>,
    /// Subscriptions created by signal reads during this computation.
    dependencies: SmallVec<[Subscription; 4]>,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub struct ReactiveContext {
    depth: usize,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any signal that is read will register
    /// the subscriber. The context is exited when the returned guard drops.
    pub fn enter(subscriber: Subscriber) -> Self {
        Self::push(Some(subscriber))
    }

    /// Enter a context in which reads are not tracked.
    pub fn suspend() -> Self {
        Self::push(None)
    }

    fn push(subscriber: Option<Subscriber>) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(ContextEntry {
                subscriber,
                dependencies: SmallVec::new(),
            });
            stack.len()
        });
        Self { depth }
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|entry| entry.subscriber.is_some())
        })
    }

    /// Get the subscriber of the innermost tracking computation, if any.
    pub fn current_subscriber() -> Option<Subscriber> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.subscriber.clone())
        })
    }

    /// Whether the innermost computation already depends on `source`.
    pub(crate) fn is_tracked(source: super::SignalId) -> bool {
        CONTEXT_STACK.with(|stack| {
            stack.borrow().last().is_some_and(|entry| {
                entry
                    .dependencies
                    .iter()
                    .any(|dependency| dependency.source_id() == source)
            })
        })
    }

    /// Record a subscription made on behalf of the innermost computation.
    pub(crate) fn track_dependency(subscription: Subscription) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                entry.dependencies.push(subscription);
            }
        });
    }

    /// Take the subscriptions collected so far in the innermost context.
    pub(crate) fn take_dependencies() -> SmallVec<[Subscription; 4]> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.dependencies))
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "ReactiveContext dropped out of order"
            );
            stack.pop();
        });
    }
}

/// Run `f` without tracking any signal it reads.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _suspended = ReactiveContext::suspend();
    f()
}
