//! Reactive Primitives
//!
//! This module implements the reactive system: signals, derived signals, and
//! effects. These primitives are what the executor binds host nodes to.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (a derived signal or an effect's dependency
//! function), the signal registers that context as a subscriber. When the
//! value changes, every subscriber is scheduled for the next flush.
//!
//! ## Derived signals
//!
//! A derived signal re-runs a pure computation whenever a signal it read
//! changes, and writes the result into an ordinary signal. Downstream
//! subscribers hear about it only if the result changed.
//!
//! ## Effects
//!
//! An effect is a side-effecting computation bound to a component instance.
//! It re-runs when its dependency list changes and is torn down with the
//! instance.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies. Notifications are never delivered inline: they go through
//! the scheduler of the runtime that created the signal, which is what
//! collapses several writes in one tick into one re-run per subscriber.

mod context;
mod derived;
mod effect;
mod signal;
mod subscriber;

pub use context::{untrack, ReactiveContext};
pub use derived::DerivedStatus;
pub use effect::{Dep, DepValue, DepsFn, EffectFn};
pub use signal::{Signal, SignalId, Source, Subscription, TextSource, WeakSignal};
pub use subscriber::{Notify, Subscriber, SubscriberId};

pub(crate) use derived::Derivation;
pub(crate) use effect::EffectSite;
