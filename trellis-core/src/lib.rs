//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive UI engine.
//! It implements:
//!
//! - Reactive primitives (signals, derived signals, effects with deps)
//! - A batching scheduler flushed once per cooperative tick
//! - An instance registry with lifecycle callbacks and owned cleanups
//! - Host tree creation, patching, and keyed child reconciliation
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: signals, derivations, effect sites, dependency tracking
//! - `runtime`: the engine context (scheduler, registry, component scope)
//! - `view`: node descriptions and the `h` tree builder
//! - `host`: the abstract host tree and an in-memory implementation
//! - `executor`: create, patch, reconcile, and unmount
//! - `engine`: the application-facing facade
//!
//! # Example
//!
//! ```rust
//! use trellis_core::{h, Engine, Host, Props, Scope};
//!
//! let engine = Engine::new();
//! let root = engine.host().create_element("body");
//! let name = engine.signal("world".to_string());
//! let greeting = {
//!     let name = name.clone();
//!     engine.derive(move || format!("hello {}", name.get()))
//! };
//!
//! engine.mount(root, move |cx: &Scope| {
//!     h(cx, "div", Props::new().attr("id", "x"), &greeting)
//! });
//!
//! name.set("trellis".to_string());
//! engine.run_until_idle().unwrap();
//! let html = engine.memory_host().unwrap().to_html(root);
//! assert_eq!(html, "<body><div id=\"x\">hello trellis</div></body>");
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod host;
pub mod reactive;
pub mod runtime;
pub mod view;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use executor::Executor;
pub use host::{Event, Host, HostNode, Listener, MemoryHost, MutationStats};
pub use reactive::{untrack, Dep, Signal, Subscription};
pub use runtime::{Cleanup, FlushStats, InstanceId, InstanceInfo, Phase, Runtime, Scope};
pub use view::{h, Child, Component, Key, Node, Props, Value};
