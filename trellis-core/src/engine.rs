//! Engine Facade
//!
//! [`Engine`] bundles one runtime, one host, and the executor between them.
//! Applications build descriptions with [`Engine::scope`], mount them, and
//! drive the scheduler either by hand ([`Engine::flush`],
//! [`Engine::run_until_idle`]) or from an async task ([`Engine::drive`],
//! [`Engine::settle`]).
//!
//! # Example
//!
//! ```rust
//! use trellis_core::{h, Engine, Host, Props};
//!
//! let engine = Engine::new();
//! let root = engine.host().create_element("main");
//! let count = engine.signal(1);
//!
//! let cx = engine.scope();
//! engine.render(h(&cx, "span", Props::new(), &count), root);
//!
//! count.set(2);
//! engine.flush();
//! assert_eq!(engine.memory_host().unwrap().text_content(root), "2");
//! ```

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::executor::Executor;
use crate::host::{Host, HostNode, MemoryHost};
use crate::reactive::Signal;
use crate::runtime::{FlushStats, InstanceId, InstanceInfo, Runtime, Scope};
use crate::view::Node;

/// Cheap, cloneable handle to a running engine.
#[derive(Clone)]
pub struct Engine {
    executor: Arc<Executor>,
    memory: Option<Arc<MemoryHost>>,
}

impl Engine {
    /// An engine over a fresh [`MemoryHost`] with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// An engine over a fresh [`MemoryHost`].
    pub fn with_config(config: EngineConfig) -> Self {
        let memory = Arc::new(MemoryHost::new());
        let host: Arc<dyn Host> = memory.clone();
        Self {
            executor: Arc::new(Executor::new(Runtime::new(config), host)),
            memory: Some(memory),
        }
    }

    /// An engine writing to `host`.
    pub fn with_host(host: Arc<dyn Host>, config: EngineConfig) -> Self {
        Self {
            executor: Arc::new(Executor::new(Runtime::new(config), host)),
            memory: None,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        self.executor.runtime()
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        self.executor.host()
    }

    /// The in-memory host, when the engine was built over one.
    pub fn memory_host(&self) -> Option<&Arc<MemoryHost>> {
        self.memory.as_ref()
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// A scope bound to no instance, for building top-level descriptions.
    pub fn scope(&self) -> Scope {
        Scope::detached(self.runtime().clone())
    }

    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.runtime().signal(value)
    }

    pub fn derive<T, F>(&self, compute: F) -> Signal<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.runtime().derive(compute)
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    /// Materialize a prebuilt description under `mount`.
    pub fn render(&self, node: Node, mount: HostNode) -> InstanceId {
        self.executor.render(node, mount)
    }

    /// Mount a view function under `mount`. The view runs with a scope
    /// bound to the new instance and can be re-run with [`Engine::refresh`].
    pub fn mount<F>(&self, mount: HostNode, view: F) -> InstanceId
    where
        F: Fn(&Scope) -> Node + Send + Sync + 'static,
    {
        self.executor.mount(mount, Arc::new(view))
    }

    pub fn refresh(&self, id: InstanceId) -> Result<()> {
        self.executor.refresh(id)
    }

    pub fn update(&self, id: InstanceId, node: Node) -> Result<()> {
        self.executor.update(id, node)
    }

    pub fn unmount(&self, id: InstanceId) -> Result<()> {
        self.executor.unmount(id)
    }

    pub fn instance(&self, id: InstanceId) -> Option<InstanceInfo> {
        self.runtime().instance(id)
    }

    pub fn is_alive(&self, id: InstanceId) -> bool {
        self.runtime().is_alive(id)
    }

    pub fn instance_count(&self) -> usize {
        self.runtime().instance_count()
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Run the pending batch now.
    pub fn flush(&self) -> FlushStats {
        self.runtime().flush()
    }

    /// Flush until no task is pending.
    pub fn run_until_idle(&self) -> Result<FlushStats> {
        self.runtime().run_until_idle()
    }

    /// Async drain: yield to the executor between batches so other tasks
    /// can write signals, and stop once a yield leaves nothing pending.
    pub async fn settle(&self) -> Result<FlushStats> {
        let rounds = self.runtime().config().max_flush_rounds;
        let mut total = FlushStats::default();
        for _ in 0..rounds {
            tokio::task::yield_now().await;
            if !self.runtime().scheduler().has_pending() {
                return Ok(total);
            }
            total += self.flush();
        }
        if self.runtime().scheduler().has_pending() {
            return Err(EngineError::Unsettled { rounds });
        }
        Ok(total)
    }

    /// Flush every batch one tick after it is scheduled. Never returns;
    /// spawn it and abort the handle to stop.
    pub async fn drive(&self) {
        let scheduler = self.runtime().scheduler();
        loop {
            scheduler.notified().await;
            tokio::task::yield_now().await;
            let stats = self.flush();
            if stats.failed > 0 {
                tracing::warn!(failed = stats.failed, "batch finished with failures");
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("executor", &self.executor).finish()
    }
}
