//! Interpreter tuning knobs.

use tokio::runtime::Handle;

#[derive(Clone, Debug, Default)]
pub struct InterpreterConfig {
    /// Runtime that drives producer futures. `None` uses the runtime current at the
    /// time the await is interpreted.
    pub runtime: Option<Handle>,
    /// Upper bound on history length. `None` leaves histories unbounded.
    pub max_history_len: Option<usize>,
}

impl InterpreterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_max_history_len(mut self, limit: usize) -> Self {
        self.max_history_len = Some(limit);
        self
    }

    /// Handle producers are spawned on, if any is reachable.
    pub(crate) fn spawn_handle(&self) -> Option<Handle> {
        self.runtime.clone().or_else(|| Handle::try_current().ok())
    }
}
