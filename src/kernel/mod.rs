//! Saga kernel.
//!
//! Minimal complete set of pieces: effect descriptors (what a procedure asks for),
//! the memo (positional cache), the replayable history (source of truth for forks),
//! and the interpreter that ties them together.

pub mod config;
pub mod effect;
pub mod error;
pub mod history;
pub mod interpreter;
pub mod memo;
pub mod procedure;
pub mod signal;
pub mod timeline;
pub mod value;

pub use config::InterpreterConfig;
pub use effect::{
    await_for, await_for_cached, compute, hold_state, render, Computation, Effect, EffectKind,
    Producer, Yielded,
};
pub use error::{ProducerError, SagaError};
pub use history::{History, HistoryEntry, Position, Step, StepFactory};
pub use interpreter::{Interpreter, Status};
pub use memo::Memo;
pub use procedure::{
    procedure_fn, FnProcedure, Locals, Procedure, Resumption, ResumptionExt, StateCell,
    StateSetter, StepSequence,
};
pub use signal::{ObserverRegistry, Signal, SubscriptionId};
pub use timeline::{run_timeline, StepKind, Timeline, TimelineEntry};
pub use value::{args_equal, Value};
