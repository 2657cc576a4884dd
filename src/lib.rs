//! # saga-kernel
//!
//! Effect interpreter for resumable component procedures. A procedure pauses by handing
//! the interpreter an effect (render an artifact, await an asynchronous value, hold a
//! piece of local state, or run a memoized computation) and is resumed with the result.
//! Every step is recorded, so an instance can be rebuilt by replaying its history, and a
//! state change forks a new instance from the slot that changed instead of mutating the
//! running one.
//!
//! - [kernel]: effects, memo, history, signals and the [kernel::Interpreter].
//! - [host]: [host::SagaComponent], which owns a memo and the current instance on behalf
//!   of a host that rerenders when asked to.

pub mod host;
pub mod kernel;

pub mod prelude {
    pub use crate::host::SagaComponent;
    pub use crate::kernel::{
        await_for, await_for_cached, compute, hold_state, procedure_fn, render, History,
        Interpreter, InterpreterConfig, Locals, Memo, Procedure, ProducerError, Resumption,
        ResumptionExt, SagaError, Signal, StateCell, StateSetter, Status, StepSequence, Value,
        Yielded,
    };
}
