//! Resumable procedures and the values fed back into them.
//!
//! A [Procedure] is resumed with the value produced by its previous pause (nothing on
//! the first call) and answers with its next effect or its final artifact. Rust has no
//! native generators on stable, so procedures are explicit state machines: either a
//! hand-written [Procedure] impl, a closure wrapped by [procedure_fn], or a
//! [StepSequence] of labelled steps driven by a cursor.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::kernel::effect::Yielded;
use crate::kernel::error::SagaError;
use crate::kernel::history::Position;
use crate::kernel::value::Value;

/// Setter handed out with a state slot. Invoking it never mutates the running
/// procedure; it asks the owning instance's host to fork.
///
/// Calling it from inside a step of its own procedure is allowed: the fork is raised
/// immediately and the host decides what happens to the instance mid-step.
#[derive(Clone)]
pub struct StateSetter {
    position: Position,
    fork: Arc<dyn Fn(Value) + Send + Sync>,
}

impl StateSetter {
    pub(crate) fn new(position: Position, fork: Arc<dyn Fn(Value) + Send + Sync>) -> Self {
        Self { position, fork }
    }

    pub fn set(&self, value: impl Into<Value>) {
        (self.fork)(value.into());
    }

    /// Position of the state slot this setter belongs to.
    pub fn position(&self) -> Position {
        self.position
    }
}

impl fmt::Debug for StateSetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

/// Current value of a state slot and its setter.
#[derive(Clone, Debug)]
pub struct StateCell {
    pub value: Value,
    pub setter: StateSetter,
}

impl StateCell {
    pub fn into_parts(self) -> (Value, StateSetter) {
        (self.value, self.setter)
    }
}

/// Value fed into a procedure when it is resumed.
#[derive(Clone, Debug)]
pub enum Resumption {
    Value(Value),
    State(StateCell),
}

impl Resumption {
    pub fn into_value(self) -> Result<Value, SagaError> {
        match self {
            Resumption::Value(value) => Ok(value),
            Resumption::State(_) => Err(SagaError::contract(0, "expected a value, got a state cell")),
        }
    }

    pub fn into_state(self) -> Result<StateCell, SagaError> {
        match self {
            Resumption::State(cell) => Ok(cell),
            Resumption::Value(value) => Err(SagaError::contract(
                0,
                format!("expected a state cell, got a {} value", value.kind()),
            )),
        }
    }
}

/// Helpers for the optional input of [Procedure::resume].
///
/// Errors carry position 0; the interpreter stamps the real position when the error
/// leaves the procedure.
pub trait ResumptionExt {
    fn value(self) -> Result<Value, SagaError>;
    fn state(self) -> Result<StateCell, SagaError>;
}

impl ResumptionExt for Option<Resumption> {
    fn value(self) -> Result<Value, SagaError> {
        self.ok_or_else(|| SagaError::contract(0, "expected a value, got nothing"))?
            .into_value()
    }

    fn state(self) -> Result<StateCell, SagaError> {
        self.ok_or_else(|| SagaError::contract(0, "expected a state cell, got nothing"))?
            .into_state()
    }
}

pub trait Procedure<A>: Send {
    fn resume(&mut self, input: Option<Resumption>) -> Result<Yielded<A>, SagaError>;
}

impl<A, P: Procedure<A> + ?Sized> Procedure<A> for Box<P> {
    fn resume(&mut self, input: Option<Resumption>) -> Result<Yielded<A>, SagaError> {
        (**self).resume(input)
    }
}

/// Procedure backed by a closure that keeps its own state.
pub struct FnProcedure<F> {
    f: F,
}

pub fn procedure_fn<A, F>(f: F) -> FnProcedure<F>
where
    F: FnMut(Option<Resumption>) -> Result<Yielded<A>, SagaError> + Send,
{
    FnProcedure { f }
}

impl<A, F> Procedure<A> for FnProcedure<F>
where
    F: FnMut(Option<Resumption>) -> Result<Yielded<A>, SagaError> + Send,
{
    fn resume(&mut self, input: Option<Resumption>) -> Result<Yielded<A>, SagaError> {
        (self.f)(input)
    }
}

/// Named scratch space shared by the steps of a [StepSequence].
#[derive(Debug, Default)]
pub struct Locals {
    values: HashMap<String, Value>,
    setters: HashMap<String, StateSetter>,
}

impl Locals {
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Like [Locals::get], but a missing local is a contract violation.
    pub fn value(&self, name: &str) -> Result<&Value, SagaError> {
        self.values
            .get(name)
            .ok_or_else(|| SagaError::contract(0, format!("local `{name}` was never set")))
    }

    /// Stores a state cell under `name`: its value as a local, its setter alongside.
    pub fn bind_state(&mut self, name: impl Into<String>, cell: StateCell) {
        let name = name.into();
        self.values.insert(name.clone(), cell.value);
        self.setters.insert(name, cell.setter);
    }

    pub fn setter(&self, name: &str) -> Option<&StateSetter> {
        self.setters.get(name)
    }
}

type StepFn<A> =
    Box<dyn FnMut(&mut Locals, Option<Resumption>) -> Result<Yielded<A>, SagaError> + Send>;

/// A procedure written as an ordered list of labelled steps.
///
/// Each resumption runs the step under the cursor and advances it. Step `n` receives
/// the value produced by the effect step `n - 1` yielded.
pub struct StepSequence<A> {
    steps: Vec<(&'static str, StepFn<A>)>,
    cursor: usize,
    locals: Locals,
}

impl<A> Default for StepSequence<A> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            cursor: 0,
            locals: Locals::default(),
        }
    }
}

impl<A> StepSequence<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step<F>(mut self, label: &'static str, f: F) -> Self
    where
        F: FnMut(&mut Locals, Option<Resumption>) -> Result<Yielded<A>, SagaError> + Send + 'static,
    {
        self.steps.push((label, Box::new(f)));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<A> Procedure<A> for StepSequence<A> {
    fn resume(&mut self, input: Option<Resumption>) -> Result<Yielded<A>, SagaError> {
        let Some((label, step)) = self.steps.get_mut(self.cursor) else {
            return Err(SagaError::contract(
                0,
                format!(
                    "resumed after the last of {} steps without completing",
                    self.steps.len()
                ),
            ));
        };
        log::trace!("step sequence: running `{label}` ({})", self.cursor);
        self.cursor += 1;
        (step)(&mut self.locals, input)
    }
}
