//! Effect descriptors: what a procedure asks for when it pauses.
//!
//! These are plain data; all behaviour lives in the interpreter.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::kernel::error::ProducerError;
use crate::kernel::value::Value;

/// Zero-argument asynchronous producer behind an `AwaitFor`.
pub type Producer = Box<dyn FnOnce() -> BoxFuture<'static, Result<Value, ProducerError>> + Send>;

/// Zero-argument synchronous computation behind a `Compute`.
pub type Computation = Box<dyn FnOnce() -> Value + Send>;

pub enum Effect<A> {
    /// Show `A`; resumes immediately.
    Render(A),
    /// Wait for an asynchronous value, cached by `cache_by` when present.
    AwaitFor {
        producer: Producer,
        cache_by: Option<Vec<Value>>,
    },
    /// Request a mutable slot; resumes with the current value and its setter.
    HoldState { default: Value },
    /// Memoized pure computation, always cached by `keys`.
    Compute {
        compute: Computation,
        keys: Vec<Value>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Render,
    AwaitFor,
    HoldState,
    Compute,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectKind::Render => "render",
            EffectKind::AwaitFor => "awaitFor",
            EffectKind::HoldState => "state",
            EffectKind::Compute => "compute",
        };
        f.write_str(name)
    }
}

impl<A> Effect<A> {
    pub fn kind(&self) -> EffectKind {
        match self {
            Effect::Render(_) => EffectKind::Render,
            Effect::AwaitFor { .. } => EffectKind::AwaitFor,
            Effect::HoldState { .. } => EffectKind::HoldState,
            Effect::Compute { .. } => EffectKind::Compute,
        }
    }
}

impl<A: fmt::Debug> fmt::Debug for Effect<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Render(artifact) => f.debug_tuple("Render").field(artifact).finish(),
            Effect::AwaitFor { cache_by, .. } => f
                .debug_struct("AwaitFor")
                .field("cache_by", cache_by)
                .finish_non_exhaustive(),
            Effect::HoldState { default } => {
                f.debug_struct("HoldState").field("default", default).finish()
            }
            Effect::Compute { keys, .. } => f
                .debug_struct("Compute")
                .field("keys", keys)
                .finish_non_exhaustive(),
        }
    }
}

/// What a procedure hands back on each resumption.
#[derive(Debug)]
pub enum Yielded<A> {
    Effect(Effect<A>),
    Complete(A),
}

impl<A> From<Effect<A>> for Yielded<A> {
    fn from(effect: Effect<A>) -> Self {
        Yielded::Effect(effect)
    }
}

pub fn render<A>(artifact: A) -> Effect<A> {
    Effect::Render(artifact)
}

fn box_producer<F, Fut, V, E>(producer: F) -> Producer
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    V: Into<Value>,
    E: Into<ProducerError>,
{
    Box::new(move || {
        let fut = producer();
        async move { fut.await.map(Into::into).map_err(Into::into) }.boxed()
    })
}

/// Uncached await: the producer runs again on every restart that reaches this position.
pub fn await_for<A, F, Fut, V, E>(producer: F) -> Effect<A>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    V: Into<Value>,
    E: Into<ProducerError>,
{
    Effect::AwaitFor {
        producer: box_producer(producer),
        cache_by: None,
    }
}

/// Await whose result is cached by `cache_by` at this position.
pub fn await_for_cached<A, F, Fut, V, E>(producer: F, cache_by: Vec<Value>) -> Effect<A>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    V: Into<Value>,
    E: Into<ProducerError>,
{
    Effect::AwaitFor {
        producer: box_producer(producer),
        cache_by: Some(cache_by),
    }
}

pub fn hold_state<A>(default: impl Into<Value>) -> Effect<A> {
    Effect::HoldState {
        default: default.into(),
    }
}

pub fn compute<A, F, V>(compute: F, keys: Vec<Value>) -> Effect<A>
where
    F: FnOnce() -> V + Send + 'static,
    V: Into<Value>,
{
    Effect::Compute {
        compute: Box::new(move || compute().into()),
        keys,
    }
}
