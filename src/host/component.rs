//! One logical procedure identity bound to a host that can be asked to rerender.
//!
//! A [SagaComponent] owns the memo and the current interpreter instance. The host calls
//! [SagaComponent::render] whenever it wants an artifact, and gets asked to call it again
//! (through the rerender callback) when an await resolves, when the procedure completes
//! asynchronously, when a state setter forks the instance, or when a producer fails.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::kernel::config::InterpreterConfig;
use crate::kernel::error::SagaError;
use crate::kernel::history::History;
use crate::kernel::interpreter::{Interpreter, Status};
use crate::kernel::memo::Memo;
use crate::kernel::procedure::Procedure;
use crate::kernel::signal::Signal;

type Factory<I, A> = Box<dyn Fn(&I) -> Box<dyn Procedure<A>> + Send + Sync>;
type Rerender = Box<dyn Fn() + Send + Sync>;

struct Slot<I, A> {
    inputs: Option<I>,
    instance: Option<Interpreter<A>>,
    memo: Memo,
}

struct Inner<I, A> {
    factory: Factory<I, A>,
    rerender: Rerender,
    config: InterpreterConfig,
    rendering: AtomicBool,
    slot: Mutex<Slot<I, A>>,
    error: Mutex<Option<SagaError>>,
}

/// Host binding for a procedure built from inputs `I` that renders artifacts `A`.
///
/// State setters handed out in artifacts may be called from any thread, including from
/// inside a step of the procedure. A fork raised mid-step replaces the instance and the
/// step's own result is discarded.
pub struct SagaComponent<I, A> {
    inner: Arc<Inner<I, A>>,
}

impl<I, A> Clone for SagaComponent<I, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, A> SagaComponent<I, A>
where
    I: Clone + PartialEq + Send + 'static,
    A: Clone + Default + Send + Sync + 'static,
{
    pub fn new<F, P, R>(factory: F, rerender: R) -> Self
    where
        F: Fn(&I) -> P + Send + Sync + 'static,
        P: Procedure<A> + 'static,
        R: Fn() + Send + Sync + 'static,
    {
        Self::with_config(factory, rerender, InterpreterConfig::default())
    }

    pub fn with_config<F, P, R>(factory: F, rerender: R, config: InterpreterConfig) -> Self
    where
        F: Fn(&I) -> P + Send + Sync + 'static,
        P: Procedure<A> + 'static,
        R: Fn() + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                factory: Box::new(move |inputs: &I| -> Box<dyn Procedure<A>> {
                    Box::new(factory(inputs))
                }),
                rerender: Box::new(rerender),
                config,
                rendering: AtomicBool::new(false),
                slot: Mutex::new(Slot {
                    inputs: None,
                    instance: None,
                    memo: Memo::new(),
                }),
                error: Mutex::new(None),
            }),
        }
    }

    /// Steps the current instance as far as it goes and returns its latest artifact.
    ///
    /// A first render, or a render with inputs different from the last ones, starts a
    /// new instance from scratch. The memo is kept, so cached awaits and computations
    /// keyed by unchanged arguments are not repeated.
    ///
    /// Signals raised while the render is in progress do not ask for another one. If an
    /// await settled meanwhile on another thread, the instance is left paused and a
    /// rerender is requested once the flag is cleared.
    pub fn render(&self, inputs: I) -> Result<A, SagaError> {
        self.inner.rendering.store(true, Ordering::SeqCst);
        let result = self.render_current(inputs);
        self.inner.rendering.store(false, Ordering::SeqCst);
        if self.current().is_some_and(|instance| instance.status() == Status::Paused) {
            log::debug!("instance became ready during render");
            (self.inner.rerender)();
        }
        result
    }

    fn render_current(&self, inputs: I) -> Result<A, SagaError> {
        let instance = {
            let mut slot = self.inner.slot();
            let unchanged = slot.inputs.as_ref() == Some(&inputs);
            match slot.instance.clone().filter(|_| unchanged) {
                Some(instance) => instance,
                None => {
                    log::debug!("starting a new instance");
                    let fresh = instantiate(&self.inner, &inputs, slot.memo.clone());
                    if let Some(old) = slot.instance.replace(fresh.clone()) {
                        old.terminate();
                    }
                    slot.inputs = Some(inputs);
                    fresh
                }
            }
        };
        instance.proceed()?;
        Ok(instance.view())
    }

    /// Latest artifact of the current instance without stepping it.
    pub fn view(&self) -> A {
        self.current().map(|instance| instance.view()).unwrap_or_default()
    }

    /// Current interpreter instance, if one was started.
    pub fn current(&self) -> Option<Interpreter<A>> {
        self.inner.slot().instance.clone()
    }

    /// Forgets everything: the next render starts over with an empty memo.
    pub fn reset(&self) {
        let mut slot = self.inner.slot();
        if let Some(instance) = slot.instance.take() {
            instance.terminate();
        }
        slot.inputs = None;
        slot.memo = Memo::new();
        log::debug!("component reset");
    }

    pub fn unmount(&self) {
        if let Some(instance) = self.inner.slot().instance.take() {
            instance.terminate();
        }
        log::debug!("component unmounted");
    }

    /// Error recorded since the last call, from a failed producer or a failed fork replay.
    pub fn take_error(&self) -> Option<SagaError> {
        self.inner.error().take()
    }
}

impl<I, A> Inner<I, A> {
    fn slot(&self) -> MutexGuard<'_, Slot<I, A>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn error(&self) -> MutexGuard<'_, Option<SagaError>> {
        self.error.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn request_rerender(&self) {
        if !self.rendering.load(Ordering::SeqCst) {
            (self.rerender)();
        }
    }

    fn record(&self, error: SagaError) {
        log::warn!("component error: {error}");
        *self.error() = Some(error);
    }
}

fn instantiate<I, A>(inner: &Arc<Inner<I, A>>, inputs: &I, memo: Memo) -> Interpreter<A>
where
    I: Clone + PartialEq + Send + 'static,
    A: Clone + Default + Send + Sync + 'static,
{
    let instance = Interpreter::with_config((inner.factory)(inputs), memo, inner.config.clone());
    let owner: Weak<Inner<I, A>> = Arc::downgrade(inner);
    instance.subscribe(move |signal| {
        let Some(inner) = owner.upgrade() else {
            return;
        };
        match signal {
            Signal::ReadyToContinue | Signal::Done => inner.request_rerender(),
            Signal::Forked(history) => fork(&inner, history.clone()),
            Signal::Rejected(error) => {
                inner.record(error.clone());
                (inner.rerender)();
            }
        }
    });
    instance
}

/// Swaps the current instance for one positioned at the end of `history`.
fn fork<I, A>(inner: &Arc<Inner<I, A>>, history: History<A>)
where
    I: Clone + PartialEq + Send + 'static,
    A: Clone + Default + Send + Sync + 'static,
{
    let replayed = {
        let mut slot = inner.slot();
        let Some(inputs) = slot.inputs.clone() else {
            return;
        };
        log::debug!("forking at position {}", history.len());
        if let Some(old) = slot.instance.take() {
            old.terminate();
        }
        let fresh = instantiate(inner, &inputs, slot.memo.clone());
        let replayed = fresh.replay(history);
        slot.instance = Some(fresh);
        replayed
    };
    if let Err(error) = replayed {
        inner.record(error);
    }
    inner.request_rerender();
}

impl<I, A> fmt::Debug for SagaComponent<I, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.slot();
        f.debug_struct("SagaComponent")
            .field("instance", &slot.instance)
            .field("memo", &slot.memo)
            .field("rendering", &self.inner.rendering.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
