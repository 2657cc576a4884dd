//! Effect interpreter: drives one procedure instance step by step.
//!
//! The interpreter feeds the procedure the value recorded by its last step, interprets
//! the effect it gets back against the memo and the history, records a new step and
//! either pauses (render, state, compute, cached await) or suspends until a producer
//! resolves. State setters never touch the running instance; they emit a forked
//! history that the host replays into a brand-new instance.
//!
//! Status transitions: `Paused -> Running -> Paused | Terminated`. Only an
//! `AwaitFor` miss leaves an instance `Running` after `proceed` returns.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::kernel::config::InterpreterConfig;
use crate::kernel::effect::{Computation, Effect, EffectKind, Yielded};
use crate::kernel::error::{ProducerError, SagaError};
use crate::kernel::history::{History, HistoryEntry, Position, Step, StepFactory};
use crate::kernel::memo::Memo;
use crate::kernel::procedure::{Procedure, Resumption, StateCell, StateSetter};
use crate::kernel::signal::{ObserverRegistry, Signal, SubscriptionId};
use crate::kernel::timeline::{run_timeline, Timeline};
use crate::kernel::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Paused,
    Running,
    Terminated,
}

struct Core<A> {
    /// Taken out while a step runs, so the step may call back into the instance.
    procedure: Option<Box<dyn Procedure<A>>>,
    history: History<A>,
    status: Status,
}

struct Shared<A> {
    core: Mutex<Core<A>>,
    observers: Arc<ObserverRegistry<A>>,
    memo: Memo,
    config: InterpreterConfig,
}

/// Handle to one interpreter instance. Clones share the instance.
pub struct Interpreter<A> {
    shared: Arc<Shared<A>>,
}

impl<A> Clone for Interpreter<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A> Interpreter<A>
where
    A: Clone + Send + Sync + 'static,
{
    pub fn new<P>(procedure: P, memo: Memo) -> Self
    where
        P: Procedure<A> + 'static,
    {
        Self::with_config(procedure, memo, InterpreterConfig::default())
    }

    pub fn with_config<P>(procedure: P, memo: Memo, config: InterpreterConfig) -> Self
    where
        P: Procedure<A> + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    procedure: Some(Box::new(procedure)),
                    history: History::new(),
                    status: Status::Paused,
                }),
                observers: Arc::new(ObserverRegistry::new()),
                memo,
                config,
            }),
        }
    }

    fn core(&self) -> MutexGuard<'_, Core<A>> {
        self.shared
            .core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> Status {
        self.core().status
    }

    pub fn is_terminated(&self) -> bool {
        self.status() == Status::Terminated
    }

    /// Current history length, i.e. the position the next effect will be keyed by.
    pub fn position(&self) -> Position {
        self.core().history.len()
    }

    /// Copy of the replayable history recorded so far.
    pub fn history(&self) -> History<A> {
        self.core().history.clone()
    }

    pub fn memo(&self) -> &Memo {
        &self.shared.memo
    }

    pub fn timeline(&self) -> Timeline {
        let core = self.core();
        run_timeline(&core.history, core.status)
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Signal<A>) + Send + Sync + 'static,
    {
        self.shared.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.observers.unsubscribe(id)
    }

    /// Stops the instance for good and drops every subscription. Producers already in
    /// flight keep running, but their results are discarded.
    pub fn terminate(&self) {
        self.core().status = Status::Terminated;
        self.shared.observers.close();
        log::debug!("interpreter terminated");
    }

    /// Steps the procedure while the instance is paused. Returns when it suspends on an
    /// await, completes, or fails.
    pub fn proceed(&self) -> Result<(), SagaError> {
        while let Some(signal) = self.next()? {
            self.shared.observers.emit(&signal);
        }
        Ok(())
    }

    /// Positions a fresh instance at the end of `history` without re-running any of its
    /// effects. Every recorded value but the last is fed to the procedure; the last is
    /// recorded only, so the next [Interpreter::proceed] picks up from there.
    pub fn replay(&self, history: History<A>) -> Result<(), SagaError> {
        if history.is_empty() {
            return Ok(());
        }
        let mut guard = self.core();
        let core = &mut *guard;
        if !core.history.is_empty() || core.status != Status::Paused {
            return Err(SagaError::contract(
                core.history.len(),
                "replay needs a fresh, paused instance",
            ));
        }

        let Some(mut procedure) = core.procedure.take() else {
            return Err(SagaError::contract(0, "replay re-entered from inside a step"));
        };
        let replayed = self.replay_into(core, procedure.as_mut(), history);
        core.procedure = Some(procedure);
        replayed
    }

    fn replay_into(
        &self,
        core: &mut Core<A>,
        procedure: &mut dyn Procedure<A>,
        history: History<A>,
    ) -> Result<(), SagaError> {
        let total = history.len();
        log::debug!("replaying {total} steps");
        let mut input = None;
        for (position, entry) in history.into_iter().enumerate() {
            let is_last = position + 1 == total;
            match procedure.resume(input.take()) {
                Ok(Yielded::Effect(effect)) => {
                    if !records(effect.kind(), &entry) {
                        return Err(fail(
                            core,
                            SagaError::diverged(
                                position,
                                format!("procedure yielded {} where the history differs", effect.kind()),
                            ),
                        ));
                    }
                    log::trace!("replay: skipped {} at position {position}", effect.kind());
                }
                Ok(Yielded::Complete(_)) if is_last && entry.view().is_some() => {
                    core.history.push(entry);
                    core.status = Status::Terminated;
                    log::debug!("replayed history already ends in completion");
                    return Ok(());
                }
                Ok(Yielded::Complete(_)) => {
                    return Err(fail(
                        core,
                        SagaError::diverged(position, "procedure completed before the history ended"),
                    ));
                }
                Err(err) => {
                    return Err(fail(core, SagaError::diverged(position, err.to_string())));
                }
            }
            if !is_last {
                input = self.resolve(core.history.entries(), &entry);
            }
            core.history.push(entry);
        }
        Ok(())
    }

    /// One step. `Ok(None)` means the loop in [Interpreter::proceed] must stop.
    ///
    /// The core lock is released while the procedure runs and while a computation is
    /// evaluated, so both may read the instance, terminate it or fire a setter.
    fn next(&self) -> Result<Option<Signal<A>>, SagaError> {
        let (position, input, mut procedure) = {
            let mut guard = self.core();
            let core = &mut *guard;
            if core.status == Status::Running && core.procedure.is_none() {
                return Err(SagaError::contract(
                    core.history.len(),
                    "proceed called from inside a running step",
                ));
            }
            if core.status != Status::Paused {
                return Ok(None);
            }
            let position = core.history.len();
            if let Some(limit) = self.shared.config.max_history_len {
                if position >= limit {
                    return Err(fail(core, SagaError::HistoryLimit { limit }));
                }
            }
            let Some(procedure) = core.procedure.take() else {
                return Err(fail(core, SagaError::contract(position, "procedure is missing")));
            };
            core.status = Status::Running;
            let input = match core.history.entries().split_last() {
                Some((last, prefix)) => self.resolve(prefix, last),
                None => None,
            };
            (position, input, procedure)
        };

        let resumed = procedure.resume(input);

        let mut guard = self.core();
        let core = &mut *guard;
        core.procedure = Some(procedure);
        if core.status == Status::Terminated {
            log::debug!("instance terminated while stepping position {position}");
            return Ok(None);
        }
        let effect = match resumed {
            Ok(Yielded::Effect(effect)) => effect,
            Ok(Yielded::Complete(artifact)) => {
                core.history.push_step(Step::View(artifact));
                core.status = Status::Terminated;
                log::debug!("procedure completed at position {position}");
                return Ok(Some(Signal::Done));
            }
            Err(err) => return Err(fail(core, err.at(position))),
        };

        log::trace!("interpreting {} at position {position}", effect.kind());
        match effect {
            Effect::Render(artifact) => {
                core.history.push_step(Step::View(artifact));
                Ok(Some(ready(core)))
            }
            Effect::AwaitFor { producer, cache_by } => {
                if let Some(keys) = &cache_by {
                    if let Some(value) = self.shared.memo.lookup(position, keys) {
                        log::debug!("await cache hit at position {position}");
                        core.history.push_step(Step::Yielded(value));
                        return Ok(Some(ready(core)));
                    }
                }
                let Some(runtime) = self.shared.config.spawn_handle() else {
                    return Err(fail(core, SagaError::NoRuntime { position }));
                };
                let pending = AssertUnwindSafe(producer()).catch_unwind();
                let owner = Arc::downgrade(&self.shared);
                runtime.spawn(async move {
                    let result = pending.await.unwrap_or_else(|panic| Err(panicked(panic)));
                    match owner.upgrade() {
                        Some(shared) => Interpreter { shared }.settle(position, cache_by, result),
                        None => log::debug!("instance dropped before await at {position} resolved"),
                    }
                });
                Ok(None)
            }
            Effect::HoldState { default } => {
                core.history
                    .push_factory(StepFactory::State { value: default });
                Ok(Some(ready(core)))
            }
            Effect::Compute { compute, keys } => {
                // Status stays Running while the lock is released.
                drop(guard);
                let value = self.evaluate(position, compute, &keys);
                let mut core = self.core();
                if core.status == Status::Terminated {
                    return Ok(None);
                }
                core.history.push_step(Step::Yielded(value));
                Ok(Some(ready(&mut *core)))
            }
        }
    }

    /// Memoized evaluation of a `Compute` effect. Runs without the core lock.
    fn evaluate(&self, position: Position, compute: Computation, keys: &[Value]) -> Value {
        if let Some(value) = self.shared.memo.lookup(position, keys) {
            log::debug!("compute cache hit at position {position}");
            return value;
        }
        let value = compute();
        self.shared.memo.remember(position, keys, value.clone());
        value
    }

    /// Continuation of an `AwaitFor` miss. Runs on the producer's task.
    fn settle(
        &self,
        position: Position,
        cache_by: Option<Vec<Value>>,
        result: Result<Value, ProducerError>,
    ) {
        let signal = {
            let mut guard = self.core();
            let core = &mut *guard;
            if core.status == Status::Terminated {
                log::debug!("discarding stale completion for position {position}");
                return;
            }
            if core.status != Status::Running || core.history.len() != position {
                log::warn!(
                    "ignoring completion for position {position}: instance is {:?} at position {}",
                    core.status,
                    core.history.len()
                );
                return;
            }
            match result {
                Ok(value) => {
                    if let Some(keys) = &cache_by {
                        self.shared.memo.remember(position, keys, value.clone());
                    }
                    core.history.push_step(Step::Yielded(value));
                    ready(core)
                }
                Err(err) => {
                    let error = SagaError::Producer {
                        position,
                        message: err.to_string(),
                    };
                    Signal::Rejected(fail(core, error))
                }
            }
        };
        self.shared.observers.emit(&signal);
    }

    /// Turns a recorded entry into the value the procedure is resumed with. State
    /// factories are bound to this instance here, with `prefix` as the fork snapshot.
    fn resolve(&self, prefix: &[HistoryEntry<A>], entry: &HistoryEntry<A>) -> Option<Resumption> {
        match entry {
            HistoryEntry::Step(Step::Yielded(value)) => Some(Resumption::Value(value.clone())),
            HistoryEntry::Step(Step::View(_)) => None,
            HistoryEntry::Factory(StepFactory::State { value }) => {
                Some(Resumption::State(StateCell {
                    value: value.clone(),
                    setter: self.setter(prefix),
                }))
            }
        }
    }

    fn setter(&self, prefix: &[HistoryEntry<A>]) -> StateSetter {
        let snapshot: Arc<[HistoryEntry<A>]> = Arc::from(prefix);
        let observers = Arc::downgrade(&self.shared.observers);
        let position = prefix.len();
        StateSetter::new(
            position,
            Arc::new(move |value: Value| {
                let Some(observers) = observers.upgrade() else {
                    return;
                };
                log::debug!("state at position {position} set to {value:?}, forking");
                observers.emit(&Signal::Forked(History::forked(&snapshot, value)));
            }),
        )
    }
}

impl<A> Interpreter<A>
where
    A: Clone + Default + Send + Sync + 'static,
{
    /// Most recently recorded artifact, or `A::default()` when nothing was rendered yet.
    pub fn view(&self) -> A {
        self.core().history.latest_view().cloned().unwrap_or_default()
    }
}

impl<A> fmt::Debug for Interpreter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self
            .shared
            .core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f.debug_struct("Interpreter")
            .field("status", &core.status)
            .field("position", &core.history.len())
            .finish_non_exhaustive()
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> ProducerError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("producer panicked: {message}").into()
}

fn ready<A>(core: &mut Core<A>) -> Signal<A> {
    core.status = Status::Paused;
    Signal::ReadyToContinue
}

fn fail<A>(core: &mut Core<A>, error: SagaError) -> SagaError {
    core.status = Status::Terminated;
    log::warn!("interpreter failed: {error}");
    error
}

/// Whether `entry` is what interpreting an effect of `kind` records.
fn records<A>(kind: EffectKind, entry: &HistoryEntry<A>) -> bool {
    match (kind, entry) {
        (EffectKind::Render, HistoryEntry::Step(Step::View(_))) => true,
        (EffectKind::HoldState, entry) => entry.is_factory(),
        (EffectKind::AwaitFor | EffectKind::Compute, HistoryEntry::Step(Step::Yielded(_))) => true,
        _ => false,
    }
}
