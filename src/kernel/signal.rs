//! Signals an interpreter emits and the per-instance observer registry that delivers them.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::kernel::error::SagaError;
use crate::kernel::history::History;

/// What the host has to react to.
#[derive(Clone, Debug)]
pub enum Signal<A> {
    /// A step completed and the instance is paused again.
    ReadyToContinue,
    /// A state setter fired; the host must rebuild an instance and replay this history.
    Forked(History<A>),
    /// The procedure returned its final artifact.
    Done,
    /// An `AwaitFor` producer failed; the instance is terminated and its history untouched.
    Rejected(SagaError),
}

impl<A> Signal<A> {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::ReadyToContinue => "readyToContinue",
            Signal::Forked(_) => "forked",
            Signal::Done => "done",
            Signal::Rejected(_) => "rejected",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer<A> = Arc<dyn Fn(&Signal<A>) + Send + Sync>;

struct Observers<A> {
    next_id: u64,
    entries: Vec<(SubscriptionId, Observer<A>)>,
    closed: bool,
}

/// Observer table owned by one interpreter instance. Closing it drops every
/// subscription and ignores later ones.
pub struct ObserverRegistry<A> {
    inner: Mutex<Observers<A>>,
}

impl<A> Default for ObserverRegistry<A> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Observers {
                next_id: 0,
                entries: Vec::new(),
                closed: false,
            }),
        }
    }
}

impl<A> ObserverRegistry<A> {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Observers<A>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Signal<A>) + Send + Sync + 'static,
    {
        let mut inner = self.inner();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        if !inner.closed {
            inner.entries.push((id, Arc::new(observer)));
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner();
        let before = inner.entries.len();
        inner.entries.retain(|(entry, _)| *entry != id);
        inner.entries.len() != before
    }

    /// Delivers `signal` to every observer registered at the time of the call.
    /// The table lock is released before any observer runs, so observers may
    /// subscribe, unsubscribe or close without deadlocking.
    pub fn emit(&self, signal: &Signal<A>) {
        let observers: Vec<Observer<A>> = {
            let inner = self.inner();
            inner.entries.iter().map(|(_, o)| Arc::clone(o)).collect()
        };
        for observer in observers {
            observer(signal);
        }
    }

    pub fn close(&self) {
        let mut inner = self.inner();
        inner.closed = true;
        inner.entries.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner().closed
    }

    pub fn len(&self) -> usize {
        self.inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A> fmt::Debug for ObserverRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner();
        f.debug_struct("ObserverRegistry")
            .field("observers", &inner.entries.len())
            .field("closed", &inner.closed)
            .finish()
    }
}
