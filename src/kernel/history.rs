//! Replayable history: the ordered, append-only log of steps an interpreter has taken.
//!
//! A history is the unit handed from one interpreter instance to the next on a fork.
//! Its length at any time is the structural [Position] of the next effect, which is
//! also the first half of every memoization key.

use crate::kernel::value::Value;

/// Index of a step in a history; equals the history length when the effect was interpreted.
pub type Position = usize;

/// A concrete recorded step.
#[derive(Clone, Debug, PartialEq)]
pub enum Step<A> {
    /// Value fed back into the procedure at the next resumption.
    Yielded(Value),
    /// Artifact produced by a render or by completion.
    View(A),
}

/// A step whose content depends on the interpreter instance that ends up owning it.
///
/// Only state slots need this: their setter must fork whichever instance currently
/// owns the history, never the one that first recorded the slot. The owner rebuilds
/// the setter from its own prefix when it resolves the factory.
#[derive(Clone, Debug, PartialEq)]
pub enum StepFactory {
    State { value: Value },
}

#[derive(Clone, Debug, PartialEq)]
pub enum HistoryEntry<A> {
    Step(Step<A>),
    Factory(StepFactory),
}

impl<A> HistoryEntry<A> {
    pub fn view(&self) -> Option<&A> {
        match self {
            HistoryEntry::Step(Step::View(artifact)) => Some(artifact),
            _ => None,
        }
    }

    pub fn is_factory(&self) -> bool {
        matches!(self, HistoryEntry::Factory(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct History<A> {
    entries: Vec<HistoryEntry<A>>,
}

impl<A> Default for History<A> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<A> History<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry<A>] {
        &self.entries
    }

    pub fn get(&self, position: Position) -> Option<&HistoryEntry<A>> {
        self.entries.get(position)
    }

    pub fn last(&self) -> Option<&HistoryEntry<A>> {
        self.entries.last()
    }

    pub fn push(&mut self, entry: HistoryEntry<A>) {
        self.entries.push(entry);
    }

    pub fn push_step(&mut self, step: Step<A>) {
        self.push(HistoryEntry::Step(step));
    }

    pub fn push_factory(&mut self, factory: StepFactory) {
        self.push(HistoryEntry::Factory(factory));
    }

    /// Most recent recorded artifact, scanning backwards.
    pub fn latest_view(&self) -> Option<&A> {
        self.entries.iter().rev().find_map(HistoryEntry::view)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HistoryEntry<A>> {
        self.entries.iter()
    }
}

impl<A: Clone> History<A> {
    /// Builds the history a state setter hands to the next instance: the steps before
    /// the slot, followed by a state factory carrying the new value.
    pub fn forked(prefix: &[HistoryEntry<A>], value: Value) -> Self {
        let mut entries = Vec::with_capacity(prefix.len() + 1);
        entries.extend_from_slice(prefix);
        entries.push(HistoryEntry::Factory(StepFactory::State { value }));
        Self { entries }
    }
}

impl<A> From<Vec<HistoryEntry<A>>> for History<A> {
    fn from(entries: Vec<HistoryEntry<A>>) -> Self {
        Self { entries }
    }
}

impl<A> IntoIterator for History<A> {
    type Item = HistoryEntry<A>;
    type IntoIter = std::vec::IntoIter<HistoryEntry<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, A> IntoIterator for &'a History<A> {
    type Item = &'a HistoryEntry<A>;
    type IntoIter = std::slice::Iter<'a, HistoryEntry<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
