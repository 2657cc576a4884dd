//! Memoization cache keyed by structural position and a shallow-compared argument list.
//!
//! A [Memo] lives as long as the logical procedure identity: it is shared by every
//! interpreter instance produced by forks and swapped out only when the host decides
//! the procedure itself changed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::kernel::history::Position;
use crate::kernel::value::{args_equal, Value};

#[derive(Debug, Default)]
struct MemoTable {
    by_position: HashMap<Position, Vec<(Vec<Value>, Value)>>,
}

/// Cloneable handle to a shared memo table.
#[derive(Clone, Debug, Default)]
pub struct Memo {
    table: Arc<Mutex<MemoTable>>,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, MemoTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `value` under `(position, args)` unless an equal argument list is already
    /// cached there. A cached value is never replaced.
    pub fn remember(&self, position: Position, args: &[Value], value: Value) {
        let mut table = self.table();
        let slot = table.by_position.entry(position).or_default();
        if !slot.iter().any(|(cached, _)| args_equal(cached, args)) {
            slot.push((args.to_vec(), value));
        }
    }

    /// Returns the first cached value at `position` whose argument list equals `args`.
    pub fn lookup(&self, position: Position, args: &[Value]) -> Option<Value> {
        let table = self.table();
        table
            .by_position
            .get(&position)?
            .iter()
            .find(|(cached, _)| args_equal(cached, args))
            .map(|(_, value)| value.clone())
    }

    /// Total number of cached entries across all positions.
    pub fn len(&self) -> usize {
        self.table().by_position.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.table().by_position.clear();
    }

    /// True when both handles point at the same table.
    pub fn same_as(&self, other: &Memo) -> bool {
        Arc::ptr_eq(&self.table, &other.table)
    }
}
