//! Serialisable view of a history, for debugging and operator tooling.
//!
//! A timeline never carries artifacts themselves (they need not be serialisable), only
//! the kind of each step and a debug rendering of recorded values.

use serde::{Deserialize, Serialize};

use crate::kernel::history::{History, HistoryEntry, Position, Step, StepFactory};
use crate::kernel::interpreter::Status;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Yielded,
    View,
    State,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub position: Position,
    pub kind: StepKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub status: Status,
    pub entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn views(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.kind == StepKind::View)
            .count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub fn run_timeline<A>(history: &History<A>, status: Status) -> Timeline {
    let entries = history
        .iter()
        .enumerate()
        .map(|(position, entry)| match entry {
            HistoryEntry::Step(Step::Yielded(value)) => TimelineEntry {
                position,
                kind: StepKind::Yielded,
                value: Some(format!("{value:?}")),
            },
            HistoryEntry::Step(Step::View(_)) => TimelineEntry {
                position,
                kind: StepKind::View,
                value: None,
            },
            HistoryEntry::Factory(StepFactory::State { value }) => TimelineEntry {
                position,
                kind: StepKind::State,
                value: Some(format!("{value:?}")),
            },
        })
        .collect();
    Timeline { status, entries }
}
