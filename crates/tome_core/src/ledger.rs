use std::collections::BTreeMap;

use tome_logging::tome_warn;

use crate::{ChapterId, Work};

/// Lifecycle of one chapter within a run.
///
/// `Pending -> InFlight -> (Done | Requeued)`; requeued chapters become
/// eligible again only when the next pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterState {
    Pending,
    InFlight,
    Done,
    Requeued,
}

/// What one pass achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassReport {
    pub pass: u32,
    pub completed: usize,
    pub requeued: usize,
    /// Chapters of the pass that never returned a result (interrupted run).
    pub abandoned: usize,
}

impl PassReport {
    pub fn made_progress(&self) -> bool {
        self.completed > 0
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Chapters present in the output at the end of the run.
    pub completed: usize,
    /// Chapters fetched successfully during this run.
    pub fetched: usize,
    /// Chapters given up on after a pass made no progress.
    pub permanently_failed: Vec<ChapterId>,
    /// Chapters left untouched because the run was interrupted.
    pub remaining: Vec<ChapterId>,
    pub interrupted: bool,
    pub passes: u32,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.permanently_failed.is_empty() && self.remaining.is_empty() && !self.interrupted
    }
}

/// Pure bookkeeping of chapter states across passes.
#[derive(Debug, Clone)]
pub struct ChapterLedger {
    states: BTreeMap<usize, ChapterState>,
    ids: BTreeMap<usize, ChapterId>,
    pass: u32,
    pass_completed: usize,
    fetched: usize,
}

impl ChapterLedger {
    /// Chapters for which `is_done` holds start out `Done`, all others `Pending`.
    pub fn new(work: &Work, is_done: impl Fn(&crate::Chapter) -> bool) -> Self {
        let mut states = BTreeMap::new();
        let mut ids = BTreeMap::new();
        for chapter in work.chapters() {
            let state = if is_done(chapter) {
                ChapterState::Done
            } else {
                ChapterState::Pending
            };
            states.insert(chapter.index, state);
            ids.insert(chapter.index, chapter.id.clone());
        }
        Self {
            states,
            ids,
            pass: 0,
            pass_completed: 0,
            fetched: 0,
        }
    }

    pub fn state(&self, index: usize) -> Option<ChapterState> {
        self.states.get(&index).copied()
    }

    pub fn pass(&self) -> u32 {
        self.pass
    }

    /// Indexes eligible for the next pass, ascending.
    pub fn pending(&self) -> Vec<usize> {
        self.indexes_in(|state| matches!(state, ChapterState::Pending | ChapterState::Requeued))
    }

    pub fn done_count(&self) -> usize {
        self.indexes_in(|state| state == ChapterState::Done).len()
    }

    pub fn is_finished(&self) -> bool {
        self.pending().is_empty()
    }

    /// Starts a pass: every eligible chapter moves to `InFlight` and its index
    /// is returned in ascending order.
    pub fn begin_pass(&mut self) -> Vec<usize> {
        let batch = self.pending();
        for index in &batch {
            self.states.insert(*index, ChapterState::InFlight);
        }
        self.pass += 1;
        self.pass_completed = 0;
        batch
    }

    /// Applies the result of one fetch. Results for chapters that are not in
    /// flight are ignored and reported as `false`.
    pub fn complete(&mut self, index: usize, success: bool) -> bool {
        match self.states.get_mut(&index) {
            Some(state) if *state == ChapterState::InFlight => {
                if success {
                    *state = ChapterState::Done;
                    self.pass_completed += 1;
                    self.fetched += 1;
                } else {
                    *state = ChapterState::Requeued;
                }
                true
            }
            Some(state) => {
                tome_warn!(
                    "Ignoring result for chapter {} in state {:?}",
                    index,
                    state
                );
                false
            }
            None => {
                tome_warn!("Ignoring result for unknown chapter {}", index);
                false
            }
        }
    }

    /// Closes the current pass. Chapters still in flight never reported back
    /// and return to `Pending` without counting as failures.
    pub fn end_pass(&mut self) -> PassReport {
        let mut report = PassReport {
            pass: self.pass,
            completed: self.pass_completed,
            ..PassReport::default()
        };
        for state in self.states.values_mut() {
            match state {
                ChapterState::InFlight => {
                    *state = ChapterState::Pending;
                    report.abandoned += 1;
                }
                ChapterState::Requeued => report.requeued += 1,
                _ => {}
            }
        }
        report
    }

    /// Chapters still eligible are reported as permanently failed, or as
    /// remaining when the run was interrupted.
    pub fn summarize(&self, interrupted: bool) -> RunSummary {
        let leftover: Vec<ChapterId> = self
            .pending()
            .into_iter()
            .filter_map(|index| self.ids.get(&index).cloned())
            .collect();
        let (permanently_failed, remaining) = if interrupted {
            (Vec::new(), leftover)
        } else {
            (leftover, Vec::new())
        };
        RunSummary {
            completed: self.done_count(),
            fetched: self.fetched,
            permanently_failed,
            remaining,
            interrupted,
            passes: self.pass,
        }
    }

    fn indexes_in(&self, pred: impl Fn(ChapterState) -> bool) -> Vec<usize> {
        self.states
            .iter()
            .filter(|(_, state)| pred(**state))
            .map(|(index, _)| *index)
            .collect()
    }
}
