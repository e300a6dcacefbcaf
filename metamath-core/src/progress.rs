//! Progress reporting for long-running rebuilds.
//!
//! Every rebuild of a database (initial load, or an update after an
//! insertion) is started with [`ProgressTracker::begin`], which hands out a
//! [`BuildTicket`].  Reports are only accepted for the latest ticket of a
//! database, and only when they increase the percentage already reported, so
//! observers see a monotonic sequence per build even when an older build is
//! still running in the background.

use crate::database::DatabaseId;
use crate::util::HashMap;
use log::trace;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Identifies one rebuild of one database.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BuildTicket {
    /// The database being rebuilt.
    pub database: DatabaseId,
    /// Sequence number of the rebuild, per database.
    pub generation: u64,
}

#[derive(Copy, Clone, Debug, Default)]
struct Slot {
    generation: u64,
    percent: u8,
}

type Sink = Box<dyn Fn(DatabaseId, u8) + Send + Sync>;

/// Shared record of the progress of the current rebuild of each database.
#[derive(Default)]
pub struct ProgressTracker {
    slots: Mutex<HashMap<DatabaseId, Slot>>,
    sink: Option<Sink>,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("slots", &self.slots)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl ProgressTracker {
    /// Creates a tracker which is only queried with [`ProgressTracker::status`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker which also pushes every accepted report to `sink`.
    #[must_use]
    pub fn with_sink(sink: impl Fn(DatabaseId, u8) + Send + Sync + 'static) -> Self {
        ProgressTracker {
            slots: Mutex::default(),
            sink: Some(Box::new(sink)),
        }
    }

    fn emit(&self, database: DatabaseId, percent: u8) {
        if let Some(sink) = &self.sink {
            sink(database, percent);
        }
    }

    /// Starts a new rebuild, superseding any rebuild of the same database.
    pub fn begin(&self, database: DatabaseId) -> BuildTicket {
        let generation = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = slots.entry(database).or_default();
            slot.generation += 1;
            slot.percent = 0;
            slot.generation
        };
        self.emit(database, 0);
        BuildTicket {
            database,
            generation,
        }
    }

    /// Returns true if no newer rebuild was started since this ticket.
    #[must_use]
    pub fn is_current(&self, ticket: BuildTicket) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&ticket.database)
            .is_some_and(|slot| slot.generation == ticket.generation)
    }

    /// Reports progress for a rebuild.
    ///
    /// Returns false, and emits nothing, if the ticket was superseded or the
    /// percentage does not exceed the one already reported.
    pub fn report(&self, ticket: BuildTicket, percent: u8) -> bool {
        let percent = percent.min(100);
        {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(slot) = slots.get_mut(&ticket.database) else {
                return false;
            };
            if slot.generation != ticket.generation {
                trace!(
                    "{}: dropping report from superseded build {}",
                    ticket.database,
                    ticket.generation
                );
                return false;
            }
            if percent <= slot.percent {
                return false;
            }
            slot.percent = percent;
        }
        self.emit(ticket.database, percent);
        true
    }

    /// The last accepted percentage for the current rebuild of a database.
    #[must_use]
    pub fn status(&self, database: DatabaseId) -> Option<u8> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(&database).map(|slot| slot.percent)
    }
}

/// A handle passed to database passes to report their progress.
#[derive(Copy, Clone, Debug, Default)]
pub struct Reporter<'a> {
    target: Option<(&'a ProgressTracker, BuildTicket)>,
}

impl<'a> Reporter<'a> {
    /// A reporter which discards all reports.
    #[must_use]
    pub const fn none() -> Self {
        Reporter { target: None }
    }

    /// A reporter for the given rebuild.
    #[must_use]
    pub const fn new(tracker: &'a ProgressTracker, ticket: BuildTicket) -> Self {
        Reporter {
            target: Some((tracker, ticket)),
        }
    }

    /// Reports that `done` out of `total` units of work are done.
    ///
    /// 100% is only reported by [`Reporter::finish`].
    pub fn report(&self, done: usize, total: usize) {
        if let Some((tracker, ticket)) = self.target {
            let percent = (done * 100).checked_div(total).unwrap_or(0).min(99);
            tracker.report(ticket, u8::try_from(percent).unwrap_or(99));
        }
    }

    /// Reports that the rebuild is complete.
    pub fn finish(&self) {
        if let Some((tracker, ticket)) = self.target {
            tracker.report(ticket, 100);
        }
    }
}
