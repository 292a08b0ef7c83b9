//! Post-test hub leak detection.
//!
//! After a test the hub must hold no readers, no writers and no pending timers. Anything left over means a
//! logical thread was never completed or never canceled, which is a defect in the code under test. There is
//! no allowance for expected leaks.

use std::fmt;

use hubcheck_core::{Hub, Listener};
use tracing::debug;

use super::errors::{HarnessError, HarnessResult};

/// Registration tables of a hub read at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub readers: Vec<Listener>,
    pub writers: Vec<Listener>,
    pub timers: usize,
}

impl SchedulerSnapshot {
    pub fn capture<H: Hub + ?Sized>(hub: &H) -> Self {
        Self {
            readers: hub.readers(),
            writers: hub.writers(),
            timers: hub.timers_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty() && self.writers.is_empty() && self.timers == 0
    }
}

fn join_listeners(listeners: &[Listener]) -> String {
    listeners.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for SchedulerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Readers: {} ({}) Writers: {} ({}) Timers: {}",
            join_listeners(&self.readers),
            self.readers.len(),
            join_listeners(&self.writers),
            self.writers.len(),
            self.timers
        )
    }
}

/// Fail with [`HarnessError::SchedulerLeakDetected`] unless the hub is empty.
pub fn verify_hub_empty<H: Hub + ?Sized>(hub: &H) -> HarnessResult<()> {
    let snapshot = SchedulerSnapshot::capture(hub);
    debug!(
        readers = snapshot.readers.len(),
        writers = snapshot.writers.len(),
        timers = snapshot.timers,
        "hub snapshot"
    );
    if snapshot.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::SchedulerLeakDetected(snapshot))
    }
}
