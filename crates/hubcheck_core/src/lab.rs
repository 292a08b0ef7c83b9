//! Deterministic in-process hub.
//!
//! `LabHub` keeps the registration tables and the timer queue of a cooperative scheduler without running any
//! I/O. Timers fire in deadline order whenever the running logical thread reaches a suspension point
//! ([`Hub::yield_once`] or [`Hub::sleep`]). A fired timeout is queued and handed to that thread as an
//! [`Expired`] error.
//!
//! Time is either the real monotonic clock or a virtual clock that `sleep` advances instantly.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::hub::{Expired, Hub, Interest, Listener, ListenerId, TimerId};

const MAIN_THREAD: &str = "main";

enum LabClock {
    Monotonic(Instant),
    Virtual(Cell<Duration>),
}

impl LabClock {
    fn now(&self) -> Duration {
        match self {
            LabClock::Monotonic(start) => start.elapsed(),
            LabClock::Virtual(now) => now.get(),
        }
    }

    fn advance_to(&self, target: Duration) {
        match self {
            LabClock::Monotonic(start) => {
                let now = start.elapsed();
                if target > now {
                    thread::sleep(target - now);
                }
            }
            LabClock::Virtual(now) => {
                if target > now.get() {
                    now.set(target);
                }
            }
        }
    }
}

enum TimerKind {
    Timeout,
    Wakeup,
}

struct PendingTimer {
    deadline: Duration,
    after: Duration,
    kind: TimerKind,
}

#[derive(Default)]
struct LabState {
    next_id: u64,
    listeners: BTreeMap<ListenerId, Listener>,
    timers: BTreeMap<TimerId, PendingTimer>,
    expired: VecDeque<Expired>,
}

impl LabState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Single-threaded reference hub.
pub struct LabHub {
    clock: LabClock,
    current: RefCell<String>,
    state: RefCell<LabState>,
}

impl Default for LabHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LabHub {
    /// Hub driven by the real monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(LabClock::Monotonic(Instant::now()))
    }

    /// Hub driven by a virtual clock; `sleep` advances it without blocking.
    pub fn with_virtual_clock() -> Self {
        Self::with_clock(LabClock::Virtual(Cell::new(Duration::ZERO)))
    }

    fn with_clock(clock: LabClock) -> Self {
        Self {
            clock,
            current: RefCell::new(MAIN_THREAD.to_string()),
            state: RefCell::new(LabState::default()),
        }
    }

    /// Time elapsed on the hub clock since creation.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Name of the logical thread currently running.
    pub fn current_thread(&self) -> String {
        self.current.borrow().clone()
    }

    /// Switch the running logical thread. New registrations are owned by it.
    pub fn set_current_thread(&self, name: impl Into<String>) {
        *self.current.borrow_mut() = name.into();
    }

    pub fn add_reader(&self, fileno: i32, callback: Option<&str>) -> ListenerId {
        self.add_listener(Interest::Read, fileno, callback)
    }

    pub fn add_writer(&self, fileno: i32, callback: Option<&str>) -> ListenerId {
        self.add_listener(Interest::Write, fileno, callback)
    }

    fn add_listener(&self, interest: Interest, fileno: i32, callback: Option<&str>) -> ListenerId {
        let owner = self.current_thread();
        let mut state = self.state.borrow_mut();
        let id = ListenerId(state.next_id());
        debug!(%id, fileno, %interest, owner = %owner, "listener registered");
        state.listeners.insert(
            id,
            Listener {
                id,
                interest,
                fileno,
                owner,
                callback: callback.map(str::to_string),
            },
        );
        id
    }

    /// Remove a reader or writer. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.state.borrow_mut().listeners.remove(&id).is_some()
    }

    /// Schedule a plain wake-up timer (counts as a pending timer, delivers nothing).
    pub fn schedule_wakeup(&self, after: Duration) -> TimerId {
        self.schedule(after, TimerKind::Wakeup)
    }

    fn schedule(&self, after: Duration, kind: TimerKind) -> TimerId {
        let deadline = self.clock.now() + after;
        let mut state = self.state.borrow_mut();
        let id = TimerId(state.next_id());
        state.timers.insert(id, PendingTimer { deadline, after, kind });
        id
    }

    fn next_deadline(&self) -> Option<Duration> {
        self.state.borrow().timers.values().map(|t| t.deadline).min()
    }

    /// Fire every timer whose deadline has passed, earliest first.
    fn fire_due(&self) {
        let now = self.clock.now();
        let mut state = self.state.borrow_mut();
        let mut due: Vec<(Duration, TimerId)> = state
            .timers
            .iter()
            .filter(|(_, t)| t.deadline <= now)
            .map(|(id, t)| (t.deadline, *id))
            .collect();
        due.sort();

        for (_, id) in due {
            let Some(timer) = state.timers.remove(&id) else {
                continue;
            };
            debug!(timer = %id, "timer fired");
            if let TimerKind::Timeout = timer.kind {
                state.expired.push_back(Expired {
                    timer: id,
                    after: timer.after,
                });
            }
        }
    }

    fn deliver(&self) -> Result<(), Expired> {
        match self.state.borrow_mut().expired.pop_front() {
            Some(expired) => Err(expired),
            None => Ok(()),
        }
    }
}

impl Hub for LabHub {
    fn name(&self) -> &str {
        "lab"
    }

    fn readers(&self) -> Vec<Listener> {
        self.state
            .borrow()
            .listeners
            .values()
            .filter(|l| l.interest == Interest::Read)
            .cloned()
            .collect()
    }

    fn writers(&self) -> Vec<Listener> {
        self.state
            .borrow()
            .listeners
            .values()
            .filter(|l| l.interest == Interest::Write)
            .cloned()
            .collect()
    }

    fn timers_count(&self) -> usize {
        self.state.borrow().timers.len()
    }

    fn schedule_timeout(&self, after: Duration) -> TimerId {
        let id = self.schedule(after, TimerKind::Timeout);
        debug!(timer = %id, ?after, "timeout scheduled");
        id
    }

    fn cancel_timer(&self, timer: TimerId) -> bool {
        let mut state = self.state.borrow_mut();
        // A fired timeout that has not been delivered yet must not surface after cancel.
        state.expired.retain(|e| e.timer != timer);
        let removed = state.timers.remove(&timer).is_some();
        debug!(%timer, removed, "timer canceled");
        removed
    }

    fn yield_once(&self) -> Result<(), Expired> {
        self.fire_due();
        self.deliver()
    }

    fn sleep(&self, duration: Duration) -> Result<(), Expired> {
        let target = self.clock.now() + duration;
        loop {
            self.fire_due();
            self.deliver()?;
            match self.next_deadline().filter(|deadline| *deadline < target) {
                Some(deadline) => self.clock.advance_to(deadline),
                None => {
                    self.clock.advance_to(target);
                    self.fire_due();
                    return self.deliver();
                }
            }
        }
    }
}
