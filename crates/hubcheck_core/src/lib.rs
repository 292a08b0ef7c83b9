//! Provide the collaborator interfaces the hubcheck harness drives, plus small reference implementations.
//!
//! The harness never owns a scheduler, a patcher or a worker pool. It talks to them through the traits in this
//! crate:
//! - [`Hub`]: the cooperative scheduler (registered readers/writers, timers, suspension points),
//! - [`Patcher`]: the runtime-patching subsystem (apply a selection, read back what is patched),
//! - [`WorkerPool`]: OS-thread pool used by code under test for blocking calls.
//!
//! ## Notes
//!
//! - [`LabHub`], [`PatchRegistry`] and [`ThreadPool`] are deterministic, dependency-light implementations. They
//!   exist so the harness can be exercised end to end without a production runtime.
//! - Hub state is single-threaded by contract: only one logical thread runs at a time, so [`LabHub`] uses
//!   `RefCell` and is deliberately `!Sync`.

pub mod hub;
pub mod lab;
pub mod patch;
pub mod pool;

pub use hub::{Expired, Hub, Interest, Listener, ListenerId, TimerId};
pub use lab::LabHub;
pub use patch::{DEFAULT_MODULES, PatchError, PatchRegistry, PatchRequest, Patcher};
pub use pool::{PoolError, ThreadPool, WorkerPool, panic_message};
