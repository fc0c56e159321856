//! Cached virtual environments
//!
//! Environments live under a cache root, one directory per fingerprint of
//! (requirements content, interpreter version). Identical inputs resolve to
//! the same directory, so scripts with the same requirements share one
//! environment and a script's environment is reused across runs.
//!
//! # Coordination
//!
//! Processes coordinate only through the filesystem:
//!
//! - A record file inside the directory says how the environment was built
//!   and is written last, so a directory without a valid record is never used
//! - A zero-byte `<dir>.lock` marker serializes mutations of one environment
//! - Markers left by dead processes are reclaimed by age or process liveness
//!
//! # Environment States
//!
//! | State | Record | Lock | Description |
//! |-------|--------|------|-------------|
//! | Absent | - | - | Never built or garbage collected |
//! | Building | missing/stale | held | Creation or install in progress |
//! | Ready | matches inputs | - | Reused without locking |
//! | Broken | corrupt | - | Crashed build, rebuilt on next use |

pub mod coordinator;
pub mod fingerprint;
pub mod liveness;
pub mod lock;
pub mod store;

pub use coordinator::{CacheCoordinator, EnvLocation, EnvRequest, GcReport, Outcome, ReadyEnv};
pub use fingerprint::Fingerprint;
pub use liveness::{default_probe, NoProbe, ProcScanner, ProcessProbe};
pub use lock::{EnvLock, LockManager, LockSettings};
pub use store::{EnvEntry, EnvRecord, EnvironmentStore, Validity};
