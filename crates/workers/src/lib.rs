//! Worker lifecycle supervision for deskhive.
//!
//! Owns the fixed set of conversational workers: starts them on demand,
//! watches for crashes, restarts with exponential backoff, and gives up
//! after a bounded run of rapid failures. Start and crash paths are
//! serialized per role through keyed locks so concurrent commands cannot
//! double-start a worker or double-schedule a restart.

pub mod lock;
pub mod supervisor;

pub use lock::KeyedLock;
pub use supervisor::{RestartPolicy, WorkerSupervisor};
