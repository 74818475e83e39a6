//! # Runtime Boundary
//!
//! The capability traits the engine consumes from the outside world (process
//! management and remote task handles) plus the connection/property
//! synchronization layer that talks through them.
//!
//! All polls are non-blocking: long-running work returns a handle immediately
//! and is re-checked once per reconciliation cycle, never mid-cycle.

pub mod process;
pub mod remote_task;
pub mod sync;

pub use process::{ExitStatus, ProcessError, ProcessHandle, ProcessManager, ProcessResult};
pub use remote_task::{RemoteTask, SyncError, SyncResult};
pub use sync::{apply_connection, commit_properties, pending_properties, remove_connection};
