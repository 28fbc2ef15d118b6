//! Background loading of pipeline data.
//!
//! [`BackgroundExecutor`] runs cancellable work and hands out
//! [`PendingOperation`] handles; [`FileSource`] builds its load state
//! machine on top of them; [`TaskManager`] tracks what is running.

mod file_source;
mod task;
mod task_manager;

pub use file_source::{FileSource, LoadResult, SourceContext, SourceState};
pub use task::{BackgroundExecutor, Outcome, PendingOperation, TaskContext, TaskProgress};
pub use task_manager::TaskManager;
