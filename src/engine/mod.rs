//! Task composition.
//!
//! A pipeline is a tree of [`Task`]s. Leaves do the actual work, while
//! [`sequential`] and [`parallel`] groups decide when each leaf may start.
//! Tasks carry no dependency lists of their own: a task depends on whatever
//! precedes it in an enclosing `sequential` group.
//!
//! ```rust,no_run
//! use tsumiki::engine::{parallel, sequential, task};
//!
//! let pipeline = sequential([
//!     task("clean", || Ok(())),
//!     parallel([task("pages", || Ok(())), task("styles", || Ok(()))]),
//! ]);
//!
//! pipeline.run()?;
//! # Ok::<(), tsumiki::BuildError>(())
//! ```

mod runner;

use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::BuildError;

#[cfg(feature = "live")]
pub(crate) use runner::watch;

/// Work performed by a leaf task. Returning from the function is the
/// completion signal, so every filesystem effect must be finished by then.
pub type TaskFn = Arc<dyn Fn() -> Result<(), BuildError> + Send + Sync>;

/// A node of the task tree.
pub enum Task {
    /// A named unit of work.
    Leaf {
        name: Cow<'static, str>,
        func: TaskFn,
    },
    /// Members run one after another; a failure skips the rest.
    Sequential(Vec<Task>),
    /// Members run concurrently; the group completes when all of them have.
    Parallel(Vec<Task>),
}

/// Creates a leaf task.
pub fn task<F>(name: impl Into<Cow<'static, str>>, func: F) -> Task
where
    F: Fn() -> Result<(), BuildError> + Send + Sync + 'static,
{
    Task::Leaf {
        name: name.into(),
        func: Arc::new(func),
    }
}

/// Runs each member only after the previous one signalled completion.
pub fn sequential(tasks: impl IntoIterator<Item = Task>) -> Task {
    Task::Sequential(tasks.into_iter().collect())
}

/// Starts every member at once and completes when all of them complete.
///
/// A failing member does not cancel its siblings; they run to completion
/// and the first failure observed is reported.
pub fn parallel(tasks: impl IntoIterator<Item = Task>) -> Task {
    Task::Parallel(tasks.into_iter().collect())
}

impl Task {
    /// Leaf name, or a `series(..)` / `parallel(..)` description for groups.
    pub fn name(&self) -> String {
        match self {
            Task::Leaf { name, .. } => name.to_string(),
            Task::Sequential(tasks) => format!("series({})", names(tasks)),
            Task::Parallel(tasks) => format!("parallel({})", names(tasks)),
        }
    }

    /// Number of leaves in this subtree.
    pub(crate) fn leaves(&self) -> u64 {
        match self {
            Task::Leaf { .. } => 1,
            Task::Sequential(tasks) | Task::Parallel(tasks) => tasks.iter().map(Task::leaves).sum(),
        }
    }
}

fn names(tasks: &[Task]) -> String {
    tasks.iter().map(Task::name).collect::<Vec<_>>().join(", ")
}

impl Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({})", self.name())
    }
}
