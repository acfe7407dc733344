#[cfg(feature = "server")]
mod http;
#[cfg(feature = "live")]
mod reload;
#[cfg(feature = "live")]
pub(crate) mod watch;

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use tracing::{Level, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::engine::Task;
use crate::error::BuildError;
use crate::io::{STYLE_PIPELINE, STYLE_TASK, as_overhead};

impl Task {
    /// Runs the whole tree and blocks until it completes.
    ///
    /// Progress is reported through a `pipeline` span that counts finished
    /// leaves, with one nested `task` span per running leaf.
    pub fn run(&self) -> Result<(), BuildError> {
        let root_span = tracing::span!(Level::INFO, "pipeline");
        root_span.pb_set_style(&STYLE_PIPELINE);
        root_span.pb_set_length(self.leaves());
        root_span.pb_set_message("Running tasks...");
        let _enter = root_span.enter();

        let start = Instant::now();
        let result = self.execute(&root_span);

        match &result {
            Ok(()) => tracing::info!("finished {} {}", self.name(), as_overhead(start)),
            Err(_) => tracing::error!("{} failed {}", self.name(), as_overhead(start)),
        }

        result
    }

    fn execute(&self, root: &Span) -> Result<(), BuildError> {
        match self {
            Task::Leaf { name, func } => {
                let span = tracing::span!(parent: root, Level::INFO, "task", name = %name);
                span.pb_set_style(&STYLE_TASK);
                span.pb_set_message(&format!("Running {name}"));
                let _enter = span.enter();

                let start = Instant::now();
                let result = func().map_err(|e| BuildError::Task {
                    name: name.to_string(),
                    source: Box::new(e),
                });

                match &result {
                    Ok(()) => tracing::info!("{name} done {}", as_overhead(start)),
                    Err(e) => tracing::error!("{e}"),
                }

                root.pb_inc(1);
                result
            }
            Task::Sequential(tasks) => {
                for (i, task) in tasks.iter().enumerate() {
                    if let Err(e) = task.execute(root) {
                        let skipped: Vec<_> = tasks[i + 1..].iter().map(Task::name).collect();

                        if skipped.is_empty() {
                            return Err(e);
                        }

                        tracing::warn!("skipping {}", skipped.join(", "));
                        return Err(BuildError::Aborted {
                            group: self.name(),
                            skipped,
                            source: Box::new(e),
                        });
                    }
                }

                Ok(())
            }
            Task::Parallel(tasks) => {
                let failure = Mutex::new(None);

                rayon::scope(|s| {
                    for task in tasks {
                        let failure = &failure;
                        s.spawn(move |_| {
                            if let Err(e) = task.execute(root) {
                                let mut failure = failure.lock().unwrap_or_else(PoisonError::into_inner);
                                if failure.is_none() {
                                    *failure = Some(e);
                                }
                            }
                        });
                    }
                });

                match failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }
        }
    }
}
