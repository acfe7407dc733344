use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Errors produced while loading `tsumiki.json` and `package.json`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read '{path}'.\n{source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't parse '{path}'.\n{source}")]
    Parse {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },

    #[error("Project root is not valid UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Shared route '{0}' must start with '/' and can't be the site root")]
    SharedRoute(String),
}

/// Every failure that can surface through a task's completion signal.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Missing or unreadable path, permission failure.
    #[error("Filesystem error at '{path}'.\n{source}")]
    FileSystem {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    /// Template rendering, transpilation or style compilation failed for
    /// one asset.
    #[error("Stage '{stage}' failed on '{path}'.\n{cause:#}")]
    Transform {
        stage: &'static str,
        path: Utf8PathBuf,
        cause: anyhow::Error,
    },

    /// A reference block names a member that exists in none of the search
    /// roots.
    #[error(
        "Reference block '{bundle}' in '{page}' lists '{member}', which doesn't exist (searched {}).",
        join(.searched)
    )]
    ReferenceResolution {
        page: Utf8PathBuf,
        bundle: String,
        member: String,
        searched: Vec<Utf8PathBuf>,
    },

    /// A sequential group stopped early because one of its members failed.
    #[error("Group '{group}' aborted, skipped [{}].\n{source}", .skipped.join(", "))]
    Aborted {
        group: String,
        skipped: Vec<String>,
        source: Box<BuildError>,
    },

    /// A leaf task failed.
    #[error("Task '{name}':\n{source}")]
    Task {
        name: String,
        source: Box<BuildError>,
    },

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[cfg(feature = "live")]
    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),
}

impl BuildError {
    pub(crate) fn fs(path: impl AsRef<Utf8Path>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn transform(
        stage: &'static str,
        path: impl AsRef<Utf8Path>,
        cause: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Transform {
            stage,
            path: path.as_ref().to_path_buf(),
            cause: cause.into(),
        }
    }

    /// Peels off task and composition wrappers to reach the error that
    /// actually stopped the pipeline.
    pub fn root_cause(&self) -> &BuildError {
        match self {
            BuildError::Aborted { source, .. } | BuildError::Task { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

fn join(paths: &[Utf8PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error("HTTP server stopped unexpectedly.\n{0}")]
    Server(String),
}
