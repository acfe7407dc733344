#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod asset;
mod clean;
pub mod config;
pub mod context;
pub mod copy;
pub mod engine;
mod error;
pub mod esbuild;
mod io;
#[cfg(feature = "logging")]
pub mod logging;
pub mod optimize;
pub mod pipeline;
pub mod transform;

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use console::style;

pub use crate::clean::clean;
pub use crate::config::Config;
pub use crate::context::{BuildContext, Environment, MenuEntry, Mode};
pub use crate::error::*;

/// A project on disk together with everything read from it at startup.
///
/// All directories in [`Config::paths`] are resolved against `root`. The
/// context is fixed for the lifetime of the value, so every page rendered
/// from one `Website` sees the same menu, metadata and timestamp.
#[derive(Debug, Clone)]
pub struct Website {
    pub root: Utf8PathBuf,
    pub config: Config,
    pub context: BuildContext,
}

impl Website {
    /// Loads `tsumiki.json` and `package.json` from `root`.
    pub fn open(root: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let root = root
            .as_ref()
            .canonicalize_utf8()
            .map_err(|source| ConfigError::Read {
                path: root.as_ref().to_path_buf(),
                source,
            })?;

        let config = Config::load(&root)?;
        let metadata = config::load_package_metadata(&root)?;
        let context = BuildContext::new(config.menu.clone(), metadata, Local::now());

        Ok(Self::new(root, config, context))
    }

    pub fn new(root: impl Into<Utf8PathBuf>, config: Config, context: BuildContext) -> Self {
        Self {
            root: root.into(),
            config,
            context,
        }
    }

    pub fn source(&self) -> Utf8PathBuf {
        self.root.join(&self.config.paths.src)
    }

    pub fn staging(&self) -> Utf8PathBuf {
        self.root.join(&self.config.paths.staging)
    }

    pub fn output(&self) -> Utf8PathBuf {
        self.root.join(&self.config.paths.output)
    }

    pub fn public(&self) -> Utf8PathBuf {
        self.root.join(&self.config.paths.public)
    }

    /// Directory served under [`config::SharedRoute::route`] by the dev
    /// server, and searched by the optimizer through the project root.
    pub fn shared(&self) -> Utf8PathBuf {
        self.root.join(&self.config.shared.dir)
    }

    /// Produces the deployable output tree.
    pub fn build(self) -> Result<(), BuildError> {
        eprintln!(
            "Running {} in {} mode.",
            style("Tsumiki").red(),
            style("build").blue()
        );

        pipeline::build(&Arc::new(self)).run()
    }

    /// Compiles into staging, then serves it with live reload until
    /// interrupted.
    #[cfg(feature = "live")]
    pub fn dev(self) -> Result<(), BuildError> {
        eprintln!(
            "Running {} in {} mode.",
            style("Tsumiki").red(),
            style("dev").blue()
        );

        let socket = engine::watch::reserve_port(self.config.reload_port)?;
        pipeline::dev(&Arc::new(self), Arc::new(socket)).run()
    }
}
