//! Project configuration, read from `tsumiki.json` and `package.json`.

use std::fs;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::context::MenuEntry;
use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "tsumiki.json";
pub const PACKAGE_FILE: &str = "package.json";

/// Directory layout, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Templated sources: pages, scripts, styles, images, fonts.
    pub src: Utf8PathBuf,
    /// Staging area written by the transform stages.
    pub staging: Utf8PathBuf,
    /// Deployable output.
    pub output: Utf8PathBuf,
    /// Files copied verbatim into the output.
    pub public: Utf8PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            src: "src".into(),
            staging: "temp".into(),
            output: "dist".into(),
            public: "public".into(),
        }
    }
}

/// A route prefix that the dev server maps to a directory outside the
/// normal resolution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedRoute {
    pub route: String,
    pub dir: Utf8PathBuf,
}

impl Default for SharedRoute {
    fn default() -> Self {
        Self {
            route: "/node_modules".into(),
            dir: "node_modules".into(),
        }
    }
}

/// How the external script compiler is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EsbuildConfig {
    /// Executable name or path.
    pub program: String,
    /// Output language level for syntax lowering.
    pub target: String,
}

impl Default for EsbuildConfig {
    fn default() -> Self {
        Self {
            program: "esbuild".into(),
            target: "es2015".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP port of the dev server.
    pub port: u16,
    /// Preferred port of the live reload socket.
    pub reload_port: u16,
    pub paths: Paths,
    pub shared: SharedRoute,
    pub esbuild: EsbuildConfig,
    /// Navigation exposed to templates as `menu`.
    pub menu: Vec<MenuEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            reload_port: 35729,
            paths: Paths::default(),
            shared: SharedRoute::default(),
            esbuild: EsbuildConfig::default(),
            menu: Vec::new(),
        }
    }
}

impl Config {
    /// Reads `tsumiki.json` from the project root. A missing file yields the
    /// defaults.
    pub fn load(root: &Utf8Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);

        let config: Config = match read_optional(&path)? {
            Some(text) => serde_json::from_str(&text)
                .map_err(|source| ConfigError::Parse { path, source })?,
            None => Config::default(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let route = self.shared.route.trim_end_matches('/');

        if !route.starts_with('/') || route.is_empty() {
            return Err(ConfigError::SharedRoute(self.shared.route.clone()));
        }

        Ok(())
    }
}

/// Reads `package.json` from the project root as an untyped object. A
/// missing file yields an empty object.
pub fn load_package_metadata(root: &Utf8Path) -> Result<serde_json::Value, ConfigError> {
    let path = root.join(PACKAGE_FILE);

    match read_optional(&path)? {
        Some(text) => {
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
        }
        None => Ok(serde_json::Value::Object(Default::default())),
    }
}

fn read_optional(path: &Utf8Path) -> Result<Option<String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
