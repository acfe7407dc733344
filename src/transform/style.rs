use grass::{Options, OutputStyle};
use thiserror::Error;

use crate::asset::Asset;
use crate::transform::Transform;

/// Errors that can occur when compiling Stylesheets.
#[derive(Debug, Error)]
pub enum StyleError {
    /// A Sass compilation error occurred.
    #[error("Sass compilation error: {0}")]
    Sass(#[from] Box<grass::Error>),

    /// The stylesheet isn't valid UTF-8.
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Compiles Sass/SCSS to readable CSS and renames the file to `.css`.
///
/// Imports are resolved relative to the stylesheet's own directory.
pub struct CompileSass;

impl CompileSass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CompileSass {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for CompileSass {
    fn apply(&self, mut asset: Asset) -> anyhow::Result<Asset> {
        let mut options = Options::default().style(OutputStyle::Expanded);
        if let Some(dir) = asset.source.parent() {
            options = options.load_path(dir.as_std_path());
        }

        let source = std::str::from_utf8(&asset.content).map_err(StyleError::Utf8)?;
        let css = grass::from_string(source, &options).map_err(StyleError::Sass)?;

        asset.content = css.into_bytes();
        asset.relative.set_extension("css");
        Ok(asset)
    }
}

/// Minifies plain CSS. Any valid CSS is valid SCSS, so the compiler doubles
/// as the minifier.
pub(crate) fn compress(css: &str) -> Result<String, StyleError> {
    let options = Options::default().style(OutputStyle::Compressed);
    Ok(grass::from_string(css, &options)?)
}
