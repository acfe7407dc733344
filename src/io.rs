use std::fmt::Display;
use std::fs;
use std::io::ErrorKind;
use std::sync::LazyLock;
use std::time::Instant;

use camino::Utf8Path;
use console::Style;
use indicatif::ProgressStyle;

use crate::error::BuildError;

const ANSI_BLUE: Style = Style::new().blue();

pub(crate) static STYLE_PIPELINE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .expect("Error setting progress bar template")
        .progress_chars("=>-")
});

pub(crate) static STYLE_TASK: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .expect("Error setting progress bar template")
});

pub fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

/// Writes a file, creating every missing parent directory first.
pub(crate) fn write(path: &Utf8Path, data: impl AsRef<[u8]>) -> Result<(), BuildError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| BuildError::fs(dir, e))?;
    }

    fs::write(path, data).map_err(|e| BuildError::fs(path, e))
}

pub(crate) fn read(path: &Utf8Path) -> Result<Vec<u8>, BuildError> {
    fs::read(path).map_err(|e| BuildError::fs(path, e))
}

pub(crate) fn copy(from: &Utf8Path, to: &Utf8Path) -> Result<(), BuildError> {
    if let Some(dir) = to.parent() {
        fs::create_dir_all(dir).map_err(|e| BuildError::fs(dir, e))?;
    }

    fs::copy(from, to).map_err(|e| BuildError::fs(from, e))?;
    Ok(())
}

pub(crate) fn remove_file(path: &Utf8Path) -> Result<(), BuildError> {
    fs::remove_file(path).map_err(|e| BuildError::fs(path, e))
}

/// Removes a directory tree. A directory that doesn't exist is already clean.
pub(crate) fn remove_dir(path: &Utf8Path) -> Result<bool, BuildError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BuildError::fs(path, e)),
    }
}
