//! Invocation of the external `esbuild` binary for script lowering and
//! minification.

use std::io::Write;
use std::process::{Command, Stdio};

use camino::Utf8Path;
use thiserror::Error;

use crate::config::EsbuildConfig;

/// Errors that can occur when running Esbuild.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The process couldn't be started or its pipes failed.
    #[error("Couldn't run '{program}': {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },

    /// The Esbuild process returned a non-zero exit code.
    #[error("Esbuild execution failed:\n{0}")]
    Esbuild(String),
}

#[derive(Debug, Clone)]
pub struct Esbuild {
    program: String,
    target: String,
}

impl Esbuild {
    pub fn new(config: &EsbuildConfig) -> Self {
        Self {
            program: config.program.clone(),
            target: config.target.clone(),
        }
    }

    /// Lowers modern syntax to the configured target, one file in, one file
    /// out. Nothing is bundled.
    pub fn transpile(&self, file: &Utf8Path, code: &[u8]) -> Result<Vec<u8>, ScriptError> {
        self.run(
            &[
                "--loader=js".to_string(),
                format!("--target={}", self.target),
                format!("--sourcefile={file}"),
            ],
            code,
        )
    }

    /// Minifies whitespace, syntax and dead code while keeping top-level
    /// identifiers intact, so concatenated files still see each other.
    pub fn minify(&self, code: &[u8]) -> Result<Vec<u8>, ScriptError> {
        if code.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        self.run(
            &[
                "--loader=js".to_string(),
                format!("--target={}", self.target),
                "--minify-whitespace".to_string(),
                "--minify-syntax".to_string(),
            ],
            code,
        )
    }

    fn run(&self, args: &[String], input: &[u8]) -> Result<Vec<u8>, ScriptError> {
        let io_error = |source| ScriptError::Io {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(io_error)?;

        // Feed stdin from a separate thread so a full stdout pipe can't
        // deadlock the child.
        let mut stdin = child.stdin.take().ok_or_else(|| {
            io_error(std::io::Error::other("stdin not captured"))
        })?;
        let input = input.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child.wait_with_output().map_err(io_error)?;
        let written = writer.join();

        // a compiler that bails out early may close stdin before reading
        // all of it, its own diagnostic is the useful one
        if !output.status.success() {
            return Err(ScriptError::Esbuild(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        match written {
            Ok(result) => result.map_err(io_error)?,
            Err(_) => return Err(io_error(std::io::Error::other("stdin writer panicked"))),
        }

        Ok(output.stdout)
    }
}

/// Writes a stand-in `esbuild` that echoes its input, so tests don't need
/// the real binary.
#[cfg(all(test, unix))]
pub(crate) fn stub(dir: &Utf8Path) -> EsbuildConfig {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("esbuild-stub.sh");
    std::fs::write(&path, "#!/bin/sh\nexec cat\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

    EsbuildConfig {
        program: path.into_string(),
        target: "es2015".into(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn stub_round_trips_through_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let esbuild = Esbuild::new(&stub(dir));

        let big = "let a = 1;\n".repeat(50_000);
        let out = esbuild.transpile(Utf8Path::new("a.js"), big.as_bytes()).unwrap();
        assert_eq!(out, big.as_bytes());
    }

    #[test]
    fn blank_input_skips_minifier() {
        let esbuild = Esbuild::new(&EsbuildConfig {
            program: "/definitely/not/here".into(),
            target: "es2015".into(),
        });

        assert!(esbuild.minify(b"  \n").unwrap().is_empty());
    }

    #[test]
    fn missing_binary_is_reported() {
        let esbuild = Esbuild::new(&EsbuildConfig {
            program: "/definitely/not/here".into(),
            target: "es2015".into(),
        });

        assert!(matches!(
            esbuild.minify(b"let a = 1;"),
            Err(ScriptError::Io { .. })
        ));
    }

    #[test]
    fn failing_binary_reports_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.sh");
        std::fs::write(&path, "#!/bin/sh\necho 'Unexpected \"}\"' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let esbuild = Esbuild::new(&EsbuildConfig {
            program: path.to_str().unwrap().into(),
            target: "es2015".into(),
        });

        match esbuild.transpile(Utf8Path::new("a.js"), b"}") {
            Err(ScriptError::Esbuild(stderr)) => assert!(stderr.contains("Unexpected")),
            other => panic!("expected esbuild failure, got {other:?}"),
        }
    }
}
