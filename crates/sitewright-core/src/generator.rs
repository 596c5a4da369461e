//! Site generator capability and its process adapter.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::BuildError;

/// Result of one generator invocation.
#[derive(Debug, Clone)]
pub struct GeneratorOutput {
    /// Exit code (0 = success, -1 when terminated by a signal).
    pub exit_code: i32,

    /// Combined stdout and stderr.
    pub output: String,

    /// Wall-clock time of the invocation.
    pub duration: Duration,
}

impl GeneratorOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Renders a source checkout into a destination directory.
#[async_trait]
pub trait SiteGenerator: Send + Sync {
    /// Run the generator from `source` writing into `destination`.
    ///
    /// A non-zero exit is reported through [`GeneratorOutput::exit_code`];
    /// `Err` is reserved for failing to run the generator at all.
    async fn render(
        &self,
        source: &Path,
        destination: &Path,
        args: &[String],
    ) -> Result<GeneratorOutput, BuildError>;
}

/// [`SiteGenerator`] that shells out to `<program> --destination <dir> <args...>`.
#[derive(Debug, Clone)]
pub struct GeneratorCli {
    program: PathBuf,
}

impl Default for GeneratorCli {
    fn default() -> Self {
        Self::new("hugo")
    }
}

impl GeneratorCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl SiteGenerator for GeneratorCli {
    async fn render(
        &self,
        source: &Path,
        destination: &Path,
        args: &[String],
    ) -> Result<GeneratorOutput, BuildError> {
        let start = Instant::now();

        let output = Command::new(&self.program)
            .arg("--destination")
            .arg(destination)
            .args(args)
            .current_dir(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BuildError::Spawn {
                program: self.program.display().to_string(),
                source: e,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(GeneratorOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
            duration: start.elapsed(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-hugo.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_render_passes_destination_and_args() {
        let tools = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        // $2 is the destination, the rest are the configured args.
        let script = write_script(
            tools.path(),
            r#"[ "$1" = "--destination" ] || exit 3
echo "$3 $4" > "$2/args.txt"
pwd > "$2/cwd.txt"
echo rendered
echo warning >&2"#,
        );

        let result = GeneratorCli::new(script)
            .render(
                source.path(),
                dest.path(),
                &["--minify".to_string(), "--gc".to_string()],
            )
            .await
            .unwrap();

        assert!(result.success(), "output: {}", result.output);
        assert!(result.output.contains("rendered"));
        assert!(result.output.contains("warning"));
        let args = std::fs::read_to_string(dest.path().join("args.txt")).unwrap();
        assert_eq!(args.trim(), "--minify --gc");
        let cwd = std::fs::read_to_string(dest.path().join("cwd.txt")).unwrap();
        assert_eq!(
            std::fs::canonicalize(cwd.trim()).unwrap(),
            std::fs::canonicalize(source.path()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_render_reports_nonzero_exit() {
        let tools = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let script = write_script(tools.path(), "echo 'Error: bad template' >&2\nexit 2");

        let result = GeneratorCli::new(script)
            .render(tools.path(), dest.path(), &[])
            .await
            .unwrap();

        assert!(!result.success());
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("bad template"));
    }

    #[tokio::test]
    async fn test_missing_generator_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = GeneratorCli::new("/nonexistent/hugo")
            .render(dir.path(), dir.path(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }
}
