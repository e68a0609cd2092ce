//! Screen control through the external screen-switch utility.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_SCREEN_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait ScreenControl: Send + Sync {
    async fn list(&self) -> Result<Vec<String>>;
    async fn switch(&self, screen_id: &str) -> Result<String>;
    async fn reload(&self, screen_id: &str) -> Result<String>;
}

/// Runs `<path> list`, `<path> switch <id>` and `<path> reload <id>`.
#[derive(Debug, Clone)]
pub struct ScriptScreenControl {
    path: PathBuf,
    timeout: Duration,
}

impl ScriptScreenControl {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: DEFAULT_SCREEN_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(path = %self.path.display(), ?args, "[Screen] Running utility");

        let child = Command::new(&self.path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", self.path.display()))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| format!("screen utility timed out after {:?}", self.timeout))?
            .context("failed to wait for screen utility")?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() { stdout } else { stderr };
            bail!("screen utility exited with {}: {}", output.status, detail);
        }
        Ok(stdout)
    }
}

#[async_trait]
impl ScreenControl for ScriptScreenControl {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(parse_screen_list(&self.run(&["list"]).await?))
    }

    async fn switch(&self, screen_id: &str) -> Result<String> {
        self.run(&["switch", screen_id]).await
    }

    async fn reload(&self, screen_id: &str) -> Result<String> {
        self.run(&["reload", screen_id]).await
    }
}

/// One screen per non-empty line.
pub fn parse_screen_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_non_empty_trimmed_lines() {
        let screens = parse_screen_list("  HDMI-1 \n\nDP-2\n   \n");
        assert_eq!(screens, vec!["HDMI-1", "DP-2"]);
    }

    #[cfg(unix)]
    fn write_script(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("screen-switch");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_utility_with_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            r#"if [ "$1" = "list" ]; then printf 'one\ntwo\n'; else echo "$1 $2"; fi"#,
        );
        let control = ScriptScreenControl::new(script);

        assert_eq!(control.list().await.unwrap(), vec!["one", "two"]);
        assert_eq!(control.switch("7").await.unwrap(), "switch 7");
        assert_eq!(control.reload("7").await.unwrap(), "reload 7");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_utility_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo 'no such screen' >&2; exit 3");
        let err = ScriptScreenControl::new(script)
            .switch("9")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no such screen"));
    }

    #[tokio::test]
    async fn missing_utility_is_an_error() {
        let control = ScriptScreenControl::new("/nonexistent/screen-switch");
        assert!(control.list().await.is_err());
    }
}
