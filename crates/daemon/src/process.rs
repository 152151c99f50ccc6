//! Process runner for external tools.
//!
//! Launches a program from an argument vector (never through a shell) and
//! hands back a handle that can be awaited for the exit status or killed.
//! Output is discarded; callers only get the exit status.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// Boxed future returned by [`ProcessHandle`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited normally with this code.
    Code(i32),
    /// Terminated by a signal.
    Signaled,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        matches!(self, ProcessExit::Code(0))
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ProcessExit::Code(code),
            None => ProcessExit::Signaled,
        }
    }
}

impl std::fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessExit::Code(code) => write!(f, "exit code {}", code),
            ProcessExit::Signaled => write!(f, "terminated by signal"),
        }
    }
}

/// A running process.
pub trait ProcessHandle: Send {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit.
    fn wait(&mut self) -> BoxFuture<'_, io::Result<ProcessExit>>;

    /// Forcefully terminate the process and reap it.
    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

/// Starts external processes.
pub trait ProcessRunner: Send + Sync {
    fn launch(&self, program: &Path, args: &[OsString]) -> io::Result<Box<dyn ProcessHandle>>;
}

/// Runner backed by `tokio::process`, so waiting never blocks a runtime thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    fn launch(&self, program: &Path, args: &[OsString]) -> io::Result<Box<dyn ProcessHandle>> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(Box::new(ChildHandle { child }))
    }
}

struct ChildHandle {
    child: Child,
}

impl ProcessHandle for ChildHandle {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<ProcessExit>> {
        Box::pin(async move { self.child.wait().await.map(ProcessExit::from) })
    }

    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(self.child.kill())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[tokio::test]
    async fn test_exit_code_zero() {
        let mut handle = TokioProcessRunner
            .launch(Path::new("sh"), &args(&["-c", "exit 0"]))
            .unwrap();
        let exit = handle.wait().await.unwrap();
        assert_eq!(exit, ProcessExit::Code(0));
        assert!(exit.success());
    }

    #[tokio::test]
    async fn test_nonzero_exit_code() {
        let mut handle = TokioProcessRunner
            .launch(Path::new("sh"), &args(&["-c", "exit 3"]))
            .unwrap();
        let exit = handle.wait().await.unwrap();
        assert_eq!(exit, ProcessExit::Code(3));
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_launch() {
        let result = TokioProcessRunner.launch(
            Path::new("/nonexistent/bin/hevc-sweep-no-such-tool"),
            &args(&["-version"]),
        );
        match result {
            Err(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            Ok(_) => panic!("launch of a missing program should fail"),
        }
    }

    #[tokio::test]
    async fn test_kill_running_process() {
        let mut handle = TokioProcessRunner
            .launch(Path::new("sleep"), &args(&["30"]))
            .unwrap();
        assert!(handle.id().is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.kill().await.unwrap();
        let exit = handle.wait().await.unwrap();
        assert_eq!(exit, ProcessExit::Signaled);
    }

    // Arguments reach the program verbatim: quotes, spaces and `$(...)`
    // are never interpreted.
    #[tokio::test]
    async fn test_arguments_are_not_shell_interpreted() {
        let dir = TempDir::new().unwrap();
        let tricky = dir.path().join("Film \"Cut\" $(rm -rf x) ; echo.mkv");
        std::fs::write(&tricky, b"x").unwrap();

        let mut handle = TokioProcessRunner
            .launch(
                Path::new("test"),
                &[OsString::from("-e"), tricky.clone().into_os_string()],
            )
            .unwrap();
        assert_eq!(handle.wait().await.unwrap(), ProcessExit::Code(0));
        assert!(tricky.exists());
    }

    #[test]
    fn test_process_exit_display() {
        assert_eq!(ProcessExit::Code(1).to_string(), "exit code 1");
        assert_eq!(ProcessExit::Signaled.to_string(), "terminated by signal");
    }
}
