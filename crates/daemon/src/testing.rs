//! Scripted process runner used by the orchestrator and scan tests.
//!
//! Stands in for FFmpeg: on launch it optionally writes the output file
//! (the last argument) and then reports a scripted exit.

use crate::guard::TranscodeGuard;
use crate::process::{BoxFuture, ProcessExit, ProcessHandle, ProcessRunner};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Behaviour of one fake encoder run.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Exit with `code`, writing the output file first if asked to.
    Exit { code: i32, write_output: bool },
    /// Fail to start, as if the binary were missing.
    LaunchError,
    /// Never exit until killed.
    Hang { write_output: bool },
    /// Never exit, and refuse to be killed.
    Unkillable { write_output: bool },
}

impl Script {
    pub(crate) fn succeed() -> Self {
        Script::Exit {
            code: 0,
            write_output: true,
        }
    }
}

/// One recorded launch.
#[derive(Debug, Clone)]
pub(crate) struct Launch {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Whether the input path was claimed at launch time.
    pub source_claimed: bool,
}

pub(crate) struct ScriptedRunner {
    default: Script,
    scripts: Mutex<HashMap<PathBuf, Script>>,
    launches: Mutex<Vec<Launch>>,
    kills: Arc<AtomicUsize>,
    guard: Option<TranscodeGuard>,
}

impl ScriptedRunner {
    pub(crate) fn with_default(default: Script) -> Self {
        Self {
            default,
            scripts: Mutex::new(HashMap::new()),
            launches: Mutex::new(Vec::new()),
            kills: Arc::new(AtomicUsize::new(0)),
            guard: None,
        }
    }

    /// Record claim state of each input at launch time.
    pub(crate) fn observe_guard(mut self, guard: TranscodeGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Override the behaviour for one input path.
    pub(crate) fn script<P: Into<PathBuf>>(&self, input: P, script: Script) {
        self.scripts.lock().unwrap().insert(input.into(), script);
    }

    pub(crate) fn launches(&self) -> Vec<Launch> {
        self.launches.lock().unwrap().clone()
    }

    pub(crate) fn launched_inputs(&self) -> Vec<PathBuf> {
        self.launches()
            .iter()
            .filter_map(|l| l.args.get(1).map(PathBuf::from))
            .collect()
    }

    pub(crate) fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

impl ProcessRunner for ScriptedRunner {
    fn launch(&self, program: &Path, args: &[OsString]) -> io::Result<Box<dyn ProcessHandle>> {
        let input = args.get(1).map(PathBuf::from).unwrap_or_default();
        let output = args.last().map(PathBuf::from).unwrap_or_default();

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&input)
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        self.launches.lock().unwrap().push(Launch {
            program: program.to_path_buf(),
            args: args.to_vec(),
            source_claimed: self.guard.as_ref().map_or(false, |g| g.is_claimed(&input)),
        });

        let (exit, write_output) = match script {
            Script::LaunchError => {
                return Err(io::Error::new(io::ErrorKind::NotFound, "ffmpeg: not found"))
            }
            Script::Exit { code, write_output } => (Some(ProcessExit::Code(code)), write_output),
            Script::Hang { write_output } => (None, write_output),
            Script::Unkillable { write_output } => (None, write_output),
        };
        let killable = !matches!(script, Script::Unkillable { .. });

        if write_output {
            fs::write(&output, b"h264 bytes")?;
        }

        Ok(Box::new(FakeHandle {
            exit,
            killable,
            killed: false,
            kills: self.kills.clone(),
        }))
    }
}

struct FakeHandle {
    exit: Option<ProcessExit>,
    killable: bool,
    killed: bool,
    kills: Arc<AtomicUsize>,
}

impl ProcessHandle for FakeHandle {
    fn id(&self) -> Option<u32> {
        None
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<ProcessExit>> {
        Box::pin(async move {
            if self.killed {
                return Ok(ProcessExit::Signaled);
            }
            match self.exit {
                Some(exit) => Ok(exit),
                None => std::future::pending().await,
            }
        })
    }

    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        if !self.killable {
            return Box::pin(async {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "kill refused"))
            });
        }
        self.killed = true;
        Box::pin(async { Ok(()) })
    }
}
