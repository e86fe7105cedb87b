//! Local-process transport.
//!
//! A [`CmdShell`] spawns a child process with piped stdio and binds an
//! [`Engine`] over its streams, which is enough to drive any line-oriented
//! interactive program: a shell, a REPL, a vendor CLI tool.

use std::ffi::OsStr;
use std::ops::{Deref, DerefMut};
use std::process::Stdio;

use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

use crate::config::ReadConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};

/// An engine bound to a spawned child process.
pub struct CmdShell {
    engine: Engine,
    child: Child,
}

impl CmdShell {
    /// Spawn `program` with `args` and bind an engine to its stdio.
    pub fn spawn<I, S>(program: impl AsRef<OsStr>, args: I, cfg: ReadConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(program);
        cmd.args(args);
        Self::from_command(cmd, cfg)
    }

    /// Spawn a pre-configured command. Stdio is overridden to piped and the
    /// child is killed if the shell is dropped without an explicit stop.
    pub fn from_command(mut cmd: Command, cfg: ReadConfig) -> Result<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd.spawn().map_err(|err| Error::Shell(err.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Shell("child stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Shell("child stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Send + Unpin>);

        let engine = Engine::new(Box::new(stdin), Box::new(stdout), stderr, cfg);
        Ok(Self { engine, child })
    }

    /// The underlying child process handle.
    pub fn child(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Kill the child process.
    pub async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|err| Error::Shell(err.to_string()))
    }

    /// Tear down the engine and request child termination. Idempotent.
    pub fn stop(&mut self) {
        self.engine.stop();
        if let Err(err) = self.child.start_kill() {
            if err.kind() != std::io::ErrorKind::InvalidInput {
                tracing::warn!(error = %err, "child kill failed");
            }
        }
    }
}

impl Deref for CmdShell {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.engine
    }
}

impl DerefMut for CmdShell {
    fn deref_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
}
