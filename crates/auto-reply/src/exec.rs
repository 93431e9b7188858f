//! Agent subprocess execution with a wall-clock limit.

use std::{
    process::Stdio,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    tokio::{
        io::{AsyncRead, AsyncReadExt},
        process::Command,
        task::JoinHandle,
    },
    tracing::{debug, warn},
};

/// How long to keep draining pipes after a timed-out child was killed.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub killed: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandFailure {
    /// The command exceeded its timeout and was killed. Carries whatever was
    /// buffered before the kill.
    #[error("command timed out")]
    TimedOut { stdout: String, stderr: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CommandResult = Result<CommandOutput, CommandFailure>;

/// Runs one argv to completion or until `timeout` elapses.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String], timeout: Duration) -> CommandResult;
}

/// Default runner backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

type SharedBuf = Arc<Mutex<Vec<u8>>>;

fn spawn_reader<R>(pipe: Option<R>) -> (SharedBuf, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf: SharedBuf = Arc::default();
    let sink = Arc::clone(&buf);
    let handle = tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .extend_from_slice(&chunk[..n]),
            }
        }
    });
    (buf, handle)
}

fn snapshot(buf: &SharedBuf) -> String {
    let bytes = buf.lock().unwrap_or_else(|e| e.into_inner());
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, argv: &[String], timeout: Duration) -> CommandResult {
        let Some((program, args)) = argv.split_first() else {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command").into());
        };
        debug!(program = %program, args = args.len(), timeout_secs = timeout.as_secs(), "running agent command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (stdout_buf, mut stdout_task) = spawn_reader(child.stdout.take());
        let (stderr_buf, mut stderr_task) = spawn_reader(child.stderr.take());

        // One deadline covers the exit and the pipe drain: a background
        // process that inherits stdout keeps the pipe open past the exit.
        let run = async {
            let status = child.wait().await?;
            let _ = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
            Ok::<_, std::io::Error>(status)
        };
        let finished = tokio::time::timeout(timeout, run).await;

        match finished {
            Ok(status) => {
                let status = status?;
                let output = CommandOutput {
                    stdout: snapshot(&stdout_buf),
                    stderr: snapshot(&stderr_buf),
                    exit_code: status.code(),
                    signal: exit_signal(&status),
                    killed: false,
                };
                debug!(
                    exit_code = ?output.exit_code,
                    stdout_len = output.stdout.len(),
                    stderr_len = output.stderr.len(),
                    "agent command finished"
                );
                Ok(output)
            },
            Err(_) => {
                warn!(program = %program, timeout_secs = timeout.as_secs(), "agent command timed out, killing");
                match child.try_wait() {
                    Ok(Some(status)) => {
                        debug!(exit_code = ?status.code(), "command exited but its output pipes stayed open");
                    },
                    _ => {
                        if let Err(e) = child.kill().await {
                            warn!(error = %e, "failed to kill timed-out command");
                        }
                    },
                }
                let _ = tokio::time::timeout(DRAIN_GRACE, async {
                    let _ = (&mut stdout_task).await;
                    let _ = (&mut stderr_task).await;
                })
                .await;
                stdout_task.abort();
                stderr_task.abort();
                Err(CommandFailure::TimedOut {
                    stdout: snapshot(&stdout_buf),
                    stderr: snapshot(&stderr_buf),
                })
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = TokioCommandRunner
            .run(&sh("echo hello; echo oops >&2; exit 3"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert!(!out.killed);
    }

    #[tokio::test]
    async fn timeout_returns_partial_output() {
        let err = TokioCommandRunner
            .run(&sh("echo partial output here; sleep 5"), Duration::from_millis(300))
            .await
            .unwrap_err();
        match err {
            CommandFailure::TimedOut { stdout, .. } => {
                assert!(stdout.contains("partial output here"));
            },
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_covers_inherited_pipes() {
        let started = std::time::Instant::now();
        let err = TokioCommandRunner
            .run(&sh("sleep 4 & echo hi"), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
        match err {
            CommandFailure::TimedOut { stdout, .. } => assert_eq!(stdout.trim(), "hi"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_io_error() {
        let err = TokioCommandRunner
            .run(&["/definitely/not/a/binary".to_string()], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandFailure::Io(_)));
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        let err = TokioCommandRunner.run(&[], Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CommandFailure::Io(_)));
    }
}
