use std::{
    ffi::OsStr,
    process::{ExitStatus, Stdio},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::process::{Child, Command};

use crate::{error_code::ErrorCode, future::WithTimeout};

struct MetricsGuard {
    start: Instant,
    armed: bool,
    command: Arc<str>,
}

impl MetricsGuard {
    fn guard(command: Arc<str>) -> Self {
        metrics::counter!(crate::init_metrics::PROCESS_START, "command" => command.to_string()).increment(1);

        Self {
            start: Instant::now(),
            armed: true,
            command,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for MetricsGuard {
    fn drop(&mut self) {
        metrics::histogram!(
            crate::init_metrics::PROCESS_DURATION,
            "command" => self.command.to_string(),
            "completed" => (!self.armed).to_string(),
        )
        .record(self.start.elapsed().as_secs_f64());

        metrics::counter!(
            crate::init_metrics::PROCESS_END,
            "completed" => (!self.armed).to_string(),
            "command" => self.command.to_string(),
        )
        .increment(1);
    }
}

pub(crate) struct Process {
    command: Arc<str>,
    child: Child,
    guard: MetricsGuard,
    timeout: Duration,
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("command", &self.command)
            .field("child", &"Child")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ProcessError {
    #[error("Required command {0} not found, make sure it exists in tubely's $PATH")]
    NotFound(Arc<str>),

    #[error("Cannot run command {0} due to invalid permissions on binary, make sure the tubely user has permission to run it")]
    PermissionDenied(Arc<str>),

    #[error("Reached process spawn limit")]
    LimitReached,

    #[error("{0} timed out")]
    Timeout(Arc<str>),

    #[error("{0} Failed with {1}")]
    Status(Arc<str>, ExitStatus),

    #[error("Unknown process error")]
    Other(#[source] std::io::Error),
}

impl ProcessError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::COMMAND_NOT_FOUND,
            Self::PermissionDenied(_) => ErrorCode::COMMAND_PERMISSION_DENIED,
            Self::LimitReached | Self::Other(_) => ErrorCode::COMMAND_ERROR,
            Self::Timeout(_) => ErrorCode::COMMAND_TIMEOUT,
            Self::Status(_, _) => ErrorCode::COMMAND_FAILURE,
        }
    }
}

impl Process {
    pub(crate) fn run<T>(command: &str, args: &[T], timeout: Duration) -> Result<Self, ProcessError>
    where
        T: AsRef<OsStr>,
    {
        let command: Arc<str> = Arc::from(command);

        let res = tracing::trace_span!(parent: None, "Create command", %command).in_scope(|| {
            Self::spawn(
                command.clone(),
                Command::new(&*command).args(args),
                timeout,
            )
        });

        match res {
            Ok(this) => Ok(this),
            Err(e) => match e.kind() {
                std::io::ErrorKind::NotFound => Err(ProcessError::NotFound(command)),
                std::io::ErrorKind::PermissionDenied => {
                    Err(ProcessError::PermissionDenied(command))
                }
                std::io::ErrorKind::WouldBlock => Err(ProcessError::LimitReached),
                _ => Err(ProcessError::Other(e)),
            },
        }
    }

    fn spawn(command: Arc<str>, cmd: &mut Command, timeout: Duration) -> std::io::Result<Self> {
        tracing::trace_span!(parent: None, "Spawn command", %command).in_scope(|| {
            let guard = MetricsGuard::guard(command.clone());

            let cmd = cmd
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            cmd.spawn().map(|child| Process {
                child,
                command,
                guard,
                timeout,
            })
        })
    }

    /// Wait for the process to exit, discarding its stdout
    #[tracing::instrument(skip(self), fields(command = %self.command))]
    pub(crate) async fn wait(self) -> Result<(), ProcessError> {
        self.output().await.map(|_| ())
    }

    /// Wait for the process to exit and collect its stdout
    ///
    /// stderr is only logged, and only when the process fails
    #[tracing::instrument(skip(self), fields(command = %self.command))]
    pub(crate) async fn output(self) -> Result<Vec<u8>, ProcessError> {
        let Process {
            command,
            child,
            guard,
            timeout,
        } = self;

        // dropping the child on timeout kills it
        let res = child.wait_with_output().with_timeout(timeout).await;

        match res {
            Ok(Ok(output)) if output.status.success() => {
                guard.disarm();

                Ok(output.stdout)
            }
            Ok(Ok(output)) => {
                tracing::warn!(
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "{command} exited with {}",
                    output.status
                );

                Err(ProcessError::Status(command, output.status))
            }
            Ok(Err(e)) => Err(ProcessError::Other(e)),
            Err(_) => Err(ProcessError::Timeout(command)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Process, ProcessError};
    use std::time::Duration;

    #[actix_web::test]
    async fn missing_command_is_not_found() {
        let res = Process::run(
            "tubely-this-command-does-not-exist",
            &["--help"],
            Duration::from_secs(1),
        );

        assert!(matches!(res, Err(ProcessError::NotFound(_))));
    }

    #[cfg(unix)]
    #[actix_web::test]
    async fn collects_stdout() {
        let output = Process::run("sh", &["-c", "printf hello"], Duration::from_secs(5))
            .expect("spawned sh")
            .output()
            .await
            .expect("sh succeeded");

        assert_eq!(output, b"hello");
    }

    #[cfg(unix)]
    #[actix_web::test]
    async fn nonzero_exit_is_status_error() {
        let res = Process::run("sh", &["-c", "echo oops >&2; exit 3"], Duration::from_secs(5))
            .expect("spawned sh")
            .wait()
            .await;

        assert!(matches!(res, Err(ProcessError::Status(_, status)) if status.code() == Some(3)));
    }

    #[cfg(unix)]
    #[actix_web::test]
    async fn slow_process_times_out() {
        let res = Process::run("sh", &["-c", "sleep 5"], Duration::from_millis(100))
            .expect("spawned sh")
            .wait()
            .await;

        assert!(matches!(res, Err(ProcessError::Timeout(_))));
    }
}
