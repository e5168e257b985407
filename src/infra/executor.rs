//! External build command execution
//!
//! Runs the configured build command for one package through the system
//! shell, with stdout and stderr captured in the package's log file.

use std::fs::File;
use std::process::Stdio;

use tokio::process::Command;

use crate::core::supervisor::{BuildContext, BuildExecutor, ExecutorOutput, ProcessStatus};
use crate::error::BuildError;

/// Environment variable carrying the package name into the build command
pub const ENV_PACKAGE: &str = "REPOFORGE_PACKAGE";

/// Executor spawning the build command as a child process
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    command: String,
}

impl ProcessExecutor {
    /// Create an executor for a shell command line
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// The command line run for each package
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Verify the program the command starts with can be found
    ///
    /// # Errors
    ///
    /// Returns `CommandNotFound` if the program is not on `PATH`.
    pub fn check_available(&self) -> Result<(), BuildError> {
        let program = self.command.split_whitespace().next().unwrap_or_default();
        if program.is_empty() || which::which(program).is_err() {
            return Err(BuildError::CommandNotFound {
                command: program.to_string(),
            });
        }
        Ok(())
    }

    fn spawn_command(&self, package: &str, context: &BuildContext) -> std::io::Result<Command> {
        let log = File::create(&context.log_path)?;
        let log_err = log.try_clone()?;

        let (shell, flag) = shell();
        let mut command = Command::new(shell);
        command
            .arg(flag)
            .arg(&self.command)
            .env(ENV_PACKAGE, package)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        if let Some(dir) = &context.working_dir {
            command.current_dir(dir);
        }
        Ok(command)
    }
}

/// Kills every process of a build's process group when dropped
///
/// Dropping the build future on timeout only kills the shell; whatever
/// the build command started itself lives in the same group.
#[cfg(unix)]
struct ProcessGroup(nix::unistd::Pid);

#[cfg(unix)]
impl ProcessGroup {
    fn of(child: &tokio::process::Child) -> Option<Self> {
        let pid = i32::try_from(child.id()?).ok()?;
        Some(Self(nix::unistd::Pid::from_raw(pid)))
    }
}

#[cfg(unix)]
impl Drop for ProcessGroup {
    fn drop(&mut self) {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};

        match killpg(self.0, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!("Could not kill build process group {}: {e}", self.0),
        }
    }
}

impl BuildExecutor for ProcessExecutor {
    async fn run(&self, package: &str, context: &BuildContext) -> ExecutorOutput {
        let mut command = match self.spawn_command(package, context) {
            Ok(command) => command,
            Err(e) => {
                return ExecutorOutput {
                    status: ProcessStatus::SpawnFailed(e.to_string()),
                    output: None,
                }
            }
        };

        tracing::debug!(
            "Running `{}` for {package} in {:?}",
            self.command,
            context.working_dir
        );

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutorOutput {
                    status: ProcessStatus::SpawnFailed(e.to_string()),
                    output: Some(context.log_path.clone()),
                }
            }
        };
        // Declared after `child` so the group goes down first
        #[cfg(unix)]
        let _group = ProcessGroup::of(&child);

        let status = match child.wait().await {
            Ok(status) => match status.code() {
                Some(code) => ProcessStatus::Exited(code),
                None => ProcessStatus::Terminated,
            },
            Err(e) => ProcessStatus::SpawnFailed(e.to_string()),
        };

        ExecutorOutput {
            status,
            output: Some(context.log_path.clone()),
        }
    }
}

#[cfg(unix)]
fn shell() -> (&'static str, &'static str) {
    ("/bin/sh", "-c")
}

#[cfg(windows)]
fn shell() -> (&'static str, &'static str) {
    ("cmd.exe", "/C")
}
