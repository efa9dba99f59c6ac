//! `histon serve` command handler

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::info;

use crate::cli::ServeArgs;
use crate::error::CliError;

/// Execute the `serve` command.
///
/// In foreground mode, spawns `histon-daemon` and replaces the current
/// process. In daemon mode (`-d`), spawns `histon-daemon` as a detached
/// background process.
pub async fn execute(args: ServeArgs, config_path: &Path) -> Result<(), CliError> {
    // Validate config exists before handing off
    if !config_path.exists() {
        return Err(CliError::Config(format!(
            "configuration file not found: {}",
            config_path.display()
        )));
    }

    info!(
        daemonize = args.daemonize,
        validate = args.validate,
        config = %config_path.display(),
        "starting histon"
    );

    // A validate run checks the config and exits, so it always stays in
    // the foreground where its output is visible.
    if args.daemonize && !args.validate {
        serve_background(config_path, args.pid_file.as_deref())?;
    } else {
        serve_foreground(config_path, args.validate)?;
    }

    Ok(())
}

/// Start the daemon in foreground mode by exec-ing the histon-daemon binary.
fn serve_foreground(config_path: &Path, validate: bool) -> Result<(), CliError> {
    let mut cmd = Command::new("histon-daemon");
    cmd.arg("--config").arg(config_path);
    if validate {
        cmd.arg("--validate");
    }

    info!("executing histon-daemon in foreground mode");

    // exec() replaces the current process
    let err = CommandExecExt::exec(&mut cmd);

    // If we reach here, exec failed
    Err(CliError::Command(format!(
        "failed to execute histon-daemon: {err}"
    )))
}

/// Start the daemon in background mode.
fn serve_background(config_path: &Path, pid_file: Option<&Path>) -> Result<(), CliError> {
    let mut cmd = Command::new("histon-daemon");
    cmd.arg("--config").arg(config_path);

    if let Some(pid_file_path) = pid_file {
        cmd.arg("--pid-file").arg(pid_file_path);
    }

    // Detach from parent by redirecting all stdio to /dev/null
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    info!("spawning histon-daemon in background mode");

    let child = cmd
        .spawn()
        .map_err(|e| CliError::Command(format!("failed to spawn histon-daemon: {e}")))?;

    info!(pid = child.id(), "daemon started successfully");

    Ok(())
}

// Unix-specific exec trait
#[cfg(unix)]
use std::os::unix::process::CommandExt;

#[cfg(unix)]
trait CommandExecExt {
    fn exec(&mut self) -> std::io::Error;
}

#[cfg(unix)]
impl CommandExecExt for Command {
    fn exec(&mut self) -> std::io::Error {
        CommandExt::exec(self)
    }
}

// Fallback for non-Unix platforms (Windows, etc.)
#[cfg(not(unix))]
trait CommandExecExt {
    fn exec(&mut self) -> std::io::Error;
}

#[cfg(not(unix))]
impl CommandExecExt for Command {
    fn exec(&mut self) -> std::io::Error {
        std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "exec not supported on this platform",
        )
    }
}
