//! Interactive agent process lifecycle.
//!
//! The agent runs as a child process with inherited stdio. Before exec,
//! the environment contract is set: `INSIDE_AGENT=1` marks nested
//! invocations for the safety guard, and `AI_AGENT_SESSION_ID` carries
//! the active session so read-only queries inside the agent can find
//! it. SIGINT/SIGTERM received by the parent are forwarded to the child
//! so it is never orphaned; the parent always waits.

use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{AgentError, Result};

/// Set on the child to mark execution inside a spawned agent.
pub const INSIDE_AGENT_ENV: &str = "INSIDE_AGENT";

/// Set on the child to identify the active session.
pub const SESSION_ID_ENV: &str = "AI_AGENT_SESSION_ID";

/// How the child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnOutcome {
    /// Exit code, when the child exited normally.
    pub exit_code: Option<i32>,
    /// True when the parent relayed a termination signal.
    pub interrupted: bool,
}

/// Runs an agent command interactively and waits for it.
///
/// # Errors
/// Fails with `MissingBinary` when the command is not on PATH and
/// `Launch` when the spawn itself fails.
pub fn run_interactive(
    agent_id: &str,
    command: &str,
    args: &[String],
    work_dir: &Path,
    session_id: &str,
    extra_env: &[(String, String)],
) -> Result<SpawnOutcome> {
    if which::which(command).is_err() {
        return Err(AgentError::MissingBinary {
            agent: agent_id.to_string(),
            command: command.to_string(),
        });
    }

    let mut child = Command::new(command)
        .args(args)
        .current_dir(work_dir)
        .env(INSIDE_AGENT_ENV, "1")
        .env(SESSION_ID_ENV, session_id)
        .envs(extra_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .spawn()
        .map_err(|source| AgentError::Launch {
            agent: agent_id.to_string(),
            source,
        })?;

    debug!(agent = agent_id, pid = child.id(), "agent spawned");

    let interrupted = Arc::new(AtomicBool::new(false));
    let forwarder = spawn_signal_forwarder(child.id(), Arc::clone(&interrupted));

    let status = child.wait().map_err(|source| AgentError::Launch {
        agent: agent_id.to_string(),
        source,
    })?;

    if let Some(forwarder) = forwarder {
        forwarder.close();
    }

    let outcome = SpawnOutcome {
        exit_code: status.code(),
        interrupted: interrupted.load(Ordering::Relaxed),
    };
    debug!(agent = agent_id, ?outcome, "agent exited");
    Ok(outcome)
}

/// Handle used to tear down the signal-forwarding thread.
#[cfg(unix)]
struct ForwarderHandle {
    handle: signal_hook::iterator::Handle,
}

#[cfg(unix)]
impl ForwarderHandle {
    fn close(self) {
        self.handle.close();
    }
}

#[cfg(not(unix))]
struct ForwarderHandle;

#[cfg(not(unix))]
impl ForwarderHandle {
    fn close(self) {}
}

#[cfg(unix)]
fn spawn_signal_forwarder(child_pid: u32, interrupted: Arc<AtomicBool>) -> Option<ForwarderHandle> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            warn!(error = %e, "could not install signal handler, child will not be forwarded signals");
            return None;
        }
    };
    let handle = signals.handle();

    std::thread::spawn(move || {
        for signal in signals.forever() {
            interrupted.store(true, Ordering::Relaxed);
            let target = nix::unistd::Pid::from_raw(child_pid as i32);
            let forwarded = match signal {
                SIGTERM => nix::sys::signal::kill(target, nix::sys::signal::Signal::SIGTERM),
                _ => nix::sys::signal::kill(target, nix::sys::signal::Signal::SIGINT),
            };
            match forwarded {
                Ok(()) => debug!(signal, child_pid, "forwarded signal to agent"),
                Err(e) => warn!(signal, child_pid, error = %e, "failed to forward signal"),
            }
        }
    });

    Some(ForwarderHandle { handle })
}

#[cfg(not(unix))]
fn spawn_signal_forwarder(
    _child_pid: u32,
    _interrupted: Arc<AtomicBool>,
) -> Option<ForwarderHandle> {
    // On Windows the console delivers CTRL_BREAK to the whole process
    // group, so the child already receives it without forwarding
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_binary() {
        let dir = tempdir().unwrap();
        let err = run_interactive(
            "test",
            "definitely-not-a-real-binary-daf",
            &[],
            dir.path(),
            "sess",
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::MissingBinary { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_runs_child_and_collects_exit_code() {
        let dir = tempdir().unwrap();
        let outcome = run_interactive("test", "true", &[], dir.path(), "sess", &[]).unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert!(!outcome.interrupted);

        let outcome = run_interactive("test", "false", &[], dir.path(), "sess", &[]).unwrap();
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[test]
    #[cfg(unix)]
    fn test_child_sees_env_contract() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("env-out");
        let script = format!(
            "printf '%s %s' \"$INSIDE_AGENT\" \"$AI_AGENT_SESSION_ID\" > {}",
            marker.display()
        );
        run_interactive(
            "test",
            "sh",
            &["-c".to_string(), script],
            dir.path(),
            "feat-x",
            &[],
        )
        .unwrap();

        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "1 feat-x");
    }
}
