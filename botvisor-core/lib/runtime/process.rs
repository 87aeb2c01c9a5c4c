use std::process::Stdio;

use tokio::process::Command;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What happened when a process was signalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The signal was delivered.
    Delivered,

    /// No such process exists any more.
    Gone,
}

/// How hard to terminate a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Ask the process to exit (`SIGTERM`).
    Graceful,

    /// Kill the process outright (`SIGKILL`).
    Forced,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Makes the spawned process lead its own process group so it can be terminated as a unit
/// without touching the supervisor or other units.
#[cfg(unix)]
pub fn isolate_process_group(command: &mut Command) {
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid()?;
            Ok(())
        });
    }
}

/// Makes the spawned process lead its own process group so it can be terminated as a unit
/// without touching the supervisor or other units.
#[cfg(windows)]
pub fn isolate_process_group(command: &mut Command) {
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    command.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

/// Checks whether a process with the given id exists.
#[cfg(unix)]
pub async fn is_alive(pid: u32) -> bool {
    use nix::{errno::Errno, sys::signal, unistd::Pid};

    match signal::kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        // The process exists but belongs to someone else.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Checks whether a process with the given id exists.
#[cfg(windows)]
pub async fn is_alive(pid: u32) -> bool {
    let output = Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid), "/NH"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await;

    match output {
        Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()),
        // Without an answer assume the process is still there.
        Err(_) => true,
    }
}

/// Signals the process group led by `pid`, falling back to the process itself when it does not
/// lead a group.
#[cfg(unix)]
pub async fn terminate_group(pid: u32, termination: Termination) -> std::io::Result<SignalOutcome> {
    use nix::{
        errno::Errno,
        sys::signal::{self, Signal},
        unistd::Pid,
    };

    let signal = match termination {
        Termination::Graceful => Signal::SIGTERM,
        Termination::Forced => Signal::SIGKILL,
    };

    let pid = Pid::from_raw(pid as i32);
    match signal::killpg(pid, signal) {
        Ok(()) => return Ok(SignalOutcome::Delivered),
        Err(Errno::ESRCH) => {}
        Err(e) => return Err(e.into()),
    }

    match signal::kill(pid, signal) {
        Ok(()) => Ok(SignalOutcome::Delivered),
        Err(Errno::ESRCH) => Ok(SignalOutcome::Gone),
        Err(e) => Err(e.into()),
    }
}

/// Kills the process tree rooted at `pid`.
///
/// Windows has no graceful equivalent of `SIGTERM` for console processes, so both termination
/// modes force the tree down.
#[cfg(windows)]
pub async fn terminate_group(pid: u32, _termination: Termination) -> std::io::Result<SignalOutcome> {
    if !is_alive(pid).await {
        return Ok(SignalOutcome::Gone);
    }

    let status = Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;

    if status.success() {
        Ok(SignalOutcome::Delivered)
    } else if !is_alive(pid).await {
        Ok(SignalOutcome::Gone)
    } else {
        Err(std::io::Error::other(format!(
            "taskkill exited with {}",
            status
        )))
    }
}

/// Terminates every process whose command line matches the runtime name.
///
/// This cannot tell one unit's process from any other process of the same runtime and is only
/// used for records that carry no process id.
pub async fn kill_by_name(runtime_process_name: &str) -> std::io::Result<()> {
    let (program, args) = kill_by_name_command(runtime_process_name);
    tracing::debug!("running {} {:?}", program, args);

    let status = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;

    // Both pkill and taskkill report "nothing matched" with a non-zero code.
    tracing::debug!("{} exited with {}", program, status);

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

#[cfg(unix)]
fn kill_by_name_command(runtime_process_name: &str) -> (&'static str, Vec<String>) {
    ("pkill", vec!["-f".to_string(), runtime_process_name.to_string()])
}

#[cfg(windows)]
fn kill_by_name_command(runtime_process_name: &str) -> (&'static str, Vec<String>) {
    let image = if runtime_process_name.ends_with(".exe") {
        runtime_process_name.to_string()
    } else {
        format!("{}.exe", runtime_process_name)
    };

    ("taskkill", vec!["/F".to_string(), "/IM".to_string(), image])
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
