use crate::error::RelayError;

/// Detach from the controlling terminal: fork, start a new session, chdir to
/// `/`, point stdio at `/dev/null` and clear the umask.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
pub fn daemonize() -> Result<(), RelayError> {
    use nix::sys::stat::{umask, Mode};

    nix::unistd::daemon(false, false).map_err(|e| RelayError::Daemon(e.to_string()))?;
    let _ = umask(Mode::empty());
    Ok(())
}

/// Without daemon(3) the flag only suppresses console output.
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
)))]
pub fn daemonize() -> Result<(), RelayError> {
    tracing::warn!("Daemon mode is not supported on this platform, staying in the foreground");
    Ok(())
}
