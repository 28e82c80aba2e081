//! Locating and running the `sops` executable
//!
//! sops has no library API for encryption, so fixtures are produced by
//! shelling out: plaintext goes in on stdin, ciphertext comes out on stdout
//! straight into the fixture file, and sops' own diagnostics go to our
//! stderr so they show up in test output.

use crate::error::{ErrorCategory, ErrorKind, FixtureError, Result};
use crate::format::Format;
use std::env;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use wait_timeout::ChildExt;

/// Executable name searched for in `PATH` when no override is given.
pub const SOPS_BINARY_NAME: &str = "sops";

/// Resolve the sops executable: the override if one is given, otherwise the
/// first `sops` found in `PATH`.
pub fn resolve_binary(override_path: Option<&Path>) -> Result<PathBuf> {
    match override_path {
        Some(path) => {
            if !path.is_file() {
                return Err(FixtureError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::ToolNotFound,
                    format!("sops binary {} does not exist", path.display()),
                ));
            }
            Ok(path.to_path_buf())
        }
        None => lookup_path(SOPS_BINARY_NAME, env::var_os("PATH")).ok_or_else(|| {
            FixtureError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::ToolNotFound,
                format!("failed to find '{}' binary in PATH", SOPS_BINARY_NAME),
            )
        }),
    }
}

/// Search each directory of a `PATH`-style list for an executable `name`.
fn lookup_path(name: &str, path_var: Option<OsString>) -> Option<PathBuf> {
    let path_var = path_var?;
    env::split_paths(&path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidates(&dir, name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(not(windows))]
fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    vec![dir.join(name)]
}

#[cfg(windows)]
fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    vec![dir.join(format!("{name}.exe")), dir.join(name)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Arguments for encrypting stdin to a single age recipient.
pub(crate) fn encrypt_args(recipient: &str, format: &Format) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--encrypt".into(), "--age".into(), recipient.into()];
    if let Some(sops_type) = format.sops_type() {
        args.push("--input-type".into());
        args.push(sops_type.into());
        args.push("--output-type".into());
        args.push(sops_type.into());
    }
    // sops wants a file argument; on Unix the stdin pipe is reachable as one.
    #[cfg(unix)]
    args.push("/dev/stdin".into());
    args
}

/// Run `sops` to encrypt `plaintext` for `recipient`, writing the ciphertext
/// into `output`.
///
/// Blocks until sops exits. With a `timeout`, a sops that is still running
/// when it expires is killed and reaped before the error is returned.
pub(crate) fn encrypt(
    sops: &Path,
    recipient: &str,
    format: &Format,
    plaintext: &[u8],
    output: &File,
    timeout: Option<Duration>,
) -> Result<()> {
    let stdout = output.try_clone().map_err(|e| {
        FixtureError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to duplicate output file handle",
            e,
        )
    })?;
    let args = encrypt_args(recipient, format);
    tracing::debug!(
        sops = %sops.display(),
        args = %display_args(&args),
        format = %format,
        plaintext_len = plaintext.len(),
        "Running sops"
    );

    let mut child = Command::new(sops)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| {
            FixtureError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::ToolLaunch,
                format!("failed to launch {}", sops.display()),
                e,
            )
        })?;

    let stdin = child.stdin.take().ok_or_else(|| {
        FixtureError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::ToolLaunch,
            "sops stdin was not captured",
        )
    })?;

    // stdin is fed from a detached thread owning its own copy of the
    // plaintext. If sops is a wrapper whose child keeps the pipe open after
    // the wrapper is killed, that writer may never finish, so it is only
    // joined once sops has exited successfully. A sops that rejects its
    // arguments may exit before reading at all; the resulting broken pipe
    // only matters if sops claims success.
    let data = plaintext.to_vec();
    let writer = thread::spawn(move || feed_stdin(stdin, &data));
    let status = wait(&mut child, sops, timeout)?;

    if !status.success() {
        tracing::warn!(
            sops = %sops.display(),
            exit_code = status.code(),
            "sops exited unsuccessfully"
        );
        return Err(FixtureError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::ToolFailed,
            format!("failed to encrypt contents with sops: {}", describe(status)),
        ));
    }
    let fed = writer
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
    fed.map_err(|e| {
        FixtureError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write plaintext to sops stdin",
            e,
        )
    })
}

// Dropping the handle closes the pipe so sops sees end of input.
fn feed_stdin(mut stdin: ChildStdin, plaintext: &[u8]) -> io::Result<()> {
    stdin.write_all(plaintext)?;
    stdin.flush()
}

fn wait(child: &mut Child, sops: &Path, timeout: Option<Duration>) -> Result<ExitStatus> {
    let launch_error = |e: io::Error| {
        FixtureError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::ToolLaunch,
            format!("failed to wait for {}", sops.display()),
            e,
        )
    };

    let Some(timeout) = timeout else {
        return child.wait().map_err(launch_error);
    };

    match child.wait_timeout(timeout).map_err(launch_error)? {
        Some(status) => Ok(status),
        None => {
            tracing::warn!(
                sops = %sops.display(),
                timeout_secs = timeout.as_secs_f64(),
                "sops timed out, killing process"
            );
            let _ = child.kill();
            let _ = child.wait();
            Err(FixtureError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::ToolTimeout,
                format!(
                    "sops did not finish within {:.1}s and was killed",
                    timeout.as_secs_f64()
                ),
            ))
        }
    }
}

fn describe(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Render an argument list for log and error messages.
pub(crate) fn display_args(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
