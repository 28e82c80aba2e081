//! Encrypted config fixtures
//!
//! Each call creates its own temporary directory holding a fresh age private
//! key (`key.txt`) and a sops-encrypted copy of the given plaintext
//! (`contents-<random>.enc.<format>`). The returned [`Fixture`] owns the
//! directory and removes it when dropped, so its paths cannot outlive it.
//!
//! In tests, point the code under test at the key with
//! [`Fixture::key_file_env`] and hand it [`Fixture::encrypted_contents_path`]:
//!
//! ```no_run
//! use std::process::Command;
//!
//! let fixture = testsops::encrypt_json(r#"{"FieldA": 123}"#, &testsops::Options::default());
//! let (var, key) = fixture.key_file_env();
//! let output = Command::new("sops")
//!     .env(var, key)
//!     .arg("--decrypt")
//!     .arg(fixture.encrypted_contents_path())
//!     .output()
//!     .unwrap();
//! assert!(output.status.success());
//! ```
//!
//! The plain `encrypt_*` functions panic on any failure, which fails the
//! calling test with the full error chain. The `try_encrypt_*` forms return
//! the error instead.

use crate::error::{ErrorCategory, ErrorKind, FixtureError, Result};
use crate::format::Format;
use crate::keys::{KEY_FILE_NAME, KeyPair};
use crate::options::Options;
use crate::sops;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Environment variable sops reads the age identity file location from.
pub const SOPS_AGE_KEY_FILE: &str = "SOPS_AGE_KEY_FILE";

/// An encrypted config file plus the key that decrypts it.
///
/// Both files live in a temporary directory owned by this value; dropping it
/// removes the directory and everything in it.
#[derive(Debug)]
pub struct Fixture {
    dir: TempDir,
    key_path: PathBuf,
    encrypted_contents_path: PathBuf,
    recipient: String,
    format: Format,
}

impl Fixture {
    /// Path of the age identity file (`key.txt`).
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Path of the sops-encrypted contents. Its extension is the format tag.
    pub fn encrypted_contents_path(&self) -> &Path {
        &self.encrypted_contents_path
    }

    /// The temporary directory holding both files.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    /// The age recipient (public key) the contents were encrypted to.
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// The `(SOPS_AGE_KEY_FILE, key path)` pair to set on whatever decrypts
    /// the contents.
    pub fn key_file_env(&self) -> (&'static str, &Path) {
        (SOPS_AGE_KEY_FILE, &self.key_path)
    }

    /// Detach the directory from this value so it is not removed on drop.
    ///
    /// Returns the key path and the encrypted contents path; the caller
    /// becomes responsible for cleaning them up.
    pub fn keep(self) -> (PathBuf, PathBuf) {
        let dir = self.dir.keep();
        tracing::debug!(dir = %dir.display(), "Keeping fixture directory");
        (self.key_path, self.encrypted_contents_path)
    }
}

/// Encrypt the contents of an existing file, inferring the format from its
/// extension.
///
/// # Panics
///
/// Panics if `path` has no usable extension, cannot be read, or encryption
/// fails.
#[track_caller]
pub fn encrypt_file(path: impl AsRef<Path>, options: &Options) -> Fixture {
    or_fail(try_encrypt_file(path, options))
}

/// Fallible form of [`encrypt_file`].
///
/// The extension is validated before anything is created on disk.
pub fn try_encrypt_file(path: impl AsRef<Path>, options: &Options) -> Result<Fixture> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    try_encrypt_file_as(path, format, options)
}

/// Encrypt the contents of an existing file as `format`, ignoring whatever
/// extension the file has.
///
/// # Panics
///
/// Panics if the file cannot be read or encryption fails.
#[track_caller]
pub fn encrypt_file_as(path: impl AsRef<Path>, format: Format, options: &Options) -> Fixture {
    or_fail(try_encrypt_file_as(path, format, options))
}

/// Fallible form of [`encrypt_file_as`].
pub fn try_encrypt_file_as(
    path: impl AsRef<Path>,
    format: Format,
    options: &Options,
) -> Result<Fixture> {
    let path = path.as_ref();
    format.validate()?;
    let contents = fs::read(path).map_err(|e| read_error(path, e))?;
    try_encrypt(&contents, format, options)
}

#[track_caller]
pub fn encrypt_yaml(contents: &str, options: &Options) -> Fixture {
    encrypt(contents.as_bytes(), Format::Yaml, options)
}

#[track_caller]
pub fn encrypt_json(contents: &str, options: &Options) -> Fixture {
    encrypt(contents.as_bytes(), Format::Json, options)
}

#[track_caller]
pub fn encrypt_env(contents: &str, options: &Options) -> Fixture {
    encrypt(contents.as_bytes(), Format::Env, options)
}

#[track_caller]
pub fn encrypt_ini(contents: &str, options: &Options) -> Fixture {
    encrypt(contents.as_bytes(), Format::Ini, options)
}

pub fn try_encrypt_yaml(contents: &str, options: &Options) -> Result<Fixture> {
    try_encrypt(contents.as_bytes(), Format::Yaml, options)
}

pub fn try_encrypt_json(contents: &str, options: &Options) -> Result<Fixture> {
    try_encrypt(contents.as_bytes(), Format::Json, options)
}

pub fn try_encrypt_env(contents: &str, options: &Options) -> Result<Fixture> {
    try_encrypt(contents.as_bytes(), Format::Env, options)
}

pub fn try_encrypt_ini(contents: &str, options: &Options) -> Result<Fixture> {
    try_encrypt(contents.as_bytes(), Format::Ini, options)
}

/// Encrypt `contents` as the given format.
///
/// # Panics
///
/// Panics if any step of fixture generation fails.
#[track_caller]
pub fn encrypt(contents: &[u8], format: Format, options: &Options) -> Fixture {
    or_fail(try_encrypt(contents, format, options))
}

/// Generate a fixture, returning the first error encountered.
///
/// On error the temporary directory and anything written to it so far are
/// removed before returning.
pub fn try_encrypt(contents: &[u8], format: Format, options: &Options) -> Result<Fixture> {
    generate(contents, format, options).map_err(|e| e.with_context("fixture generation failed"))
}

fn generate(contents: &[u8], format: Format, options: &Options) -> Result<Fixture> {
    format.validate()?;

    let dir = tempfile::Builder::new()
        .prefix("testsops-")
        .tempdir()
        .map_err(|e| io_error("failed to create fixture directory", e))?;
    tracing::debug!(dir = %dir.path().display(), format = %format, "Generating fixture");

    let keys = KeyPair::generate();
    let key_path = dir.path().join(KEY_FILE_NAME);
    keys.write_identity(&key_path)
        .map_err(|e| e.with_context("failed to save age private key"))?;

    let sops_path = sops::resolve_binary(options.sops_binary.as_deref())?;

    let (output, encrypted_contents_path) = tempfile::Builder::new()
        .prefix("contents-")
        .suffix(&format!(".enc.{}", format.as_str()))
        .tempfile_in(dir.path())
        .map_err(|e| io_error("failed to open temp file for encrypted contents", e))?
        .keep()
        .map_err(|e| io_error("failed to keep encrypted contents file", e.error))?;

    sops::encrypt(
        &sops_path,
        keys.recipient(),
        &format,
        contents,
        &output,
        options.timeout,
    )?;

    // Surfaces write errors that would otherwise be lost when the handle is
    // dropped.
    output
        .sync_all()
        .map_err(|e| io_error("failed to write encrypted contents file", e))?;
    drop(output);

    tracing::debug!(
        key_path = %key_path.display(),
        encrypted_contents_path = %encrypted_contents_path.display(),
        "Fixture ready"
    );
    Ok(Fixture {
        dir,
        key_path,
        encrypted_contents_path,
        recipient: keys.recipient().to_string(),
        format,
    })
}

#[track_caller]
fn or_fail(result: Result<Fixture>) -> Fixture {
    match result {
        Ok(fixture) => fixture,
        Err(e) => panic!("{}", e.chain()),
    }
}

fn io_error(msg: &str, err: io::Error) -> FixtureError {
    FixtureError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::Io, msg, err)
}

fn read_error(path: &Path, err: io::Error) -> FixtureError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    FixtureError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read file {} for encryption", path.display()),
        err,
    )
}
