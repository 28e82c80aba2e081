//! Ephemeral age key pairs for fixtures

use crate::error::{ErrorCategory, ErrorKind, FixtureError, Result};
use age::secrecy::ExposeSecret;
use age::x25519;
use std::fs;
use std::io::Write;
use std::path::Path;
use zeroize::Zeroizing;

/// File name of the private key inside a fixture directory.
pub const KEY_FILE_NAME: &str = "key.txt";

/// A freshly generated identity and the recipient string derived from it.
pub(crate) struct KeyPair {
    identity: x25519::Identity,
    recipient: String,
}

impl KeyPair {
    pub(crate) fn generate() -> Self {
        let identity = x25519::Identity::generate();
        let recipient = identity.to_public().to_string();
        Self {
            identity,
            recipient,
        }
    }

    /// The public half, in `age1...` form, as passed to `sops --age`.
    pub(crate) fn recipient(&self) -> &str {
        &self.recipient
    }

    /// Write the identity in `AGE-SECRET-KEY-1...` form to `path`.
    ///
    /// The file is created with mode 0o600 on Unix systems.
    pub(crate) fn write_identity(&self, path: &Path) -> Result<()> {
        let mut contents = Zeroizing::new(String::new());
        contents.push_str(self.identity.to_string().expose_secret());
        contents.push('\n');
        write_file_secure(path, contents.as_bytes())
    }
}

/// Write file with secure permissions (0o600 on Unix)
fn write_file_secure(path: &Path, contents: &[u8]) -> Result<()> {
    #[cfg(unix)]
    {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| io_error(format!("failed to create {}", path.display()), e))?;

        file.write_all(contents)
            .map_err(|e| io_error(format!("failed to write {}", path.display()), e))?;
        file.sync_all()
            .map_err(|e| io_error(format!("failed to sync {}", path.display()), e))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents)
            .map_err(|e| io_error(format!("failed to write {}", path.display()), e))?;
        Ok(())
    }
}

/// Read back an identity written by [`KeyPair::write_identity`].
///
/// Lines starting with `#` and blank lines are skipped, so key files written
/// by `age-keygen` parse too.
pub fn read_identity(path: &Path) -> Result<x25519::Identity> {
    let contents = Zeroizing::new(
        fs::read_to_string(path)
            .map_err(|e| io_error(format!("failed to read {}", path.display()), e))?,
    );
    let line = contents
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .ok_or_else(|| {
            FixtureError::new(
                ErrorCategory::User,
                format!("no identity found in {}", path.display()),
            )
        })?;
    line.parse::<x25519::Identity>().map_err(|e| {
        FixtureError::new(
            ErrorCategory::User,
            format!("invalid identity in {}: {}", path.display(), e),
        )
    })
}

fn io_error(msg: String, err: std::io::Error) -> FixtureError {
    FixtureError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::Io, msg, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_recipient_matches_identity() {
        let pair = KeyPair::generate();
        assert!(pair.recipient().starts_with("age1"));
        assert_eq!(pair.identity.to_public().to_string(), pair.recipient());
    }

    #[test]
    fn test_pairs_are_fresh() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.recipient(), b.recipient());
    }

    #[test]
    fn test_write_and_read_identity() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(KEY_FILE_NAME);
        let pair = KeyPair::generate();
        pair.write_identity(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("AGE-SECRET-KEY-1"));

        let identity = read_identity(&path).unwrap();
        assert_eq!(identity.to_public().to_string(), pair.recipient());
    }

    #[test]
    #[cfg(unix)]
    fn test_key_file_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(KEY_FILE_NAME);
        KeyPair::generate().write_identity(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    #[cfg(unix)]
    fn test_existing_key_file_is_not_clobbered() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(KEY_FILE_NAME);
        fs::write(&path, b"something else").unwrap();

        let err = KeyPair::generate()
            .write_identity(&path)
            .expect_err("expected write to fail");
        assert_eq!(err.kind, Some(ErrorKind::Io));
        assert_eq!(fs::read(&path).unwrap(), b"something else");
    }

    #[test]
    fn test_read_identity_skips_comments() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys.txt");
        let identity = x25519::Identity::generate();
        let contents = format!(
            "# created: today\n# public key: {}\n\n{}\n",
            identity.to_public(),
            identity.to_string().expose_secret()
        );
        fs::write(&path, contents).unwrap();

        let parsed = read_identity(&path).unwrap();
        assert_eq!(parsed.to_public().to_string(), identity.to_public().to_string());
    }

    #[test]
    fn test_read_identity_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys.txt");
        fs::write(&path, "not a key\n").unwrap();

        let err = read_identity(&path).err().expect("expected parse failure");
        assert_eq!(err.category, ErrorCategory::User);
        assert!(err.to_string().contains("invalid identity"));
    }
}
