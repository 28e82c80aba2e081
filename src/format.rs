//! Format tags for fixture contents
//!
//! The tag ends up as the extension of the encrypted file (`.enc.<tag>`), which
//! is how sops and the code under test tell what structure the plaintext has.

use crate::error::{ErrorCategory, ErrorKind, FixtureError, Result};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Format {
    Yaml,
    Json,
    Env,
    Ini,
    /// Any other extension, passed through to sops unchanged. sops treats
    /// unknown extensions as binary data.
    Other(String),
}

impl Format {
    /// Infer the format from a file path's extension.
    ///
    /// The extension must be introduced by a `.` that follows a non-empty
    /// file stem, so `config.yaml` yields `yaml` while `configfile`,
    /// `config.` and the dotfile `.yaml` are all rejected.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path.extension().ok_or_else(|| {
            FixtureError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidExtension,
                format!(
                    "file {} has no extension, sops won't be able to detect format",
                    path.display()
                ),
            )
        })?;
        let ext = ext.to_str().ok_or_else(|| {
            FixtureError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidExtension,
                format!("extension of {} is not valid UTF-8", path.display()),
            )
        })?;
        if ext.is_empty() {
            return Err(FixtureError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidExtension,
                format!("file {} has an empty extension", path.display()),
            ));
        }
        Self::from_tag(ext)
    }

    /// Map a bare tag (no leading `.`) to a format.
    ///
    /// Empty tags, tags starting with `.` and tags containing a path
    /// separator are rejected, since the tag becomes the final component of
    /// the encrypted file's name.
    pub fn from_tag(tag: &str) -> Result<Self> {
        check_tag(tag)?;
        Ok(match tag {
            "yaml" => Self::Yaml,
            "json" => Self::Json,
            "env" => Self::Env,
            "ini" => Self::Ini,
            other => Self::Other(other.to_string()),
        })
    }

    /// Re-check the tag of a value built directly, e.g. `Format::Other(..)`.
    pub(crate) fn validate(&self) -> Result<()> {
        check_tag(self.as_str())
    }

    /// The tag used as the final extension of the encrypted file.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Env => "env",
            Self::Ini => "ini",
            Self::Other(tag) => tag,
        }
    }

    /// Value for sops' `--input-type`/`--output-type` flags.
    ///
    /// sops reads plaintext from stdin, where it cannot see an extension, so
    /// the known formats are named explicitly. Unknown tags return `None` and
    /// sops falls back to its own detection.
    pub(crate) fn sops_type(&self) -> Option<&'static str> {
        match self {
            Self::Yaml => Some("yaml"),
            Self::Json => Some("json"),
            Self::Env => Some("dotenv"),
            Self::Ini => Some("ini"),
            Self::Other(tag) => match tag.as_str() {
                "yml" => Some("yaml"),
                "dotenv" => Some("dotenv"),
                _ => None,
            },
        }
    }
}

fn check_tag(tag: &str) -> Result<()> {
    let problem = if tag.is_empty() {
        "is empty"
    } else if tag.starts_with('.') {
        "starts with a '.'"
    } else if tag.contains(['/', '\\']) {
        "contains a path separator"
    } else {
        return Ok(());
    };
    Err(FixtureError::with_kind(
        ErrorCategory::User,
        ErrorKind::InvalidExtension,
        format!("format tag {tag:?} {problem}"),
    ))
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
