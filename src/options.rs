//! Generation options

use std::path::PathBuf;
use std::time::Duration;

/// How long sops may run before it is killed, unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings applied to a single fixture generation.
///
/// Build with struct-literal syntax over [`Options::default`] or with the
/// consuming setters; calling a setter twice keeps the last value.
///
/// ```
/// use std::time::Duration;
/// use testsops::Options;
///
/// let opts = Options::new()
///     .sops_binary("/opt/sops/bin/sops")
///     .timeout(Duration::from_secs(5));
/// assert_eq!(opts.timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Path of the `sops` executable. `None` looks `sops` up in `PATH`.
    pub sops_binary: Option<PathBuf>,
    /// Upper bound on the sops run. `None` waits for as long as it takes.
    pub timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            sops_binary: None,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given `sops` executable instead of searching `PATH`.
    pub fn sops_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.sops_binary = Some(path.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait for sops without any bound.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }
}
