//! testsops - sops-encrypted config fixtures for tests
//!
//! Generates a throwaway age key pair, runs the `sops` binary to encrypt
//! caller-supplied plaintext to it, and hands back the paths needed to
//! decrypt the result. See [`fixture`] for the entry points.

#![forbid(unsafe_code)]

pub mod error;
pub mod fixture;
pub mod format;
pub mod keys;
pub mod options;
pub mod sops;

pub use error::{ErrorCategory, ErrorKind, FixtureError, Result};
pub use fixture::{
    Fixture, SOPS_AGE_KEY_FILE, encrypt, encrypt_env, encrypt_file, encrypt_file_as, encrypt_ini,
    encrypt_json, encrypt_yaml, try_encrypt, try_encrypt_env, try_encrypt_file,
    try_encrypt_file_as, try_encrypt_ini, try_encrypt_json, try_encrypt_yaml,
};
pub use format::Format;
pub use options::Options;
