//! testsops CLI - sops-encrypted fixtures for shell-driven test setups
//!
//! Encrypts a file to a freshly generated age key and prints where the key
//! and the ciphertext ended up. Unlike the library, the fixture directory is
//! kept; removing it is up to the caller.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use testsops::{Format, Options, SOPS_AGE_KEY_FILE};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "testsops")]
#[command(version)]
#[command(about = "Generate sops-encrypted config fixtures.", long_about = None)]
struct Cli {
    /// Path to the sops executable (defaults to searching PATH)
    #[arg(long, global = true, env = "TESTSOPS_SOPS_BINARY", value_name = "FILE")]
    sops_binary: Option<PathBuf>,

    /// Seconds to wait for sops before killing it (0 waits forever)
    #[arg(long, global = true, default_value_t = 60, value_name = "SECS")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file into a new fixture directory
    #[command(alias = "e")]
    Encrypt {
        /// Path to the plaintext config file
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Format tag to use instead of the input file's extension
        #[arg(short, long, value_name = "TAG")]
        format: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = build_options(cli.sops_binary, cli.timeout);

    let result = match cli.command {
        Commands::Encrypt { input, format } => match format {
            Some(tag) => Format::from_tag(&tag)
                .and_then(|format| testsops::try_encrypt_file_as(&input, format, &options)),
            None => testsops::try_encrypt_file(&input, &options),
        },
    };

    match result {
        Ok(fixture) => {
            let (key_path, contents_path) = fixture.keep();
            println!("{}={}", SOPS_AGE_KEY_FILE, key_path.display());
            println!("ENCRYPTED_CONTENTS_PATH={}", contents_path.display());
        }
        Err(e) => {
            eprintln!("Error: {}", e.chain());
            process::exit(1);
        }
    }
}

fn build_options(sops_binary: Option<PathBuf>, timeout_secs: u64) -> Options {
    let mut options = Options::new();
    if let Some(path) = sops_binary {
        options = options.sops_binary(path);
    }
    if timeout_secs == 0 {
        options.no_timeout()
    } else {
        options.timeout(Duration::from_secs(timeout_secs))
    }
}
