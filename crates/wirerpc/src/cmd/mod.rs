use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use wirerpc_transport::{CodecConfig, Endpoint};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod describe;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the demo services on an endpoint.
    Serve(ServeArgs),
    /// Call a method on a running server and print the result.
    Call(CallArgs),
    /// List protocol descriptors (built-in or from a directory).
    Describe(DescribeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format).await,
        Command::Call(args) => call::run(args, format).await,
        Command::Describe(args) => describe::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endpoint to bind: tcp://host:port, unix:///path, host:port or a socket path.
    pub endpoint: Endpoint,
    /// Exit after the first connection closes.
    #[arg(long)]
    pub once: bool,
    /// Largest message accepted or sent, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_message_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Endpoint to connect to.
    pub endpoint: Endpoint,
    /// Method name.
    pub method: String,
    /// Positional arguments. Each is parsed as JSON, falling back to a plain string.
    pub args: Vec<String>,
    /// Load protocol descriptors (*.protocol.json) so matching calls use Fury.
    #[arg(long, value_name = "DIR", conflicts_with = "builtin_protocol")]
    pub protocol_dir: Option<PathBuf>,
    /// Load the descriptors of the built-in demo services.
    #[arg(long)]
    pub builtin_protocol: bool,
    /// Connect and call timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", env = "WIRERPC_TIMEOUT")]
    pub timeout: String,
    /// Largest message accepted or sent, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_message_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Directory of *.protocol.json files. Default: the built-in demo services.
    pub dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn codec_config(max_message_size: Option<usize>) -> CodecConfig {
    match max_message_size {
        Some(max) => CodecConfig::default().with_max_message_size(max),
        None => CodecConfig::default(),
    }
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
