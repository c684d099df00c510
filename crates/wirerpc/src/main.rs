mod cmd;
mod demo;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::exit::{CliError, INTERNAL};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "wirerpc", version, about = "Binary multiplexed RPC CLI")]
struct Cli {
    /// Output format. Default: table on a terminal, JSON otherwise.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "WIRERPC_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))
        .and_then(|runtime| runtime.block_on(cmd::run(cli.command, format)));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_with_trailing_args() {
        let cli = Cli::try_parse_from([
            "wirerpc",
            "call",
            "tcp://127.0.0.1:7000",
            "add",
            "1",
            "2",
            "--builtin-protocol",
        ])
        .expect("call args should parse");

        let Command::Call(args) = cli.command else {
            panic!("expected call");
        };
        assert_eq!(args.method, "add");
        assert_eq!(args.args, vec!["1", "2"]);
        assert!(args.builtin_protocol);
    }

    #[test]
    fn rejects_conflicting_protocol_sources() {
        let err = Cli::try_parse_from([
            "wirerpc",
            "call",
            "127.0.0.1:7000",
            "add",
            "--builtin-protocol",
            "--protocol-dir",
            "/tmp/protocols",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_bad_endpoint() {
        let err = Cli::try_parse_from(["wirerpc", "serve", "nowhere"])
            .expect_err("endpoint should be validated");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[cfg(unix)]
    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from(["wirerpc", "serve", "/tmp/wirerpc.sock", "--once"])
            .expect("serve args should parse");
        assert!(matches!(cli.command, Command::Serve(ref args) if args.once));
    }
}
