use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;
use wirerpc_connection::{Connection, ConnectionConfig, FuryRpc, RpcServiceMap};
use wirerpc_fury::ProtocolRepository;
use wirerpc_packet::Codec;
use wirerpc_transport::{connect, CodecConfig, Endpoint, MessageChannel, TransportError};

use crate::cmd::{codec_config, parse_duration, CallArgs};
use crate::demo;
use crate::exit::{connection_error, fury_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_call, CallOutput, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = parse_params(&args.args);

    let rpc = FuryRpc::new(RpcServiceMap::new());
    if let Some(dir) = &args.protocol_dir {
        let repository = ProtocolRepository::from_directory(dir)
            .map_err(|err| fury_error("protocol load failed", err))?;
        rpc.load_protocol(repository.methods().cloned());
    }
    if args.builtin_protocol {
        rpc.load_protocol(demo::protocols());
    }

    let channel =
        connect_with_timeout(&args.endpoint, codec_config(args.max_message_size), timeout).await?;
    let connection = Connection::with_config(
        channel,
        ConnectionConfig::default().with_request_timeout(timeout),
    );
    connection
        .listen()
        .map_err(|err| connection_error("listen failed", err))?;

    let codec = if rpc.remote_protocol(&args.method).is_some() {
        Codec::Fury
    } else {
        Codec::Json
    };
    debug!(method = %args.method, codec = codec.name(), "calling");

    let started = Instant::now();
    let result = rpc
        .invoke_proxy(&connection)
        .call(&args.method, params)
        .await
        .map_err(|err| connection_error("call failed", err))?;

    let out = CallOutput {
        method: &args.method,
        codec: codec.name(),
        elapsed_ms: (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0,
        result,
    };
    print_call(&out, format);
    Ok(SUCCESS)
}

/// JSON where possible, otherwise the literal text.
fn parse_params(raw: &[String]) -> Vec<Value> {
    raw.iter()
        .map(|arg| serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.clone())))
        .collect()
}

async fn connect_with_timeout(
    endpoint: &Endpoint,
    config: CodecConfig,
    timeout: Duration,
) -> CliResult<MessageChannel> {
    let start = Instant::now();
    loop {
        match connect(endpoint, config.clone()).await {
            Ok(channel) => return Ok(channel),
            Err(err) => {
                if !is_retryable_connect_error(&err) {
                    return Err(transport_error("connect failed", err));
                }
                if start.elapsed() >= timeout {
                    return Err(CliError::new(
                        crate::exit::TIMEOUT,
                        format!("connect to {endpoint} timed out after {timeout:?}"),
                    ));
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

fn is_retryable_connect_error(err: &TransportError) -> bool {
    match err {
        TransportError::Connect { source, .. } => matches!(
            source.kind(),
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
        ),
        _ => false,
    }
}
