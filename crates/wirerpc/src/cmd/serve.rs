use std::sync::Arc;

use tracing::{info, warn};
use wirerpc_connection::{Connection, FuryRpc, ServiceRegistry};
use wirerpc_transport::{EndpointListener, MessageChannel};

use crate::cmd::{codec_config, ServeArgs};
use crate::demo;
use crate::exit::{connection_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_listening, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = EndpointListener::bind(&args.endpoint, codec_config(args.max_message_size))
        .await
        .map_err(|err| transport_error("bind failed", err))?;
    print_listening(listener.endpoint(), format);

    let registry = Arc::new(demo::registry());
    let rpc = FuryRpc::new(demo::rpc_services());
    info!(
        endpoint = %listener.endpoint(),
        typed = ?rpc.services().names(),
        untyped = ?registry.names(),
        "serving"
    );

    let mut peers = 0u64;
    loop {
        let channel = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(channel) => channel,
                Err(err) => return Err(transport_error("accept failed", err)),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        };
        peers += 1;

        let task = serve_peer(channel, &rpc, &registry)
            .map_err(|err| connection_error("listen failed", err))?;
        info!(peer = peers, "peer connected");

        if args.once {
            tokio::select! {
                joined = task => {
                    if let Err(err) = joined {
                        warn!(error = %err, "connection task failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
            }
            break;
        }
    }

    Ok(SUCCESS)
}

/// Wire one accepted channel to the demo services and start its loop.
///
/// Typed methods get dedicated handlers; every other name falls through to
/// the registry. The returned task owns the connection and finishes when the
/// peer goes away.
fn serve_peer(
    channel: MessageChannel,
    rpc: &FuryRpc,
    registry: &Arc<ServiceRegistry>,
) -> wirerpc_connection::Result<tokio::task::JoinHandle<()>> {
    let connection = Connection::new(channel);
    rpc.listen(&connection);
    connection.serve_registry(Arc::clone(registry));
    connection.listen()?;
    Ok(tokio::spawn(async move { connection.closed().await }))
}
