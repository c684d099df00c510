//! Minimal server: echoes every request back in the codec it arrived in.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- call tcp://127.0.0.1:7400 echo '{"hello":"world"}'

use wirerpc::transport::{CodecConfig, Endpoint, EndpointListener};
use wirerpc::{Connection, ErrorEnvelope, Payload, RequestContext};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let endpoint: Endpoint = "tcp://127.0.0.1:7400".parse()?;
    let listener = EndpointListener::bind(&endpoint, CodecConfig::default()).await?;
    eprintln!("Listening on {}", listener.endpoint());

    loop {
        let channel = listener.accept().await?;
        let connection = Connection::new(channel);
        connection.on_request_not_found(
            |method: String, payload: Payload, _ctx: RequestContext| async move {
                eprintln!(
                    "{method}: {} bytes ({})",
                    payload.content.len(),
                    payload.codec.name()
                );
                Ok(payload)
            },
        );
        connection.on_notification_not_found(|method: &str, payload: Payload| {
            eprintln!("notification {method}: {} bytes", payload.content.len());
            Ok::<_, ErrorEnvelope>(())
        });
        connection.listen()?;
        eprintln!("Peer connected");
        tokio::spawn(async move {
            connection.closed().await;
            eprintln!("Peer disconnected");
        });
    }
}
