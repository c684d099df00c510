use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::codec::{CodecConfig, MessageCodec};
use crate::traits::MessageChannel;

/// Turn an async byte stream into a [`MessageChannel`].
///
/// Spawns one writer task and one reader task on the current runtime. The
/// writer drains outbound messages until every sink handle is dropped, then
/// shuts the write half down. The reader forwards decoded messages until EOF
/// or a framing error, at which point the inbound stream ends.
pub fn spawn_framed<T>(io: T, config: CodecConfig) -> MessageChannel
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(io);
    let mut frames_in = FramedRead::new(read_half, MessageCodec::with_config(config.clone()));
    let mut frames_out = FramedWrite::new(write_half, MessageCodec::with_config(config));

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Bytes>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Bytes>();

    tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = frames_out.send(message).await {
                warn!(error = %e, "stream write failed; dropping outbound channel");
                return;
            }
        }
        if let Err(e) = frames_out.close().await {
            debug!(error = %e, "stream shutdown failed");
        }
        debug!("stream writer finished");
    });

    tokio::spawn(async move {
        while let Some(next) = frames_in.next().await {
            match next {
                Ok(message) => {
                    if inbound_tx.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stream read failed; closing inbound channel");
                    break;
                }
            }
        }
        debug!("stream reader finished");
    });

    MessageChannel::new(Arc::new(outbound_tx), inbound_rx)
}
