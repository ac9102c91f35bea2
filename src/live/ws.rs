use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::session::{Transport, TransportConn, TransportEvent};

/// WebSocket implementation of the [`Transport`] seam.
///
/// Text frames in both directions; a socket error surfaces as one
/// [`TransportEvent::Error`] followed by the inbound channel closing.
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn connect(&self, setup: String) -> Result<TransportConn> {
        info!("connecting to live endpoint");

        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .context("websocket connect failed")?;
        let (mut sink, mut stream) = socket.split();

        sink.send(Message::Text(setup))
            .await
            .context("failed to send setup message")?;

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(64);
        let (inbound_tx, inbound_rx) = mpsc::channel::<TransportEvent>(64);

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    debug!("websocket send failed: {}", e);
                    return;
                }
            }
            // Outbound channel dropped: the session is closing
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(TransportEvent::Message(text)).await.is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {} // ping/pong/binary: nothing to surface
                    Err(e) => {
                        warn!("websocket receive failed: {}", e);
                        let _ = inbound_tx
                            .send(TransportEvent::Error(e.to_string()))
                            .await;
                        break;
                    }
                }
            }
            // Dropping inbound_tx closes the channel; the session reads
            // that as the remote closing.
        });

        Ok(TransportConn {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
