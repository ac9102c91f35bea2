// In-memory transport for exercising sessions and supervisors without a
// network: each connect hands the test a tap on both directions.
#![allow(dead_code)] // each test binary uses a different subset

use anyhow::Result;
use echosense::{Transport, TransportConn, TransportEvent};
use tokio::sync::mpsc;

/// The test's end of one accepted connection.
pub struct TestConn {
    /// The setup message the session sent on connect
    pub setup: String,
    /// Messages the session wrote to the wire
    pub sent: mpsc::Receiver<String>,
    /// Feed for inbound traffic; dropping it closes the connection
    pub inbound: mpsc::Sender<TransportEvent>,
}

pub struct TestTransport {
    conns: mpsc::UnboundedSender<TestConn>,
    auto_ack: bool,
    fail_connect: bool,
}

impl TestTransport {
    /// Transport that acknowledges setup immediately on connect.
    pub fn ready() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<TestConn>) {
        Self::build(true, false)
    }

    /// Transport that connects but leaves the ack to the test.
    pub fn silent() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<TestConn>) {
        Self::build(false, false)
    }

    /// Transport whose connect always fails.
    pub fn failing() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<TestConn>) {
        Self::build(false, true)
    }

    fn build(
        auto_ack: bool,
        fail_connect: bool,
    ) -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<TestConn>) {
        let (conns, accepted) = mpsc::unbounded_channel();
        (
            std::sync::Arc::new(Self {
                conns,
                auto_ack,
                fail_connect,
            }),
            accepted,
        )
    }
}

#[async_trait::async_trait]
impl Transport for TestTransport {
    async fn connect(&self, setup: String) -> Result<TransportConn> {
        if self.fail_connect {
            anyhow::bail!("connection refused");
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);

        if self.auto_ack {
            let _ = inbound_tx
                .send(TransportEvent::Message(r#"{"setupComplete":{}}"#.to_string()))
                .await;
        }

        let _ = self.conns.send(TestConn {
            setup,
            sent: outbound_rx,
            inbound: inbound_tx,
        });

        Ok(TransportConn {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

pub fn live_config() -> echosense::LiveConfig {
    echosense::LiveConfig {
        model: "models/test".to_string(),
        system_instruction: "transcribe".to_string(),
        input_transcription: true,
    }
}
