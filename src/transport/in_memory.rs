use anyhow::anyhow;
use tokio::sync::mpsc;

use crate::protocol::Message;
use crate::transport::Transport;

/// Two connected in-process endpoints. Dropping one closes the other's `recv`.
pub struct InMemoryTransport {
    outgoing: mpsc::UnboundedSender<Message>,
    incoming: mpsc::UnboundedReceiver<Message>,
}

impl InMemoryTransport {
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                outgoing: a_tx,
                incoming: b_rx,
            },
            Self {
                outgoing: b_tx,
                incoming: a_rx,
            },
        )
    }
}

#[async_trait::async_trait]
impl Transport for InMemoryTransport {
    async fn send(&mut self, msg: Message) -> anyhow::Result<()> {
        self.outgoing
            .send(msg)
            .map_err(|_| anyhow!("channel closed"))
    }

    async fn recv(&mut self) -> anyhow::Result<Message> {
        self.incoming
            .recv()
            .await
            .ok_or_else(|| anyhow!("channel closed"))
    }
}
