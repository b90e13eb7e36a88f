use crate::protocol::Message;

/// A bidirectional, message-framed connection.
#[async_trait::async_trait]
pub trait Transport: Send {
    async fn send(&mut self, msg: Message) -> anyhow::Result<()>;
    /// Wait for the next message. Must be safe to cancel, since callers race
    /// it against other sources in `select!`.
    async fn recv(&mut self) -> anyhow::Result<Message>;
}

pub mod in_memory;
pub mod tcp;
