use std::io;

use anyhow::{anyhow, bail};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::{timeout, Duration};

use crate::protocol::Message;
use crate::transport::Transport;

/// Default timeout for a single send.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest frame body accepted in either direction (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Length-prefixed bincode frames over TCP.
///
/// Each frame is a 4-byte big-endian body length followed by the body.
/// Inbound bytes accumulate in a buffer that survives cancellation, so a
/// `recv` dropped mid-frame loses nothing.
pub struct TcpTransport {
    stream: TcpStream,
    inbound: Vec<u8>,
    send_timeout: Duration,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self::with_timeout(stream, DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_timeout(stream: TcpStream, send_timeout: Duration) -> Self {
        Self {
            stream,
            inbound: Vec::with_capacity(4096),
            send_timeout,
        }
    }

    pub async fn connect<A: ToSocketAddrs>(addr: A) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// Pop one complete frame off the inbound buffer, if there is one.
    fn take_frame(&mut self) -> anyhow::Result<Option<Message>> {
        if self.inbound.len() < LEN_PREFIX {
            return Ok(None);
        }
        let mut prefix = [0u8; LEN_PREFIX];
        prefix.copy_from_slice(&self.inbound[..LEN_PREFIX]);
        let len = u32::from_be_bytes(prefix) as usize;
        if len == 0 {
            bail!("invalid frame length: 0");
        }
        if len > MAX_FRAME_SIZE {
            bail!("frame too large: {} bytes (max: {})", len, MAX_FRAME_SIZE);
        }
        if self.inbound.len() < LEN_PREFIX + len {
            return Ok(None);
        }
        let msg = bincode::deserialize(&self.inbound[LEN_PREFIX..LEN_PREFIX + len])
            .map_err(|e| anyhow!("deserialization error: {}", e))?;
        self.inbound.drain(..LEN_PREFIX + len);
        Ok(Some(msg))
    }
}

fn io_error(e: io::Error) -> anyhow::Error {
    match e.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
            anyhow!("connection closed by peer")
        }
        _ => anyhow!("i/o error: {}", e),
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, msg: Message) -> anyhow::Result<()> {
        let body = bincode::serialize(&msg).map_err(|e| anyhow!("serialization error: {}", e))?;
        if body.len() > MAX_FRAME_SIZE {
            bail!(
                "frame too large: {} bytes (max: {})",
                body.len(),
                MAX_FRAME_SIZE
            );
        }
        let mut frame = Vec::with_capacity(LEN_PREFIX + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);

        timeout(self.send_timeout, self.stream.write_all(&frame))
            .await
            .map_err(|_| anyhow!("send timeout after {:?}", self.send_timeout))?
            .map_err(io_error)
    }

    async fn recv(&mut self) -> anyhow::Result<Message> {
        loop {
            if let Some(msg) = self.take_frame()? {
                return Ok(msg);
            }
            let read = self
                .stream
                .read_buf(&mut self.inbound)
                .await
                .map_err(io_error)?;
            if read == 0 {
                if self.inbound.is_empty() {
                    bail!("connection closed by peer");
                }
                bail!("connection closed mid-frame");
            }
        }
    }
}
