use std::time::Duration;

use broadside::transport::tcp::MAX_FRAME_SIZE;
use broadside::{ConnectionId, Message, TcpTransport, Transport, PROTOCOL_VERSION};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

async fn raw_peer() -> anyhow::Result<(TcpStream, TcpTransport)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (accepted, transport) = tokio::join!(listener.accept(), TcpTransport::connect(addr));
    Ok((accepted?.0, transport?))
}

fn frame(msg: &Message) -> Vec<u8> {
    let body = bincode::serialize(msg).unwrap();
    let mut out = (body.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(&body);
    out
}

#[tokio::test(flavor = "multi_thread")]
async fn test_messages_round_trip_over_tcp() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await?;
        let mut transport = TcpTransport::new(socket);
        let hello = transport.recv().await?;
        assert_eq!(
            hello,
            Message::Hello {
                version: PROTOCOL_VERSION,
                name: "alice".to_string()
            }
        );
        transport
            .send(Message::Welcome {
                version: PROTOCOL_VERSION,
                connection: ConnectionId(7),
            })
            .await?;
        anyhow::Ok(())
    });

    let mut client = TcpTransport::connect(addr).await?;
    client
        .send(Message::Hello {
            version: PROTOCOL_VERSION,
            name: "alice".to_string(),
        })
        .await?;
    assert_eq!(
        client.recv().await?,
        Message::Welcome {
            version: PROTOCOL_VERSION,
            connection: ConnectionId(7),
        }
    );
    server.await??;

    // Peer gone: the next read reports a closed connection.
    assert!(client.recv().await.is_err());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_zero_length_frame_is_rejected() -> anyhow::Result<()> {
    let (mut raw, mut transport) = raw_peer().await?;
    raw.write_all(&[0, 0, 0, 0]).await?;
    let err = transport.recv().await.unwrap_err();
    assert!(err.to_string().contains("length: 0"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_oversized_prefix_is_rejected_without_reading_the_body() -> anyhow::Result<()> {
    let (mut raw, mut transport) = raw_peer().await?;
    raw.write_all(&((MAX_FRAME_SIZE as u32) + 1).to_be_bytes())
        .await?;
    let err = timeout(Duration::from_secs(2), transport.recv())
        .await?
        .unwrap_err();
    assert!(err.to_string().contains("too large"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_garbage_body_fails_to_decode() -> anyhow::Result<()> {
    let (mut raw, mut transport) = raw_peer().await?;
    raw.write_all(&[0, 0, 0, 4, 0xFF, 0xFF, 0xFF, 0xFF]).await?;
    let err = transport.recv().await.unwrap_err();
    assert!(err.to_string().contains("deserialization"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_truncated_frame_reports_close() -> anyhow::Result<()> {
    let (mut raw, mut transport) = raw_peer().await?;
    let bytes = frame(&Message::Status);
    raw.write_all(&bytes[..bytes.len() - 1]).await?;
    drop(raw);
    let err = transport.recv().await.unwrap_err();
    assert!(err.to_string().contains("mid-frame"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancelled_recv_keeps_partial_frame() -> anyhow::Result<()> {
    let (mut raw, mut transport) = raw_peer().await?;
    let first = frame(&Message::FireShot { x: 3, y: 4 });
    let second = frame(&Message::Status);

    let (head, tail) = first.split_at(3);
    raw.write_all(head).await?;
    raw.flush().await?;

    // Give up on the read while only part of the frame has arrived.
    tokio::select! {
        msg = transport.recv() => panic!("frame completed early: {:?}", msg),
        _ = sleep(Duration::from_millis(50)) => {}
    }

    let mut rest = tail.to_vec();
    rest.extend_from_slice(&second);
    raw.write_all(&rest).await?;

    assert_eq!(transport.recv().await?, Message::FireShot { x: 3, y: 4 });
    assert_eq!(transport.recv().await?, Message::Status);
    Ok(())
}
