//! Hub TCP ingress (spec §4.2, §5).
//!
//! One task per accepted connection, short-lived, parallel-accept — the
//! async analog of the teacher's per-agent reader thread
//! (`botster_hub_rs/src/agent.rs::Agent::spawn`), except here each
//! "session" is a single 45-byte read instead of a long-lived PTY stream.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::queue::{PendingWork, Sender};
use crate::wire;

/// Bytes written back to the client on successful validation (spec §6).
const ACK: u8 = 0x31;

const READ_DEADLINE: Duration = Duration::from_secs(5);

/// Accept connections on `address` until `shutdown` is triggered. Each
/// connection is validated and enqueued independently; expensive work
/// (checkout, replay) never runs on this path (spec §4.2).
pub async fn serve(address: &str, queue: Sender, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("binding Hub listener on {address}"))?;
    log::info!("Hub listening on {address}");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("accepting connection")?;
                let queue = queue.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &queue).await {
                        log::debug!("connection from {peer} closed without a reply: {e}");
                    }
                });
            }
            () = shutdown.cancelled() => {
                log::info!("Hub listener shutting down, no longer accepting connections");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, queue: &Sender) -> Result<()> {
    let mut buf = [0u8; wire::WIRE_SIZE];
    tokio::time::timeout(READ_DEADLINE, stream.read_exact(&mut buf))
        .await
        .context("read deadline exceeded")?
        .context("connection closed before 45 bytes were read")?;

    let report = wire::decode(&buf).context("rejected by wire codec")?;

    match queue.try_send(PendingWork::new(report)) {
        Ok(()) => {
            stream.write_ack().await?;
            Ok(())
        }
        Err(_) => {
            // Queue full: close without a reply (spec §5 backpressure
            // policy). Workers interpret the absence of the ACK byte as
            // "not accepted" and continue normally.
            anyhow::bail!("queue full, dropping connection without a reply")
        }
    }
}

trait WriteAck {
    async fn write_ack(&mut self) -> Result<()>;
}

impl WriteAck for TcpStream {
    async fn write_ack(&mut self) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        self.write_all(&[ACK]).await.context("writing ACK byte")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{BugKind, CommitId};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream as ClientStream;

    async fn start_server() -> (String, crate::queue::Receiver, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener); // free the port for `serve` to rebind; fine for a test

        let (tx, rx) = crate::queue::channel(crate::queue::DEFAULT_QUEUE_CAPACITY);
        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let server_address = address.clone();
        tokio::spawn(async move {
            let _ = serve(&server_address, tx, server_shutdown).await;
        });
        // Give the listener a moment to bind.
        tokio::time::sleep(Duration::from_millis(50)).await;
        (address, rx, shutdown)
    }

    #[tokio::test]
    async fn valid_report_gets_ack_and_is_enqueued() {
        let (address, mut rx, _shutdown) = start_server().await;

        let commit = CommitId::from_hex("0a0b0c0d0e0f101112131415161718191a1b1c1d").unwrap();
        let wire_bytes = wire::encode(BugKind::Correctness, 42, &commit);

        let mut client = ClientStream::connect(&address).await.unwrap();
        client.write_all(&wire_bytes).await.unwrap();

        let mut ack = [0u8; 1];
        client.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], ACK);

        let item = rx.recv().await.unwrap();
        assert_eq!(item.report.seed, 42);
    }

    #[tokio::test]
    async fn malformed_report_gets_no_reply_and_is_not_enqueued() {
        let (address, mut rx, _shutdown) = start_server().await;

        let mut client = ClientStream::connect(&address).await.unwrap();
        client.write_all(&[0u8; 45]).await.unwrap(); // all-zero: bad checksum
        client.shutdown().await.unwrap();

        let mut buf = [0u8; 1];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "no bytes should be written back");

        let nothing = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(nothing.is_err(), "nothing should have been enqueued");
    }

    #[tokio::test]
    async fn short_read_gets_no_reply() {
        let (address, _rx, _shutdown) = start_server().await;

        let mut client = ClientStream::connect(&address).await.unwrap();
        client.write_all(&[0u8; 10]).await.unwrap();
        client.shutdown().await.unwrap();

        let mut buf = [0u8; 1];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
