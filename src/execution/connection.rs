//! One task per worker connection.
//!
//! The reader half forwards frames to the processor in arrival order. The
//! writer half drains the connection's [`WorkerLink`] queue; once the
//! dispatcher drops the link the writer shuts the socket and the reader
//! follows.

use bytes::Bytes;
use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::command::BrokerCommand;
use super::framing::{read_frame, write_frame};
use crate::dispatch::{WorkerId, WorkerLink};

pub(crate) async fn serve_connection(
    worker_id: WorkerId,
    stream: TcpStream,
    peer: SocketAddr,
    commands: mpsc::Sender<BrokerCommand>,
    max_frame_len: u32,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (link, outbound) = WorkerLink::channel();
    if commands
        .send(BrokerCommand::ConnectionOpened { worker_id, link })
        .await
        .is_err()
    {
        return;
    }

    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut writer_task = tokio::spawn(write_loop(worker_id, writer, outbound, max_frame_len));

    loop {
        tokio::select! {
            frame = read_frame(&mut reader, max_frame_len) => {
                match frame {
                    Ok(Some(payload)) => {
                        if commands.send(BrokerCommand::Frame { worker_id, payload }).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!(worker_id = %worker_id, peer = %peer, "Connection closed by worker");
                        break;
                    }
                    Err(error) => {
                        warn!(worker_id = %worker_id, peer = %peer, error = %error, "Error reading from worker");
                        break;
                    }
                }
            }

            _ = &mut writer_task => {
                debug!(worker_id = %worker_id, "Worker link released, closing connection");
                break;
            }

            _ = shutdown_rx.recv() => {
                debug!(worker_id = %worker_id, "Connection shutting down");
                break;
            }
        }
    }

    writer_task.abort();
    let _ = commands
        .send(BrokerCommand::ConnectionClosed { worker_id })
        .await;
}

async fn write_loop(
    worker_id: WorkerId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    max_frame_len: u32,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(error) = write_frame(&mut writer, &frame, max_frame_len).await {
            warn!(worker_id = %worker_id, error = %error, "Failed to write to worker");
            return;
        }
    }

    let _ = writer.shutdown().await;
}
