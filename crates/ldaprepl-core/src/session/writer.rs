//! Single-writer task
//!
//! Any number of tasks may hold a [`SessionWriter`] and send concurrently.
//! Each caller encodes its own message; one spawned task owns the transport
//! and writes frames in the order they were queued.
//!
//! ```text
//!  caller ─┐ encode + frame
//!  caller ─┼─► mpsc queue ─► writer task ─► AsyncWrite
//!  caller ─┘        ◄── oneshot: written / failed
//! ```

use crate::protocol::{ProtocolVersion, ReplicationMessage};
use crate::session::frame::FrameCodec;
use crate::{Error, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

struct WriteRequest {
    frame: Vec<u8>,
    done: oneshot::Sender<Result<()>>,
}

/// Handle to the writer task of one session
#[derive(Clone)]
pub struct SessionWriter {
    tx: mpsc::Sender<WriteRequest>,
    version: ProtocolVersion,
    codec: FrameCodec,
}

impl std::fmt::Debug for SessionWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWriter")
            .field("version", &self.version)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl SessionWriter {
    /// Spawn the writer task over `io`
    ///
    /// The task ends when every handle was dropped or a write failed; its
    /// result reports the failure.
    pub fn spawn<W>(io: W, version: ProtocolVersion, codec: FrameCodec, queue_size: usize) -> (Self, JoinHandle<Result<()>>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let task = tokio::spawn(write_loop(io, codec, rx));
        (Self { tx, version, codec }, task)
    }

    /// Protocol version messages are encoded with
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Encode `msg` and wait until it was written to the transport
    pub async fn send(&self, msg: &ReplicationMessage) -> Result<()> {
        let payload = msg.encode(self.version)?;
        let frame = self.codec.encode(&payload)?;
        let (done, written) = oneshot::channel();
        self.tx
            .send(WriteRequest { frame, done })
            .await
            .map_err(|_| Error::session("session writer is closed"))?;
        written
            .await
            .map_err(|_| Error::session("session writer stopped before writing"))?
    }

    /// True once the writer task stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

async fn write_loop<W>(mut io: W, codec: FrameCodec, mut rx: mpsc::Receiver<WriteRequest>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(request) = rx.recv().await {
        let len = request.frame.len();
        let result = async {
            io.write_all(&request.frame).await?;
            io.flush().await?;
            Ok::<(), Error>(())
        }
        .await;
        match result {
            Ok(()) => {
                tracing::trace!("Session writer flushed {} byte frame", len);
                let _ = request.done.send(Ok(()));
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!("Session writer failed: {}", reason);
                let _ = request.done.send(Err(e));
                rx.close();
                return Err(Error::session(format!("write failed: {}", reason)));
            }
        }
    }
    tracing::debug!(
        "Session writer shutting down (frame limit {} bytes)",
        codec.max_frame_size()
    );
    io.shutdown().await?;
    Ok(())
}
