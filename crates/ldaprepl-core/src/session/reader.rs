//! Inbound side of a session

use crate::protocol::{ProtocolVersion, ReplicationMessage};
use crate::session::frame::FrameCodec;
use crate::Result;
use tokio::io::AsyncRead;

/// Reads frames and decodes them in arrival order
#[derive(Debug)]
pub struct SessionReader<R> {
    io: R,
    version: ProtocolVersion,
    codec: FrameCodec,
    received: u64,
}

impl<R: AsyncRead + Unpin> SessionReader<R> {
    /// Reader decoding at `version`
    pub fn new(io: R, version: ProtocolVersion, codec: FrameCodec) -> Self {
        Self {
            io,
            version,
            codec,
            received: 0,
        }
    }

    /// Protocol version messages are decoded with
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Messages decoded so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Next message, `None` once the peer closed the session
    ///
    /// A frame that fails to decode is an error; the session should be
    /// dropped since later frames may depend on it.
    pub async fn next_message(&mut self) -> Result<Option<ReplicationMessage>> {
        let Some(payload) = self.codec.read(&mut self.io).await? else {
            tracing::debug!("Peer closed session after {} messages", self.received);
            return Ok(None);
        };
        let msg = ReplicationMessage::decode_any(&payload, self.version)?;
        self.received += 1;
        tracing::trace!("Received {:?}", msg.message_type(self.version));
        Ok(Some(msg))
    }

    /// Give back the transport
    pub fn into_inner(self) -> R {
        self.io
    }
}
