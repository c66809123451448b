//! Session framing
//!
//! Every message travels in one frame validated with CRC32:
//!
//! ```text
//! [length:4 LE][payload:N][crc32:4 LE]
//! ```
//!
//! The CRC covers the length and the payload.

use crate::{Error, Result};
use crc32fast::Hasher;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Length prefix size
pub const LENGTH_LEN: usize = 4;

/// Trailing checksum size
pub const CRC_LEN: usize = 4;

/// Frame encoder and decoder bound to a maximum payload size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Codec refusing payloads larger than `max_frame_size`
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Largest accepted payload
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.max_frame_size || u32::try_from(len).is_err() {
            return Err(Error::session(format!(
                "frame of {} bytes exceeds the {} byte limit",
                len, self.max_frame_size
            )));
        }
        Ok(())
    }

    /// Wrap a payload into a frame
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        self.check_len(payload.len())?;
        let mut buf = Vec::with_capacity(LENGTH_LEN + payload.len() + CRC_LEN);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(payload);
        let mut hasher = Hasher::new();
        hasher.update(&buf);
        let crc = hasher.finalize();
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Extract the payload of one complete frame
    pub fn decode<'a>(&self, buf: &'a [u8]) -> Result<&'a [u8]> {
        if buf.len() < LENGTH_LEN + CRC_LEN {
            return Err(Error::session("frame too short"));
        }
        let (head, rest) = buf.split_at(LENGTH_LEN);
        let length = read_u32(head) as usize;
        self.check_len(length)?;
        if rest.len() != length + CRC_LEN {
            return Err(Error::session(format!(
                "frame announces {} bytes, carries {}",
                length,
                rest.len().saturating_sub(CRC_LEN)
            )));
        }
        let crc_offset = LENGTH_LEN + length;
        verify_crc(&buf[..crc_offset], read_u32(&buf[crc_offset..]))?;
        Ok(&buf[LENGTH_LEN..crc_offset])
    }

    /// Write one frame and flush
    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W, payload: &[u8]) -> Result<()> {
        let frame = self.encode(payload)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        tracing::trace!("Wrote frame of {} bytes", payload.len());
        Ok(())
    }

    /// Read one frame, `None` when the peer closed the stream between frames
    pub async fn read<R: AsyncRead + Unpin>(&self, reader: &mut R) -> Result<Option<Vec<u8>>> {
        let mut head = [0u8; LENGTH_LEN];
        // End of stream is only a clean close before the first length byte
        if reader.read(&mut head[..1]).await? == 0 {
            return Ok(None);
        }
        match reader.read_exact(&mut head[1..]).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(Error::session("stream closed inside a frame header"));
            }
            Err(e) => return Err(e.into()),
        }
        let length = u32::from_le_bytes(head) as usize;
        self.check_len(length)?;

        let mut body = vec![0u8; length + CRC_LEN];
        match reader.read_exact(&mut body).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(Error::session(format!(
                    "stream closed inside a frame of {} bytes",
                    length
                )));
            }
            Err(e) => return Err(e.into()),
        }
        let stored = read_u32(&body[length..]);
        body.truncate(length);

        let mut hasher = Hasher::new();
        hasher.update(&head);
        hasher.update(&body);
        check_crc(stored, hasher.finalize())?;
        tracing::trace!("Read frame of {} bytes", length);
        Ok(Some(body))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

fn verify_crc(covered: &[u8], stored: u32) -> Result<()> {
    let mut hasher = Hasher::new();
    hasher.update(covered);
    check_crc(stored, hasher.finalize())
}

fn check_crc(stored: u32, computed: u32) -> Result<()> {
    if stored != computed {
        return Err(Error::session(format!(
            "CRC mismatch: expected {:x}, got {:x}",
            stored, computed
        )));
    }
    Ok(())
}
