//! Primitive field encoding shared by every message
//!
//! - strings: UTF-8 followed by a NUL byte
//! - numbers: ASCII decimal followed by a NUL byte
//! - booleans, enums and small counters: one byte
//! - CSNs: 28 hex digits + NUL, or 14 raw bytes
//! - server states: `id\0csn\0...\0` in handshakes, length-prefixed
//!   binary elsewhere
//!
//! [`ByteReader`] never panics on short input: every accessor returns
//! [`Error::Malformed`] when the buffer runs out.

use crate::csn::{CSN_BYTE_LEN, Csn};
use crate::server_state::ServerState;
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::fmt::Display;
use std::str::FromStr;

/// Append-only message builder
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: BytesMut,
}

impl ByteWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer whose first byte is `tag`
    pub fn with_tag(tag: u8) -> Self {
        let mut writer = Self {
            buf: BytesMut::with_capacity(64),
        };
        writer.put_u8(tag);
        writer
    }

    /// Append one byte
    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Append a boolean as 0 or 1
    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// Append a NUL-terminated string
    pub fn put_str(&mut self, value: &str) -> Result<()> {
        if value.as_bytes().contains(&0) {
            return Err(Error::encode(format!(
                "string '{}' contains an embedded NUL",
                value.escape_debug()
            )));
        }
        self.buf.put_slice(value.as_bytes());
        self.buf.put_u8(0);
        Ok(())
    }

    /// Append an optional string, `None` encoded as the empty string
    pub fn put_opt_str(&mut self, value: Option<&str>) -> Result<()> {
        self.put_str(value.unwrap_or(""))
    }

    /// Append a number in NUL-terminated decimal form
    pub fn put_num<T: Display>(&mut self, value: T) {
        self.buf.put_slice(value.to_string().as_bytes());
        self.buf.put_u8(0);
    }

    /// Append a CSN in its string form
    pub fn put_csn(&mut self, csn: &Csn) {
        self.buf.put_slice(csn.to_string().as_bytes());
        self.buf.put_u8(0);
    }

    /// Append a CSN in its 14 byte form
    pub fn put_csn_bytes(&mut self, csn: &Csn) {
        self.buf.put_slice(&csn.to_bytes());
    }

    /// Append a server state in handshake form
    pub fn put_state_string(&mut self, state: &ServerState) {
        for (replica_id, csn) in state.iter() {
            self.put_num(replica_id);
            self.put_csn(&csn);
        }
        self.buf.put_u8(0);
    }

    /// Append a server state in length-prefixed binary form
    pub fn put_state_bytes(&mut self, state: &ServerState) {
        self.buf.put_slice(&state.to_bytes());
    }

    /// Append raw bytes
    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing was written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finished message bytes
    pub fn finish(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Cursor over an inbound message
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Wrap a buffer
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Read the leading tag and check it against `expected`
    pub fn expect_tag(buf: &'a [u8], expected: u8) -> Result<Self> {
        let mut reader = Self::new(buf);
        let tag = reader.get_u8()?;
        if tag != expected {
            return Err(Error::malformed(format!(
                "expected message type {}, found {}",
                expected, tag
            )));
        }
        Ok(reader)
    }

    /// Current offset
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True when everything was consumed
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read one byte
    pub fn get_u8(&mut self) -> Result<u8> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| Error::malformed(format!("truncated at offset {}", self.pos)))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Read a 0/1 boolean
    pub fn get_bool(&mut self) -> Result<bool> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::malformed(format!("invalid boolean byte {}", other))),
        }
    }

    /// Read `len` raw bytes
    pub fn get_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                Error::malformed(format!(
                    "need {} bytes at offset {}, {} left",
                    len,
                    self.pos,
                    self.remaining()
                ))
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read a NUL-terminated string
    pub fn get_str(&mut self) -> Result<String> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| Error::malformed(format!("unterminated string at offset {}", self.pos)))?;
        let value = std::str::from_utf8(&rest[..nul])
            .map_err(|e| Error::malformed(format!("invalid UTF-8 at offset {}: {}", self.pos, e)))?
            .to_string();
        self.pos += nul + 1;
        Ok(value)
    }

    /// Read a string, the empty string meaning `None`
    pub fn get_opt_str(&mut self) -> Result<Option<String>> {
        let value = self.get_str()?;
        Ok(if value.is_empty() { None } else { Some(value) })
    }

    /// Read a NUL-terminated decimal number
    pub fn get_num<T>(&mut self) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let offset = self.pos;
        let text = self.get_str()?;
        text.parse::<T>().map_err(|e| {
            Error::malformed(format!("invalid number '{}' at offset {}: {}", text, offset, e))
        })
    }

    /// Read a CSN in string form
    pub fn get_csn(&mut self) -> Result<Csn> {
        let text = self.get_str()?;
        text.parse()
    }

    /// Read a CSN in 14 byte form
    pub fn get_csn_bytes(&mut self) -> Result<Csn> {
        Csn::from_bytes(self.get_slice(CSN_BYTE_LEN)?)
    }

    /// Read a server state in handshake form
    pub fn get_state_string(&mut self) -> Result<ServerState> {
        let mut state = ServerState::new();
        loop {
            let key = self.get_str()?;
            if key.is_empty() {
                return Ok(state);
            }
            let replica_id: u16 = key
                .parse()
                .map_err(|e| Error::malformed(format!("invalid replica id '{}': {}", key, e)))?;
            let csn = self.get_csn()?;
            if csn.replica_id() != replica_id {
                return Err(Error::malformed(format!(
                    "server state key {} does not match CSN {}",
                    replica_id, csn
                )));
            }
            state.insert_unique(csn)?;
        }
    }

    /// Read a server state in binary form
    pub fn get_state_bytes(&mut self) -> Result<ServerState> {
        let (state, used) = ServerState::from_bytes(&self.buf[self.pos..])?;
        self.pos += used;
        Ok(state)
    }

    /// Everything up to the end of the buffer
    pub fn get_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    /// Fail unless the whole buffer was consumed
    pub fn finish(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::malformed(format!(
                "{} trailing bytes at offset {}",
                self.remaining(),
                self.pos
            )))
        }
    }
}
