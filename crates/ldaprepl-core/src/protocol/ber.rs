//! Minimal BER for LDAP attributes and modifications
//!
//! ```text
//! attribute    ::= SEQUENCE { type OCTET STRING, vals SET OF OCTET STRING }
//! modification ::= SEQUENCE { operation ENUMERATED, modification attribute }
//! ```

use crate::ldap::{Modification, ModificationType, RawAttribute};
use crate::{Error, Result};

const TAG_OCTET_STRING: u8 = 0x04;
const TAG_ENUMERATED: u8 = 0x0a;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;

fn put_len(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = (len as u64).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

fn put_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    put_len(out, content.len());
    out.extend_from_slice(content);
}

fn encode_attribute_into(out: &mut Vec<u8>, attr: &RawAttribute) {
    let mut values = Vec::new();
    for value in &attr.values {
        put_tlv(&mut values, TAG_OCTET_STRING, value.as_bytes());
    }
    let mut body = Vec::new();
    put_tlv(&mut body, TAG_OCTET_STRING, attr.name.as_bytes());
    put_tlv(&mut body, TAG_SET, &values);
    put_tlv(out, TAG_SEQUENCE, &body);
}

/// Concatenated BER attribute sequences
pub fn encode_attributes<'a, I>(attrs: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a RawAttribute>,
{
    let mut out = Vec::new();
    for attr in attrs {
        encode_attribute_into(&mut out, attr);
    }
    out
}

/// Concatenated BER modification sequences
pub fn encode_modifications(mods: &[Modification]) -> Vec<u8> {
    let mut out = Vec::new();
    for modification in mods {
        let mut body = Vec::new();
        put_tlv(&mut body, TAG_ENUMERATED, &[modification.kind as u8]);
        encode_attribute_into(&mut body, &modification.attribute);
        put_tlv(&mut out, TAG_SEQUENCE, &body);
    }
    out
}

/// Cursor over BER elements
struct BerReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BerReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn has_more(&self) -> bool {
        self.pos < self.buf.len()
    }

    fn byte(&mut self) -> Result<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| Error::malformed("BER element truncated"))?;
        self.pos += 1;
        Ok(b)
    }

    fn len(&mut self) -> Result<usize> {
        let first = self.byte()?;
        if first < 0x80 {
            return Ok(first as usize);
        }
        let count = (first & 0x7f) as usize;
        if count == 0 || count > 4 {
            return Err(Error::malformed(format!("unsupported BER length form {:#x}", first)));
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | self.byte()? as usize;
        }
        Ok(len)
    }

    fn element(&mut self, expected: u8) -> Result<&'a [u8]> {
        let tag = self.byte()?;
        if tag != expected {
            return Err(Error::malformed(format!(
                "expected BER tag {:#04x}, found {:#04x}",
                expected, tag
            )));
        }
        let len = self.len()?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| Error::malformed("BER element length exceeds buffer"))?;
        let content = &self.buf[self.pos..end];
        self.pos = end;
        Ok(content)
    }

    fn string(&mut self) -> Result<String> {
        let raw = self.element(TAG_OCTET_STRING)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| Error::malformed(format!("BER string is not UTF-8: {}", e)))
    }

    fn attribute(&mut self) -> Result<RawAttribute> {
        let mut seq = BerReader::new(self.element(TAG_SEQUENCE)?);
        let name = seq.string()?;
        let mut set = BerReader::new(seq.element(TAG_SET)?);
        let mut values = Vec::new();
        while set.has_more() {
            values.push(set.string()?);
        }
        seq.end()?;
        Ok(RawAttribute { name, values })
    }

    fn end(&self) -> Result<()> {
        if self.has_more() {
            Err(Error::malformed("unexpected data after BER element"))
        } else {
            Ok(())
        }
    }
}

/// Decode concatenated attribute sequences filling all of `bytes`
pub fn decode_attributes(bytes: &[u8]) -> Result<Vec<RawAttribute>> {
    let mut reader = BerReader::new(bytes);
    let mut attrs = Vec::new();
    while reader.has_more() {
        attrs.push(reader.attribute()?);
    }
    Ok(attrs)
}

/// Decode concatenated modification sequences filling all of `bytes`
pub fn decode_modifications(bytes: &[u8]) -> Result<Vec<Modification>> {
    let mut reader = BerReader::new(bytes);
    let mut mods = Vec::new();
    while reader.has_more() {
        let mut seq = BerReader::new(reader.element(TAG_SEQUENCE)?);
        let kind = seq.element(TAG_ENUMERATED)?;
        let kind = match kind {
            [value] => ModificationType::try_from(*value)?,
            _ => return Err(Error::malformed("modification type must be one byte")),
        };
        let attribute = seq.attribute()?;
        seq.end()?;
        mods.push(Modification { kind, attribute });
    }
    Ok(mods)
}

/// Length in bytes of the leading run of complete modification sequences
///
/// Legacy modify PDUs end the modification list with a NUL byte; this finds
/// where the BER data stops.
pub fn modifications_len(bytes: &[u8]) -> Result<usize> {
    let mut reader = BerReader::new(bytes);
    while reader.has_more() && reader.buf[reader.pos] == TAG_SEQUENCE {
        reader.element(TAG_SEQUENCE)?;
    }
    Ok(reader.pos)
}
