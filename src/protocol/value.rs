//! Binary value codec.
//!
//! Every payload on the wire is a [`Value`]: a closed set of variants, each
//! encoded as a 1-byte type tag followed by its body. All integers and length
//! prefixes are little-endian u32. The map form sorts its keys before
//! encoding, so the same logical map always produces byte-identical output.
//!
//! ```text
//! value := tag:u8 body
//! tag ∈ {0:nil, 1:bool, 2:int32, 3:string, 4:stringlist, 5:bytes, 6:list, 7:map}
//! ```

use std::collections::BTreeMap;

use crate::error::DecodeError;

/// Type tags for the wire encoding.
mod tag {
    pub const NIL: u8 = 0;
    pub const BOOL: u8 = 1;
    pub const INT: u8 = 2;
    pub const STRING: u8 = 3;
    pub const STRING_LIST: u8 = 4;
    pub const BYTES: u8 = 5;
    pub const LIST: u8 = 6;
    pub const MAP: u8 = 7;
}

/// A protocol payload value.
///
/// The enum is the closed set: there is no way to construct an encodable
/// value outside it, so encoding is infallible. Maps use `BTreeMap` so the
/// sorted-key wire rule falls out of iteration order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i32),
    String(String),
    StringList(Vec<String>),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Encode this value, appending to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Nil => buf.push(tag::NIL),
            Value::Bool(v) => {
                buf.push(tag::BOOL);
                buf.push(u8::from(*v));
            }
            Value::Int(v) => {
                buf.push(tag::INT);
                buf.extend_from_slice(&(*v as u32).to_le_bytes());
            }
            Value::String(v) => {
                buf.push(tag::STRING);
                write_prefixed(buf, v.as_bytes());
            }
            Value::StringList(items) => {
                // The outer prefix is the total byte size of the block, not
                // the element count.
                buf.push(tag::STRING_LIST);
                let mut block = Vec::new();
                for item in items {
                    write_prefixed(&mut block, item.as_bytes());
                }
                write_prefixed(buf, &block);
            }
            Value::Bytes(v) => {
                buf.push(tag::BYTES);
                write_prefixed(buf, v);
            }
            Value::List(items) => {
                buf.push(tag::LIST);
                buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
                for item in items {
                    item.encode_into(buf);
                }
            }
            Value::Map(entries) => {
                // BTreeMap iterates in key order, which is the wire order.
                buf.push(tag::MAP);
                buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
                for (key, value) in entries {
                    write_prefixed(buf, key.as_bytes());
                    value.encode_into(buf);
                }
            }
        }
    }

    /// Encode this value into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Decode a value that must span the entire input.
    pub fn decode(bytes: &[u8]) -> Result<Value, DecodeError> {
        let mut reader = Reader::new(bytes);
        let value = reader.read_value()?;
        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(value)
    }
}

fn write_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Cursor over a byte slice used by the value and packet decoders.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, DecodeError> {
        if self.bytes.len() < 4 {
            return Err(DecodeError::Truncated);
        }
        let (head, rest) = self.bytes.split_at(4);
        self.bytes = rest;
        Ok(u32::from_le_bytes([head[0], head[1], head[2], head[3]]))
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let (&first, rest) = self.bytes.split_first().ok_or(DecodeError::Truncated)?;
        self.bytes = rest;
        Ok(first)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.bytes.len() < len {
            return Err(DecodeError::Truncated);
        }
        let (head, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Ok(head)
    }

    /// Read a u32 length prefix followed by that many bytes.
    fn read_prefixed(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_u32()? as usize;
        self.read_slice(len)
    }

    fn read_string(&mut self) -> Result<String, DecodeError> {
        let bytes = self.read_prefixed()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    pub(crate) fn read_value(&mut self) -> Result<Value, DecodeError> {
        match self.read_u8()? {
            tag::NIL => Ok(Value::Nil),
            tag::BOOL => Ok(Value::Bool(self.read_u8()? != 0)),
            tag::INT => Ok(Value::Int(self.read_u32()? as i32)),
            tag::STRING => Ok(Value::String(self.read_string()?)),
            tag::STRING_LIST => {
                // The block's end is its own byte budget, not an element
                // count: consume inner strings until the budget runs out.
                let block = self.read_prefixed()?;
                let mut inner = Reader::new(block);
                let mut items = Vec::new();
                while !inner.is_empty() {
                    items.push(inner.read_string()?);
                }
                Ok(Value::StringList(items))
            }
            tag::BYTES => Ok(Value::Bytes(self.read_prefixed()?.to_vec())),
            tag::LIST => {
                let count = self.read_u32()?;
                let mut items = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    items.push(self.read_value()?);
                }
                Ok(Value::List(items))
            }
            tag::MAP => {
                let count = self.read_u32()?;
                let mut entries = BTreeMap::new();
                for _ in 0..count {
                    let key = self.read_string()?;
                    let value = self.read_value()?;
                    entries.insert(key, value);
                }
                Ok(Value::Map(entries))
            }
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}
