//! Packet model and whole-packet encoding.
//!
//! A packet is one unit of protocol traffic: a 31-bit request id, a
//! direction, and a [`Value`] payload. The id and direction share a single
//! 32-bit header word: `header = (id << 1) | direction_bit`, direction bit 0
//! for requests and 1 for responses.

use std::collections::BTreeMap;

use crate::error::DecodeError;
use crate::protocol::frame::build_frame;
use crate::protocol::value::{Reader, Value};

/// Whether a packet initiates a round trip or completes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub id: u32,
    pub direction: Direction,
    pub payload: Value,
}

impl Packet {
    /// Build a request packet. The caller supplies a freshly assigned id.
    pub fn request(id: u32, payload: Value) -> Self {
        Self {
            id,
            direction: Direction::Request,
            payload,
        }
    }

    /// Build the response to a request id.
    pub fn response(id: u32, payload: Value) -> Self {
        Self {
            id,
            direction: Direction::Response,
            payload,
        }
    }

    /// Encode this packet as a complete wire frame (length prefix included).
    pub fn encode(&self) -> Vec<u8> {
        let direction_bit = match self.direction {
            Direction::Request => 0,
            Direction::Response => 1,
        };
        let header = (self.id << 1) | direction_bit;

        let mut payload = Vec::new();
        payload.extend_from_slice(&header.to_le_bytes());
        self.payload.encode_into(&mut payload);
        build_frame(&payload)
    }

    /// Decode a packet from a frame payload (the bytes after the length
    /// prefix). The value must span the rest of the frame exactly.
    pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
        let mut reader = Reader::new(bytes);
        let header = reader.read_u32()?;
        let direction = if header & 1 == 0 {
            Direction::Request
        } else {
            Direction::Response
        };
        let payload = reader.read_value()?;
        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Packet {
            id: header >> 1,
            direction,
            payload,
        })
    }
}

/// Application-level request carried inside a request packet's payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub command: String,
    pub args: Vec<String>,
}

impl Request {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// Parse a request from a packet payload. Returns `None` when the payload
    /// is not a map with a string `Command` and a string-list `Args` (a
    /// missing `Args` is treated as empty, matching the ping request shape).
    pub fn from_value(value: &Value) -> Option<Request> {
        let Value::Map(map) = value else {
            return None;
        };
        let command = match map.get("Command") {
            Some(Value::String(s)) => s.clone(),
            _ => return None,
        };
        let args = match map.get("Args") {
            Some(Value::StringList(args)) => args.clone(),
            Some(Value::Nil) | None => Vec::new(),
            _ => return None,
        };
        Some(Request { command, args })
    }

    /// The map payload for this request.
    pub fn to_value(&self) -> Value {
        Value::Map(BTreeMap::from([
            ("Command".to_string(), Value::String(self.command.clone())),
            ("Args".to_string(), Value::StringList(self.args.clone())),
        ]))
    }
}

/// The `{Error: true, Msg: ...}` payload used for every failed request.
pub fn error_value(msg: impl Into<String>) -> Value {
    Value::Map(BTreeMap::from([
        ("Error".to_string(), Value::Bool(true)),
        ("Msg".to_string(), Value::String(msg.into())),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::LENGTH_PREFIX_SIZE;

    fn strip_length_prefix(frame: &[u8]) -> &[u8] {
        &frame[LENGTH_PREFIX_SIZE..]
    }

    #[test]
    fn test_packet_roundtrip_request() {
        let packet = Packet::request(7, Request::new("ping", vec![]).to_value());
        let encoded = packet.encode();
        let decoded = Packet::decode(strip_length_prefix(&encoded)).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_packet_roundtrip_response() {
        let packet = Packet::response(12345, error_value("boom"));
        let encoded = packet.encode();
        let decoded = Packet::decode(strip_length_prefix(&encoded)).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_header_combines_id_and_direction() {
        let request = Packet::request(5, Value::Nil).encode();
        let response = Packet::response(5, Value::Nil).encode();

        let header = |frame: &[u8]| {
            let p = strip_length_prefix(frame);
            u32::from_le_bytes([p[0], p[1], p[2], p[3]])
        };
        assert_eq!(header(&request), 5 << 1);
        assert_eq!(header(&response), (5 << 1) | 1);
    }

    #[test]
    fn test_length_prefix_covers_payload() {
        let frame = Packet::request(1, Value::Int(9)).encode();
        let declared = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(declared, frame.len() - LENGTH_PREFIX_SIZE);
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut payload = Packet::request(1, Value::Nil).encode()[LENGTH_PREFIX_SIZE..].to_vec();
        payload.push(0xAA);
        assert_eq!(Packet::decode(&payload), Err(DecodeError::TrailingBytes));
    }

    #[test]
    fn test_request_from_value() {
        let value = Request::new("compile", vec!["a".to_string(), "b".to_string()]).to_value();
        let parsed = Request::from_value(&value).unwrap();
        assert_eq!(parsed.command, "compile");
        assert_eq!(parsed.args, vec!["a", "b"]);
    }

    #[test]
    fn test_request_from_value_rejects_non_map() {
        assert!(Request::from_value(&Value::Int(1)).is_none());
        assert!(Request::from_value(&Value::Map(BTreeMap::from([(
            "Args".to_string(),
            Value::StringList(vec![])
        )])))
        .is_none());
    }

    #[test]
    fn test_request_missing_args_is_empty() {
        let value = Value::Map(BTreeMap::from([(
            "Command".to_string(),
            Value::String("ping".to_string()),
        )]));
        let parsed = Request::from_value(&value).unwrap();
        assert!(parsed.args.is_empty());
    }

    #[test]
    fn test_error_value_shape() {
        let Value::Map(map) = error_value("oops") else {
            panic!("expected map");
        };
        assert_eq!(map.get("Error"), Some(&Value::Bool(true)));
        assert_eq!(map.get("Msg"), Some(&Value::String("oops".to_string())));
    }
}
