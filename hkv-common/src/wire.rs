//! # Wire Protocol
//!
//! A minimal length-prefixed binary frame for the request/reply RPC
//! described in the spec's external-interface section. The exact bytes are
//! an implementation detail (the spec treats wire framing as an opaque
//! transport); this module picks one encoding so the rest of the crate has
//! something concrete to dispatch and forward.
//!
//! ## Frame Shape
//!
//! ```text
//! +-----------+----------------------+
//! | len: u32  | payload: len bytes   |
//! +-----------+----------------------+
//! ```
//!
//! `len` is the payload length in network byte order, not including itself.
//! A `FrameReader` accumulates bytes from a connection and yields complete
//! payloads one at a time, mirroring the buffered incremental parse the
//! teacher's RESP2 parser used for text commands.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::HkvError;

/// Maximum accepted payload size. Guards against a corrupt or hostile length
/// prefix forcing an unbounded allocation.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// A cache item as carried on the wire: key, opaque value, and an absolute
/// expiration timestamp in nanoseconds since epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub expiration_ns: i64,
}

/// A successful reply: a human-readable message and an optional item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: String,
    pub item: Option<Item>,
}

impl Reply {
    pub fn ok() -> Self {
        Reply { message: "OK".to_string(), item: None }
    }

    pub fn ok_item(item: Item) -> Self {
        Reply { message: "OK".to_string(), item: Some(item) }
    }
}

/// Every request the wire protocol can carry, matching §6's RPC table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Add { key: Vec<u8>, value: Vec<u8>, expiration_ns: i64 },
    Set { key: Vec<u8>, value: Vec<u8>, expiration_ns: i64 },
    Get { key: Vec<u8> },
    Delete { key: Vec<u8> },
    DeleteAll,
    Increment { key: Vec<u8>, delta: i64 },
    Decrement { key: Vec<u8>, delta: i64 },
    Touch { key: Vec<u8>, expiration_ns: i64 },
    CompareAndSwap { key: Vec<u8>, value: Vec<u8>, expiration_ns: i64, cas_token: u64 },
    Replace { key: Vec<u8>, value: Vec<u8>, expiration_ns: i64 },
    AddServer { addr: String },
    DropServer { addr: String },
    CheckConnection,
}

impl Request {
    /// The routing key for this request, if any.
    ///
    /// Keyless ops (`DeleteAll`, membership control, health probes) return
    /// `None`; the Router handles these locally without consulting the Ring.
    pub fn routing_key(&self) -> Option<&[u8]> {
        match self {
            Request::Add { key, .. }
            | Request::Set { key, .. }
            | Request::Get { key }
            | Request::Delete { key }
            | Request::Increment { key, .. }
            | Request::Decrement { key, .. }
            | Request::Touch { key, .. }
            | Request::CompareAndSwap { key, .. }
            | Request::Replace { key, .. } => Some(key.as_slice()),
            Request::DeleteAll
            | Request::AddServer { .. }
            | Request::DropServer { .. }
            | Request::CheckConnection => None,
        }
    }

    const OP_ADD: u8 = 0;
    const OP_SET: u8 = 1;
    const OP_GET: u8 = 2;
    const OP_DELETE: u8 = 3;
    const OP_DELETE_ALL: u8 = 4;
    const OP_INCREMENT: u8 = 5;
    const OP_DECREMENT: u8 = 6;
    const OP_TOUCH: u8 = 7;
    const OP_CAS: u8 = 8;
    const OP_REPLACE: u8 = 9;
    const OP_ADD_SERVER: u8 = 10;
    const OP_DROP_SERVER: u8 = 11;
    const OP_CHECK_CONNECTION: u8 = 12;

    /// Encodes this request as a wire payload (without the length prefix).
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Request::Add { key, value, expiration_ns } => {
                out.push(Self::OP_ADD);
                put_bytes16(out, key);
                put_bytes32(out, value);
                put_i64(out, *expiration_ns);
            }
            Request::Set { key, value, expiration_ns } => {
                out.push(Self::OP_SET);
                put_bytes16(out, key);
                put_bytes32(out, value);
                put_i64(out, *expiration_ns);
            }
            Request::Get { key } => {
                out.push(Self::OP_GET);
                put_bytes16(out, key);
            }
            Request::Delete { key } => {
                out.push(Self::OP_DELETE);
                put_bytes16(out, key);
            }
            Request::DeleteAll => {
                out.push(Self::OP_DELETE_ALL);
            }
            Request::Increment { key, delta } => {
                out.push(Self::OP_INCREMENT);
                put_bytes16(out, key);
                put_i64(out, *delta);
            }
            Request::Decrement { key, delta } => {
                out.push(Self::OP_DECREMENT);
                put_bytes16(out, key);
                put_i64(out, *delta);
            }
            Request::Touch { key, expiration_ns } => {
                out.push(Self::OP_TOUCH);
                put_bytes16(out, key);
                put_i64(out, *expiration_ns);
            }
            Request::CompareAndSwap { key, value, expiration_ns, cas_token } => {
                out.push(Self::OP_CAS);
                put_bytes16(out, key);
                put_bytes32(out, value);
                put_i64(out, *expiration_ns);
                out.extend_from_slice(&cas_token.to_be_bytes());
            }
            Request::Replace { key, value, expiration_ns } => {
                out.push(Self::OP_REPLACE);
                put_bytes16(out, key);
                put_bytes32(out, value);
                put_i64(out, *expiration_ns);
            }
            Request::AddServer { addr } => {
                out.push(Self::OP_ADD_SERVER);
                put_bytes16(out, addr.as_bytes());
            }
            Request::DropServer { addr } => {
                out.push(Self::OP_DROP_SERVER);
                put_bytes16(out, addr.as_bytes());
            }
            Request::CheckConnection => {
                out.push(Self::OP_CHECK_CONNECTION);
            }
        }
    }

    /// Decodes a request from a complete wire payload.
    pub fn decode(payload: &[u8]) -> Result<Self, HkvError> {
        let mut cursor = Cursor::new(payload);
        let op = cursor.take_u8()?;
        let request = match op {
            Self::OP_ADD => Request::Add {
                key: cursor.take_bytes16()?,
                value: cursor.take_bytes32()?,
                expiration_ns: cursor.take_i64()?,
            },
            Self::OP_SET => Request::Set {
                key: cursor.take_bytes16()?,
                value: cursor.take_bytes32()?,
                expiration_ns: cursor.take_i64()?,
            },
            Self::OP_GET => Request::Get { key: cursor.take_bytes16()? },
            Self::OP_DELETE => Request::Delete { key: cursor.take_bytes16()? },
            Self::OP_DELETE_ALL => Request::DeleteAll,
            Self::OP_INCREMENT => Request::Increment {
                key: cursor.take_bytes16()?,
                delta: cursor.take_i64()?,
            },
            Self::OP_DECREMENT => Request::Decrement {
                key: cursor.take_bytes16()?,
                delta: cursor.take_i64()?,
            },
            Self::OP_TOUCH => Request::Touch {
                key: cursor.take_bytes16()?,
                expiration_ns: cursor.take_i64()?,
            },
            Self::OP_CAS => Request::CompareAndSwap {
                key: cursor.take_bytes16()?,
                value: cursor.take_bytes32()?,
                expiration_ns: cursor.take_i64()?,
                cas_token: cursor.take_u64()?,
            },
            Self::OP_REPLACE => Request::Replace {
                key: cursor.take_bytes16()?,
                value: cursor.take_bytes32()?,
                expiration_ns: cursor.take_i64()?,
            },
            Self::OP_ADD_SERVER => Request::AddServer { addr: cursor.take_string16()? },
            Self::OP_DROP_SERVER => Request::DropServer { addr: cursor.take_string16()? },
            Self::OP_CHECK_CONNECTION => Request::CheckConnection,
            _ => return Err(HkvError::Internal("unknown opcode".to_string())),
        };
        cursor.expect_exhausted()?;
        Ok(request)
    }
}

/// Encodes a Router result (`Reply` on success, `HkvError` on failure) as a
/// wire payload. Errors propagate verbatim through forwarding hops, so the
/// wire carries the full error taxonomy rather than a single generic code.
pub fn encode_result(result: &Result<Reply, HkvError>, out: &mut Vec<u8>) {
    match result {
        Ok(reply) => {
            out.push(0);
            put_string16(out, &reply.message);
            match &reply.item {
                Some(item) => {
                    out.push(1);
                    put_bytes16(out, &item.key);
                    put_bytes32(out, &item.value);
                    put_i64(out, item.expiration_ns);
                }
                None => out.push(0),
            }
        }
        Err(err) => {
            out.push(1);
            out.push(err.code());
            put_string16(out, &err.to_string());
        }
    }
}

/// Decodes a Router result from a complete wire payload.
pub fn decode_result(payload: &[u8]) -> Result<Result<Reply, HkvError>, HkvError> {
    let mut cursor = Cursor::new(payload);
    let tag = cursor.take_u8()?;
    let result = match tag {
        0 => {
            let message = cursor.take_string16()?;
            let has_item = cursor.take_u8()?;
            let item = if has_item == 1 {
                Some(Item {
                    key: cursor.take_bytes16()?,
                    value: cursor.take_bytes32()?,
                    expiration_ns: cursor.take_i64()?,
                })
            } else {
                None
            };
            Ok(Reply { message, item })
        }
        1 => {
            let code = cursor.take_u8()?;
            let message = cursor.take_string16()?;
            Err(HkvError::from_code(code, message))
        }
        _ => return Err(HkvError::Internal("unknown result tag".to_string())),
    };
    cursor.expect_exhausted()?;
    Ok(result)
}

/// Wraps a payload with its `len` prefix and appends it to `out`.
pub fn frame(payload: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
}

/// Incrementally extracts length-prefixed payloads from a growing buffer.
///
/// Mirrors the teacher's `RespParser`: call `parse` after appending newly
/// read bytes; it returns `Ok(Some(payload))` once a full frame is
/// available, consuming it from the buffer, or `Ok(None)` when more bytes
/// are needed.
#[derive(Debug, Default)]
pub struct FrameReader;

impl FrameReader {
    pub fn new() -> Self {
        FrameReader
    }

    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, HkvError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if len > MAX_FRAME_LEN {
            return Err(HkvError::Internal("frame too large".to_string()));
        }
        let total = 4 + len as usize;
        if buf.len() < total {
            return Ok(None);
        }
        buf.advance(4);
        Ok(Some(buf.split_to(len as usize).freeze()))
    }
}

fn put_bytes16(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
}

fn put_bytes32(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

fn put_string16(out: &mut Vec<u8>, value: &str) {
    put_bytes16(out, value.as_bytes());
}

fn put_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Minimal cursor over a byte slice used while decoding a frame payload.
///
/// Every `take_*` call returns `HkvError::Internal` on underrun so a
/// truncated or corrupt frame cannot panic the connection task.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], HkvError> {
        if self.remaining().len() < len {
            return Err(HkvError::Internal("truncated frame".to_string()));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, HkvError> {
        Ok(self.take(1)?[0])
    }

    fn take_u64(&mut self) -> Result<u64, HkvError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("exactly 8 bytes");
        Ok(u64::from_be_bytes(bytes))
    }

    fn take_i64(&mut self) -> Result<i64, HkvError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("exactly 8 bytes");
        Ok(i64::from_be_bytes(bytes))
    }

    fn take_bytes16(&mut self) -> Result<Vec<u8>, HkvError> {
        let len_bytes: [u8; 2] = self.take(2)?.try_into().expect("exactly 2 bytes");
        let len = u16::from_be_bytes(len_bytes) as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn take_bytes32(&mut self) -> Result<Vec<u8>, HkvError> {
        let len_bytes: [u8; 4] = self.take(4)?.try_into().expect("exactly 4 bytes");
        let len = u32::from_be_bytes(len_bytes) as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn take_string16(&mut self) -> Result<String, HkvError> {
        let bytes = self.take_bytes16()?;
        String::from_utf8(bytes).map_err(|_| HkvError::Internal("invalid utf-8".to_string()))
    }

    fn expect_exhausted(&self) -> Result<(), HkvError> {
        if self.remaining().is_empty() {
            Ok(())
        } else {
            Err(HkvError::Internal("trailing bytes in frame".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_request(req: Request) {
        let mut payload = Vec::new();
        req.encode(&mut payload);
        let decoded = Request::decode(&payload).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn roundtrips_every_request_variant() {
        roundtrip_request(Request::Add {
            key: b"k".to_vec(),
            value: b"v".to_vec(),
            expiration_ns: 42,
        });
        roundtrip_request(Request::Set {
            key: b"k".to_vec(),
            value: b"v".to_vec(),
            expiration_ns: -1,
        });
        roundtrip_request(Request::Get { key: b"k".to_vec() });
        roundtrip_request(Request::Delete { key: b"k".to_vec() });
        roundtrip_request(Request::DeleteAll);
        roundtrip_request(Request::Increment { key: b"k".to_vec(), delta: 5 });
        roundtrip_request(Request::Decrement { key: b"k".to_vec(), delta: -5 });
        roundtrip_request(Request::Touch { key: b"k".to_vec(), expiration_ns: 7 });
        roundtrip_request(Request::CompareAndSwap {
            key: b"k".to_vec(),
            value: b"v".to_vec(),
            expiration_ns: 7,
            cas_token: 99,
        });
        roundtrip_request(Request::Replace {
            key: b"k".to_vec(),
            value: b"v".to_vec(),
            expiration_ns: 7,
        });
        roundtrip_request(Request::AddServer { addr: "a:1".to_string() });
        roundtrip_request(Request::DropServer { addr: "b:2".to_string() });
        roundtrip_request(Request::CheckConnection);
    }

    #[test]
    fn routing_key_is_none_for_keyless_ops() {
        assert_eq!(Request::DeleteAll.routing_key(), None);
        assert_eq!(Request::CheckConnection.routing_key(), None);
        assert_eq!(
            Request::AddServer { addr: "a".to_string() }.routing_key(),
            None
        );
    }

    #[test]
    fn routing_key_is_some_for_keyed_ops() {
        let req = Request::Get { key: b"hello".to_vec() };
        assert_eq!(req.routing_key(), Some(b"hello".as_slice()));
    }

    #[test]
    fn roundtrips_ok_reply_without_item() {
        let result: Result<Reply, HkvError> = Ok(Reply::ok());
        let mut payload = Vec::new();
        encode_result(&result, &mut payload);
        let decoded = decode_result(&payload).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn roundtrips_ok_reply_with_item() {
        let item = Item { key: b"k".to_vec(), value: b"v".to_vec(), expiration_ns: 9 };
        let result: Result<Reply, HkvError> = Ok(Reply::ok_item(item));
        let mut payload = Vec::new();
        encode_result(&result, &mut payload);
        let decoded = decode_result(&payload).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn roundtrips_every_error_variant() {
        for err in [
            HkvError::NotFound,
            HkvError::AlreadyExists,
            HkvError::TooLarge,
            HkvError::NotNumeric,
            HkvError::Unavailable,
            HkvError::Unimplemented,
        ] {
            let result: Result<Reply, HkvError> = Err(err.clone());
            let mut payload = Vec::new();
            encode_result(&result, &mut payload);
            let decoded = decode_result(&payload).unwrap();
            assert_eq!(decoded, result);
        }
    }

    #[test]
    fn frame_reader_waits_for_full_frame() {
        let mut reader = FrameReader::new();
        let mut payload = Vec::new();
        Request::Get { key: b"abc".to_vec() }.encode(&mut payload);

        let mut framed = Vec::new();
        frame(&payload, &mut framed);

        let mut buf = BytesMut::from(&framed[..3]);
        assert_eq!(reader.parse(&mut buf).unwrap(), None);

        buf.extend_from_slice(&framed[3..]);
        let parsed = reader.parse(&mut buf).unwrap().unwrap();
        assert_eq!(&parsed[..], &payload[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn frame_reader_rejects_oversized_frame() {
        let mut reader = FrameReader::new();
        let mut buf = BytesMut::from(&(MAX_FRAME_LEN + 1).to_be_bytes()[..]);
        assert!(reader.parse(&mut buf).is_err());
    }
}
