//! Incremental decoder for the `application/vnd.amazon.eventstream` framing used
//! by Bedrock's streaming invocation.
//!
//! Each frame is laid out as
//!
//! ```text
//! total_len:u32 | headers_len:u32 | prelude_crc:u32 | headers | payload | message_crc:u32
//! ```
//!
//! Bytes are pushed as they arrive from the network and whole frames are
//! popped once enough data is buffered. Both CRC32 fields are verified; the
//! prelude checksum is checked before its lengths are trusted.

use bytes::{Buf, Bytes, BytesMut};

const PRELUDE_LEN: usize = 12;
const TRAILER_LEN: usize = 4;
const MIN_FRAME_LEN: usize = PRELUDE_LEN + TRAILER_LEN;
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame length {0} out of range")]
    FrameLength(usize),
    #[error("header block of {headers} bytes overruns frame of {total} bytes")]
    HeaderOverrun { headers: usize, total: usize },
    #[error("malformed header: {0}")]
    Header(String),
    #[error("unknown header value type {0}")]
    HeaderType(u8),
    #[error("stream ended inside a frame ({0} bytes buffered)")]
    Truncated(usize),
    #[error("invalid chunk payload: {0}")]
    Payload(String),
    #[error("{section} checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    Checksum {
        section: &'static str,
        expected: u32,
        actual: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Bytes(Bytes),
    String(String),
    Timestamp(i64),
    Uuid([u8; 16]),
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub headers: Vec<(String, HeaderValue)>,
    pub payload: Bytes,
}

impl Frame {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|(k, v)| match v {
            HeaderValue::String(s) if k == name => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn message_type(&self) -> &str {
        self.header_str(":message-type").unwrap_or("event")
    }
}

#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buf: BytesMut,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pops the next complete frame, or `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.buf.len() < PRELUDE_LEN {
            return Ok(None);
        }
        verify_crc("prelude", &self.buf[..8], read_u32(&self.buf[8..PRELUDE_LEN]))?;
        let total = read_u32(&self.buf[0..4]) as usize;
        let headers_len = read_u32(&self.buf[4..8]) as usize;
        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&total) {
            return Err(DecodeError::FrameLength(total));
        }
        if headers_len > total - MIN_FRAME_LEN {
            return Err(DecodeError::HeaderOverrun {
                headers: headers_len,
                total,
            });
        }
        if self.buf.len() < total {
            return Ok(None);
        }

        let body_end = total - TRAILER_LEN;
        verify_crc("message", &self.buf[..body_end], read_u32(&self.buf[body_end..total]))?;

        let mut frame = self.buf.split_to(total).freeze();
        frame.advance(PRELUDE_LEN);
        let mut header_block = frame.split_to(headers_len);
        let payload = frame.split_to(total - MIN_FRAME_LEN - headers_len);
        let headers = parse_headers(&mut header_block)?;
        Ok(Some(Frame { headers, payload }))
    }
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn verify_crc(section: &'static str, data: &[u8], expected: u32) -> Result<(), DecodeError> {
    let actual = crc32fast::hash(data);
    if actual != expected {
        return Err(DecodeError::Checksum {
            section,
            expected,
            actual,
        });
    }
    Ok(())
}

fn need(buf: &Bytes, n: usize, what: &str) -> Result<(), DecodeError> {
    if buf.remaining() < n {
        return Err(DecodeError::Header(format!("truncated {what}")));
    }
    Ok(())
}

fn take_utf8(buf: &mut Bytes, n: usize, what: &str) -> Result<String, DecodeError> {
    need(buf, n, what)?;
    let raw = buf.split_to(n);
    String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::Header(format!("{what} is not utf-8")))
}

fn parse_headers(buf: &mut Bytes) -> Result<Vec<(String, HeaderValue)>, DecodeError> {
    let mut headers = Vec::new();
    while buf.has_remaining() {
        let name_len = buf.get_u8() as usize;
        let name = take_utf8(buf, name_len, "header name")?;
        need(buf, 1, "header type")?;
        let value = match buf.get_u8() {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => {
                need(buf, 1, "byte value")?;
                HeaderValue::Byte(buf.get_i8())
            }
            3 => {
                need(buf, 2, "short value")?;
                HeaderValue::Short(buf.get_i16())
            }
            4 => {
                need(buf, 4, "int value")?;
                HeaderValue::Int(buf.get_i32())
            }
            5 => {
                need(buf, 8, "long value")?;
                HeaderValue::Long(buf.get_i64())
            }
            6 => {
                need(buf, 2, "bytes length")?;
                let len = buf.get_u16() as usize;
                need(buf, len, "bytes value")?;
                HeaderValue::Bytes(buf.split_to(len))
            }
            7 => {
                need(buf, 2, "string length")?;
                let len = buf.get_u16() as usize;
                HeaderValue::String(take_utf8(buf, len, "string value")?)
            }
            8 => {
                need(buf, 8, "timestamp value")?;
                HeaderValue::Timestamp(buf.get_i64())
            }
            9 => {
                need(buf, 16, "uuid value")?;
                let mut id = [0u8; 16];
                buf.copy_to_slice(&mut id);
                HeaderValue::Uuid(id)
            }
            other => return Err(DecodeError::HeaderType(other)),
        };
        headers.push((name, value));
    }
    Ok(headers)
}
