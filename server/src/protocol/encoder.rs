//! The reusable response encoder.
//!
//! One `Encoder` per connection holds a growable byte buffer; writers
//! append typed RESP2 frames to it and the connection loop flushes it to
//! the socket once per request. Reused across requests instead of being
//! recreated, to keep the allocator quiet on a tight heap.

use bytes::BytesMut;

use super::responses::groups;

pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(libnano::BUF_CAP),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn simple_string(&mut self, s: &str) {
        self.buf.extend_from_slice(b"+");
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    pub fn error(&mut self, prefix: &str, msg: &str) {
        self.buf.extend_from_slice(b"-");
        self.buf.extend_from_slice(prefix.as_bytes());
        self.buf.extend_from_slice(b" ");
        self.buf.extend_from_slice(msg.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    pub fn integer(&mut self, n: i64) {
        if n == 0 {
            self.buf.extend_from_slice(groups::ZERO);
            return;
        }
        if n == 1 {
            self.buf.extend_from_slice(groups::ONE);
            return;
        }
        self.buf.extend_from_slice(b":");
        self.buf.extend_from_slice(n.to_string().as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    pub fn bulk(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(b"$");
        self.buf.extend_from_slice(data.len().to_string().as_bytes());
        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
    }

    pub fn bulk_or_nil(&mut self, data: Option<&[u8]>) {
        match data {
            Some(d) => self.bulk(d),
            None => self.nil(),
        }
    }

    pub fn nil(&mut self) {
        self.buf.extend_from_slice(groups::NIL);
    }

    pub fn nil_array(&mut self) {
        self.buf.extend_from_slice(groups::NIL_ARRAY);
    }

    pub fn array_header(&mut self, len: usize) {
        self.buf.extend_from_slice(b"*");
        self.buf.extend_from_slice(len.to_string().as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    pub fn double(&mut self, d: f64) {
        self.bulk(format_double(d).as_bytes());
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a float the way the wire protocol expects: no trailing zeros,
/// no scientific notation for ordinary magnitudes.
pub fn format_double(d: f64) -> String {
    if d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{}", d as i64)
    } else {
        let mut s = format!("{d:.17}");
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        s
    }
}
