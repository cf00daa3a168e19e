//! The RESP2 wire parser.
//!
//! A streaming, resumable decoder: it is handed whatever bytes the socket
//! produced this read and either yields a decoded request, says it needs
//! more bytes, or reports a fatal protocol error. No recursion: array
//! parsing is an explicit accumulator loop, and there is no raw-pointer
//! cursor here -- just a safe index into the connection's read buffer.

use bytes::{Buf, BytesMut};

use libnano::split_inline_args;

/// DoS caps enforced while framing a request.
pub const MAX_BULK_LEN: usize = 64 * 1024;
pub const MAX_ARRAY_LEN: usize = 8192;

/// The amount of unconsumed buffer growth tolerated before we force a
/// compaction of the connection's read buffer.
pub const COMPACT_THRESHOLD: usize = 4 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Need more bytes before a decision can be made.
    Incomplete,
    /// A framing violation or a DoS cap was exceeded; the connection
    /// producing this is not worth talking to further.
    Protocol(&'static str),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// A single decoded request: an uppercased command name plus its raw
/// argument bytes. The command name is `None` when the frame was a
/// zero-length array (to be silently ignored by the caller).
#[derive(Debug)]
pub struct Request {
    pub command: Option<Vec<u8>>,
    pub args: Vec<Vec<u8>>,
}

/// Attempts to parse exactly one request from the front of `buf`.
///
/// On success, returns the request and the number of bytes consumed so
/// the caller can `buf.advance(consumed)`. Does not mutate `buf` itself so
/// a caller working off a shared connection buffer can retry on
/// [`ParseError::Incomplete`] once more bytes arrive.
pub fn try_parse(buf: &[u8]) -> ParseResult<(Request, usize)> {
    if buf.is_empty() {
        return Err(ParseError::Incomplete);
    }
    if buf[0] == b'*' {
        parse_array_request(buf)
    } else {
        parse_inline_request(buf)
    }
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Reads a `\r\n`- or bare `\n`-terminated line starting at `from`.
/// Returns `(line_without_terminator, bytes_consumed_including_terminator)`.
fn read_line(buf: &[u8], from: usize) -> ParseResult<(&[u8], usize)> {
    if let Some(crlf) = find_crlf(buf, from) {
        return Ok((&buf[from..crlf], crlf + 2 - from));
    }
    // tolerate a bare LF for inline commands
    if let Some(pos) = buf[from..].iter().position(|&b| b == b'\n') {
        let end = from + pos;
        let line_end = if end > from && buf[end - 1] == b'\r' {
            end - 1
        } else {
            end
        };
        return Ok((&buf[from..line_end], pos + 1));
    }
    Err(ParseError::Incomplete)
}

fn parse_usize(bytes: &[u8]) -> ParseResult<usize> {
    if bytes.is_empty() {
        return Err(ParseError::Protocol("expected integer"));
    }
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(ParseError::Protocol("invalid length prefix"))
        .map(|v| v as i64)
        .and_then(|v| {
            if v < 0 {
                Err(ParseError::Protocol("negative bulk length"))
            } else {
                Ok(v as usize)
            }
        })
}

fn parse_inline_request(buf: &[u8]) -> ParseResult<(Request, usize)> {
    let (line, consumed) = read_line(buf, 0)?;
    let tokens = split_inline_args(line).ok_or(ParseError::Protocol("unterminated quote"))?;
    if tokens.len() > MAX_ARRAY_LEN {
        return Err(ParseError::Protocol("too many inline arguments"));
    }
    let mut iter = tokens.into_iter();
    let command = iter.next().map(|mut c| {
        c.make_ascii_uppercase();
        c
    });
    let args: Vec<Vec<u8>> = iter.collect();
    Ok((Request { command, args }, consumed))
}

fn parse_array_request(buf: &[u8]) -> ParseResult<(Request, usize)> {
    let mut pos = 0usize;
    let (line, adv) = read_line(buf, pos + 1)?;
    pos += 1 + adv;
    let declared = parse_signed_len(line)?;
    let count = match declared {
        None => 0,
        Some(n) => n,
    };
    if count > MAX_ARRAY_LEN {
        return Err(ParseError::Protocol("array too long"));
    }
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        if pos >= buf.len() || buf[pos] != b'$' {
            return Err(ParseError::Protocol("expected bulk string"));
        }
        let (line, adv) = read_line(buf, pos + 1)?;
        pos += 1 + adv;
        let len = parse_usize(line)?;
        if len > MAX_BULK_LEN {
            return Err(ParseError::Protocol("bulk string too long"));
        }
        if pos + len + 2 > buf.len() {
            return Err(ParseError::Incomplete);
        }
        items.push(buf[pos..pos + len].to_vec());
        pos += len + 2;
    }
    let mut iter = items.into_iter();
    let command = iter.next().map(|mut c| {
        c.make_ascii_uppercase();
        c
    });
    let args: Vec<Vec<u8>> = iter.collect();
    Ok((Request { command, args }, pos))
}

fn parse_signed_len(bytes: &[u8]) -> ParseResult<Option<usize>> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(ParseError::Protocol("invalid array length"))
        .map(|v| if v < 0 { None } else { Some(v as usize) })
}

/// Compacts `buf` by dropping its consumed prefix once growth exceeds
/// [`COMPACT_THRESHOLD`], so long-lived connections don't retain an
/// ever-growing allocation behind a shrinking logical window.
pub fn maybe_compact(buf: &mut BytesMut, consumed: usize) {
    buf.advance(consumed);
    if buf.capacity() - buf.len() > COMPACT_THRESHOLD && buf.len() < COMPACT_THRESHOLD {
        let mut fresh = BytesMut::with_capacity(libnano::BUF_CAP);
        fresh.extend_from_slice(buf);
        *buf = fresh;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_request() {
        let input = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
        let (req, consumed) = try_parse(input).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(req.command.unwrap(), b"GET");
        assert_eq!(req.args, vec![b"foo".to_vec()]);
    }

    #[test]
    fn incomplete_array_waits() {
        let input = b"*2\r\n$3\r\nGET\r\n$3\r\nfo";
        assert_eq!(try_parse(input), Err(ParseError::Incomplete));
    }

    #[test]
    fn parses_inline_request() {
        let input = b"PING hello\r\n";
        let (req, consumed) = try_parse(input).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(req.command.unwrap(), b"PING");
        assert_eq!(req.args, vec![b"hello".to_vec()]);
    }

    #[test]
    fn rejects_oversized_bulk() {
        let mut input = Vec::new();
        input.extend_from_slice(b"*1\r\n$70000\r\n");
        assert_eq!(
            try_parse(&input),
            Err(ParseError::Protocol("bulk string too long"))
        );
    }

    #[test]
    fn rejects_oversized_array() {
        let input = b"*9000\r\n";
        assert_eq!(try_parse(input), Err(ParseError::Protocol("array too long")));
    }

    #[test]
    fn null_bulk_in_array_rejected_as_command_framing() {
        // a null bulk ($-1) is invalid as a request element; requests are
        // always flat arrays of concrete bulk strings.
        let input = b"*1\r\n$-1\r\n";
        assert!(try_parse(input).is_err());
    }

    #[test]
    fn empty_array_yields_no_command() {
        let input = b"*0\r\n";
        let (req, consumed) = try_parse(input).unwrap();
        assert_eq!(consumed, input.len());
        assert!(req.command.is_none());
    }
}
