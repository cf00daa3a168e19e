//! Shared scaffolding for black-box integration tests: spin up a real
//! listener on an OS-assigned port and speak RESP2 to it over a real
//! `TcpStream`, rather than calling into the router directly.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;

use nanod::config::ConfigurationSet;
use nanod::dbnet;
use nanod::pubsub::PubSub;
use nanod::storage::{Storage, DEFAULT_MAX_KEYS};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::LocalSet;

pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

/// Binds a listener on `127.0.0.1:0` and runs the accept loop on `local`.
/// Must be called from inside `local.run_until(...)`.
pub async fn spawn(local: &LocalSet, configure: impl FnOnce(&mut ConfigurationSet)) -> TestServer {
    let mut config = ConfigurationSet::default();
    configure(&mut config);
    let config = Rc::new(config);
    let storage = Rc::new(RefCell::new(Storage::new(DEFAULT_MAX_KEYS)));
    let pubsub = Rc::new(RefCell::new(PubSub::new()));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local_addr");

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    local.spawn_local(dbnet::run_accept_loop(listener, config, storage, pubsub, shutdown_rx));

    TestServer {
        addr,
        shutdown: shutdown_tx,
    }
}

pub async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.expect("connect to test server")
}

/// Writes a RESP2 array-of-bulk-strings command frame.
pub async fn send(stream: &mut TcpStream, parts: &[&[u8]]) {
    let mut buf = Vec::new();
    buf.extend_from_slice(format!("*{}\r\n", parts.len()).as_bytes());
    for p in parts {
        buf.extend_from_slice(format!("${}\r\n", p.len()).as_bytes());
        buf.extend_from_slice(p);
        buf.extend_from_slice(b"\r\n");
    }
    stream.write_all(&buf).await.expect("write command");
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Int(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Frame>>),
}

async fn read_line(stream: &mut TcpStream) -> String {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await.expect("read line");
        out.push(byte[0]);
        if out.ends_with(b"\r\n") {
            out.truncate(out.len() - 2);
            break;
        }
    }
    String::from_utf8(out).expect("utf8 line")
}

/// Reads one complete RESP2 frame, recursing into arrays.
pub async fn read_frame(stream: &mut TcpStream) -> Frame {
    let line = read_line(stream).await;
    let (tag, rest) = line.split_at(1);
    match tag {
        "+" => Frame::Simple(rest.to_string()),
        "-" => Frame::Error(rest.to_string()),
        ":" => Frame::Int(rest.parse().expect("integer frame")),
        "$" => {
            let len: i64 = rest.parse().expect("bulk length");
            if len < 0 {
                return Frame::Bulk(None);
            }
            let mut data = vec![0u8; len as usize];
            stream.read_exact(&mut data).await.expect("bulk body");
            let mut crlf = [0u8; 2];
            stream.read_exact(&mut crlf).await.expect("bulk trailing crlf");
            Frame::Bulk(Some(data))
        }
        "*" => {
            let len: i64 = rest.parse().expect("array length");
            if len < 0 {
                return Frame::Array(None);
            }
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                items.push(Box::pin(read_frame(stream)).await);
            }
            Frame::Array(Some(items))
        }
        other => panic!("unexpected RESP2 tag {other:?} in line {line:?}"),
    }
}
