//! Per-connection accept/read/parse/dispatch/write loop.
//!
//! Runs entirely on the current-thread runtime (no `Send` bound needed),
//! so the connection record freely holds `Rc<RefCell<_>>` handles into the
//! single shared `Storage`/`PubSub` rather than reaching for channels and
//! locks to cross a thread boundary that doesn't exist here.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::config::ConfigurationSet;
use crate::dbnet::middleware::{self, Auth};
use crate::protocol::encoder::Encoder;
use crate::protocol::parser::{self, ParseError};
use crate::protocol::reply::Reply;
use crate::protocol::responses::groups;
use crate::pubsub::{ConnId, PubSub};
use crate::router;
use crate::storage::Storage;
use crate::txn::{self, TxnOutcome, TxnState};

const READ_CHUNK: usize = 4 * 1024;
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Shared {
    pub storage: Rc<RefCell<Storage>>,
    pub pubsub: Rc<RefCell<PubSub>>,
    pub config: Rc<ConfigurationSet>,
}

const SUBSCRIBE_ALLOWED: &[&[u8]] = &[
    b"SUBSCRIBE",
    b"UNSUBSCRIBE",
    b"PSUBSCRIBE",
    b"PUNSUBSCRIBE",
    b"PING",
    b"QUIT",
];

pub async fn handle(mut stream: TcpStream, addr: SocketAddr, conn_id: ConnId, shared: Shared) {
    log::debug!("accepted connection from {addr} (id={conn_id})");

    let (pub_tx, mut pub_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    shared.pubsub.borrow_mut().register(conn_id, pub_tx);

    let mut read_buf = BytesMut::with_capacity(libnano::BUF_CAP);
    let mut encoder = Encoder::new();
    let mut auth = Auth::new(shared.config.requirepass.clone());
    let mut txn_state = TxnState::new();
    let idle_timeout = Duration::from_secs(shared.config.timeout_secs.max(1));

    'conn: loop {
        // drain any pending pub/sub frames before blocking on the socket
        while let Ok(frame) = pub_rx.try_recv() {
            if write_all_with_timeout(&mut stream, &frame).await.is_err() {
                break 'conn;
            }
        }

        tokio::select! {
            frame = pub_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if write_all_with_timeout(&mut stream, &frame).await.is_err() {
                            break 'conn;
                        }
                        continue 'conn;
                    }
                    None => continue 'conn,
                }
            }
            read_result = read_with_timeout(&mut stream, &mut read_buf, idle_timeout) => {
                match read_result {
                    ReadOutcome::Closed | ReadOutcome::TimedOut | ReadOutcome::Error => break 'conn,
                    ReadOutcome::Data => {}
                }
            }
        }

        loop {
            let parsed = parser::try_parse(&read_buf);
            let (request, consumed) = match parsed {
                Ok(pair) => pair,
                Err(ParseError::Incomplete) => break,
                Err(ParseError::Protocol(msg)) => {
                    encoder.clear();
                    encoder.error("ERR", msg);
                    let _ = write_all_with_timeout(&mut stream, encoder.as_bytes()).await;
                    break 'conn;
                }
            };
            parser::maybe_compact(&mut read_buf, consumed);

            let Some(cmd) = request.command else {
                continue;
            };
            let args = request.args;

            encoder.clear();
            if let Err(reply) = auth.check(&cmd, &args) {
                reply.encode(&mut encoder);
            } else if cmd == b"AUTH" {
                auth.handle_auth(&args).encode(&mut encoder);
            } else if cmd == b"QUIT" {
                encoder.raw(groups::OKAY);
                let _ = write_all_with_timeout(&mut stream, encoder.as_bytes()).await;
                break 'conn;
            } else if shared.pubsub.borrow().is_subscribed(conn_id)
                && !SUBSCRIBE_ALLOWED.contains(&cmd.as_slice())
            {
                encoder.error(
                    "ERR",
                    "only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT allowed in this context",
                );
            } else if let Err(reply) = middleware::validate_request(&args) {
                reply.encode(&mut encoder);
            } else if matches!(cmd.as_slice(), b"SUBSCRIBE" | b"PSUBSCRIBE" | b"UNSUBSCRIBE" | b"PUNSUBSCRIBE") {
                // each name acked separately -- one command can emit N frames
                let frames = subscribe_acks(&shared, conn_id, &cmd, &args);
                for frame in frames {
                    if write_all_with_timeout(&mut stream, &frame).await.is_err() {
                        break 'conn;
                    }
                }
                continue;
            } else {
                handle_command(&shared, conn_id, &mut txn_state, &cmd, &args).encode(&mut encoder);
            }

            if write_all_with_timeout(&mut stream, encoder.as_bytes()).await.is_err() {
                break 'conn;
            }
        }
    }

    shared.pubsub.borrow_mut().cleanup_client(conn_id);
    log::debug!("connection {conn_id} from {addr} closed");
}

fn handle_command(
    shared: &Shared,
    conn_id: ConnId,
    txn_state: &mut TxnState,
    cmd: &[u8],
    args: &[Vec<u8>],
) -> Reply {
    match cmd {
        b"PUBLISH" if args.len() == 2 => {
            let delivered = shared.pubsub.borrow_mut().publish(&args[0], &args[1]);
            return Reply::Int(delivered as i64);
        }
        _ => {}
    }

    let mut storage = shared.storage.borrow_mut();
    match txn::intercept(txn_state, &mut storage, cmd, args) {
        TxnOutcome::Reply(r) => r,
        TxnOutcome::Queued => Reply::Simple("QUEUED".to_string()),
        TxnOutcome::Passthrough => router::dispatch(&mut storage, cmd, args),
    }
}

/// Builds one raw RESP2 ack frame per channel/pattern a `(P)SUBSCRIBE` or
/// `(P)UNSUBSCRIBE` command acts on -- a single command naming N channels
/// emits N separate frames, so this can't be squeezed through the
/// single-`Reply`-per-command pipeline `handle_command` otherwise uses.
fn subscribe_acks(shared: &Shared, conn_id: ConnId, cmd: &[u8], args: &[Vec<u8>]) -> Vec<Vec<u8>> {
    match cmd {
        b"SUBSCRIBE" | b"PSUBSCRIBE" => {
            let pattern = cmd == b"PSUBSCRIBE";
            let kind = if pattern { "psubscribe" } else { "subscribe" };
            args.iter()
                .map(|name| {
                    let total = if pattern {
                        shared.pubsub.borrow_mut().psubscribe(conn_id, name.clone())
                    } else {
                        shared.pubsub.borrow_mut().subscribe(conn_id, name.clone())
                    };
                    crate::pubsub::encode_sub_ack(kind, name, total)
                })
                .collect()
        }
        b"UNSUBSCRIBE" | b"PUNSUBSCRIBE" => {
            let pattern = cmd == b"PUNSUBSCRIBE";
            let kind = if pattern { "punsubscribe" } else { "unsubscribe" };
            let targets: Vec<Vec<u8>> = if !args.is_empty() {
                args.to_vec()
            } else if pattern {
                shared.pubsub.borrow().client_pattern_names(conn_id)
            } else {
                shared.pubsub.borrow().client_channel_names(conn_id)
            };
            if targets.is_empty() {
                return vec![encode_nil_sub_ack(kind)];
            }
            targets
                .iter()
                .map(|name| {
                    let total = if pattern {
                        shared.pubsub.borrow_mut().punsubscribe(conn_id, name)
                    } else {
                        shared.pubsub.borrow_mut().unsubscribe(conn_id, name)
                    };
                    crate::pubsub::encode_sub_ack(kind, name, total)
                })
                .collect()
        }
        _ => unreachable!("subscribe_acks called for a non-subscribe command"),
    }
}

/// An unsubscribe/punsubscribe issued with no names and nothing currently
/// subscribed still acks once, naming no channel.
fn encode_nil_sub_ack(kind: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"*3\r\n");
    out.extend_from_slice(format!("${}\r\n{kind}\r\n", kind.len()).as_bytes());
    out.extend_from_slice(b"$-1\r\n");
    out.extend_from_slice(b":0\r\n");
    out
}

enum ReadOutcome {
    Data,
    Closed,
    TimedOut,
    Error,
}

async fn read_with_timeout(stream: &mut TcpStream, buf: &mut BytesMut, timeout: Duration) -> ReadOutcome {
    let mut chunk = [0u8; READ_CHUNK];
    match tokio::time::timeout(timeout, stream.read(&mut chunk)).await {
        Err(_) => ReadOutcome::TimedOut,
        Ok(Err(_)) => ReadOutcome::Error,
        Ok(Ok(0)) => ReadOutcome::Closed,
        Ok(Ok(n)) => {
            buf.extend_from_slice(&chunk[..n]);
            ReadOutcome::Data
        }
    }
}

async fn write_all_with_timeout(stream: &mut TcpStream, bytes: &[u8]) -> Result<(), ()> {
    match tokio::time::timeout(WRITE_TIMEOUT, stream.write_all(bytes)).await {
        Ok(Ok(())) => Ok(()),
        _ => Err(()),
    }
}
