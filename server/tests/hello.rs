//! End-to-end scenario 1: array and inline `PING`.

mod common;

use common::Frame;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::LocalSet;

#[tokio::test]
async fn array_ping_replies_pong() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let server = common::spawn(&local, |_| {}).await;
            let mut stream = common::connect(server.addr).await;
            common::send(&mut stream, &[b"PING"]).await;
            assert_eq!(common::read_frame(&mut stream).await, Frame::Simple("PONG".to_string()));
        })
        .await;
}

#[tokio::test]
async fn inline_ping_with_argument_echoes_it_as_bulk() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let server = common::spawn(&local, |_| {}).await;
            let mut stream = common::connect(server.addr).await;
            stream.write_all(b"PING hi\r\n").await.unwrap();

            // read exactly "$2\r\nhi\r\n"
            let mut buf = [0u8; 8];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"$2\r\nhi\r\n");
        })
        .await;
}
