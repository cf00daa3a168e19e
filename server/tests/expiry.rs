//! End-to-end scenario 2: `SET ... EX`, then a lazy read after the
//! deadline passes turns the key absent.

mod common;

use common::Frame;
use tokio::task::LocalSet;

#[tokio::test]
async fn set_with_ex_expires_on_lazy_read() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let server = common::spawn(&local, |_| {}).await;
            let mut stream = common::connect(server.addr).await;

            common::send(&mut stream, &[b"SET", b"foo", b"bar", b"EX", b"1"]).await;
            assert_eq!(common::read_frame(&mut stream).await, Frame::Simple("OK".to_string()));

            common::send(&mut stream, &[b"GET", b"foo"]).await;
            assert_eq!(
                common::read_frame(&mut stream).await,
                Frame::Bulk(Some(b"bar".to_vec()))
            );

            tokio::time::sleep(std::time::Duration::from_millis(1200)).await;

            common::send(&mut stream, &[b"GET", b"foo"]).await;
            assert_eq!(common::read_frame(&mut stream).await, Frame::Bulk(None));

            common::send(&mut stream, &[b"TTL", b"foo"]).await;
            assert_eq!(common::read_frame(&mut stream).await, Frame::Int(-2));
        })
        .await;
}
