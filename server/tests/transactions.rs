//! End-to-end scenario 3: a `WATCH`ed key mutated by another connection
//! aborts the watcher's `EXEC` with a null array, and the mutation stands.

mod common;

use common::Frame;
use tokio::task::LocalSet;

#[tokio::test]
async fn watch_conflict_from_another_connection_aborts_exec() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let server = common::spawn(&local, |_| {}).await;
            let mut conn_a = common::connect(server.addr).await;
            let mut conn_b = common::connect(server.addr).await;

            common::send(&mut conn_a, &[b"SET", b"counter", b"10"]).await;
            assert_eq!(common::read_frame(&mut conn_a).await, Frame::Simple("OK".to_string()));

            common::send(&mut conn_a, &[b"WATCH", b"counter"]).await;
            assert_eq!(common::read_frame(&mut conn_a).await, Frame::Simple("OK".to_string()));

            common::send(&mut conn_a, &[b"MULTI"]).await;
            assert_eq!(common::read_frame(&mut conn_a).await, Frame::Simple("OK".to_string()));

            common::send(&mut conn_a, &[b"INCR", b"counter"]).await;
            assert_eq!(common::read_frame(&mut conn_a).await, Frame::Simple("QUEUED".to_string()));

            common::send(&mut conn_b, &[b"SET", b"counter", b"99"]).await;
            assert_eq!(common::read_frame(&mut conn_b).await, Frame::Simple("OK".to_string()));

            common::send(&mut conn_a, &[b"EXEC"]).await;
            assert_eq!(common::read_frame(&mut conn_a).await, Frame::Array(None));

            common::send(&mut conn_a, &[b"GET", b"counter"]).await;
            assert_eq!(
                common::read_frame(&mut conn_a).await,
                Frame::Bulk(Some(b"99".to_vec()))
            );
        })
        .await;
}

#[tokio::test]
async fn exec_without_conflict_runs_queued_commands() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let server = common::spawn(&local, |_| {}).await;
            let mut conn = common::connect(server.addr).await;

            common::send(&mut conn, &[b"SET", b"k", b"1"]).await;
            assert_eq!(common::read_frame(&mut conn).await, Frame::Simple("OK".to_string()));

            common::send(&mut conn, &[b"MULTI"]).await;
            assert_eq!(common::read_frame(&mut conn).await, Frame::Simple("OK".to_string()));
            common::send(&mut conn, &[b"INCR", b"k"]).await;
            assert_eq!(common::read_frame(&mut conn).await, Frame::Simple("QUEUED".to_string()));
            common::send(&mut conn, &[b"INCR", b"k"]).await;
            assert_eq!(common::read_frame(&mut conn).await, Frame::Simple("QUEUED".to_string()));

            common::send(&mut conn, &[b"EXEC"]).await;
            assert_eq!(
                common::read_frame(&mut conn).await,
                Frame::Array(Some(vec![Frame::Int(2), Frame::Int(3)]))
            );
        })
        .await;
}
