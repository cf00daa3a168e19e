//! End-to-end scenario 5: pub/sub pattern fan-out across three connections.

mod common;

use common::Frame;
use tokio::task::LocalSet;

#[tokio::test]
async fn publish_fans_out_to_exact_and_pattern_subscribers() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let server = common::spawn(&local, |_| {}).await;
            let mut s1 = common::connect(server.addr).await;
            let mut s2 = common::connect(server.addr).await;
            let mut publisher = common::connect(server.addr).await;

            common::send(&mut s1, &[b"SUBSCRIBE", b"news.sports"]).await;
            assert_eq!(
                common::read_frame(&mut s1).await,
                Frame::Array(Some(vec![
                    Frame::Bulk(Some(b"subscribe".to_vec())),
                    Frame::Bulk(Some(b"news.sports".to_vec())),
                    Frame::Int(1),
                ]))
            );

            common::send(&mut s2, &[b"PSUBSCRIBE", b"news.*"]).await;
            assert_eq!(
                common::read_frame(&mut s2).await,
                Frame::Array(Some(vec![
                    Frame::Bulk(Some(b"psubscribe".to_vec())),
                    Frame::Bulk(Some(b"news.*".to_vec())),
                    Frame::Int(1),
                ]))
            );

            common::send(&mut publisher, &[b"PUBLISH", b"news.sports", b"hello"]).await;
            assert_eq!(common::read_frame(&mut publisher).await, Frame::Int(2));

            assert_eq!(
                common::read_frame(&mut s1).await,
                Frame::Array(Some(vec![
                    Frame::Bulk(Some(b"message".to_vec())),
                    Frame::Bulk(Some(b"news.sports".to_vec())),
                    Frame::Bulk(Some(b"hello".to_vec())),
                ]))
            );
            assert_eq!(
                common::read_frame(&mut s2).await,
                Frame::Array(Some(vec![
                    Frame::Bulk(Some(b"pmessage".to_vec())),
                    Frame::Bulk(Some(b"news.*".to_vec())),
                    Frame::Bulk(Some(b"news.sports".to_vec())),
                    Frame::Bulk(Some(b"hello".to_vec())),
                ]))
            );
        })
        .await;
}

#[tokio::test]
async fn subscribe_to_multiple_channels_in_one_command_acks_each_separately() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let server = common::spawn(&local, |_| {}).await;
            let mut s = common::connect(server.addr).await;

            common::send(&mut s, &[b"SUBSCRIBE", b"a", b"b", b"c"]).await;
            assert_eq!(
                common::read_frame(&mut s).await,
                Frame::Array(Some(vec![
                    Frame::Bulk(Some(b"subscribe".to_vec())),
                    Frame::Bulk(Some(b"a".to_vec())),
                    Frame::Int(1),
                ]))
            );
            assert_eq!(
                common::read_frame(&mut s).await,
                Frame::Array(Some(vec![
                    Frame::Bulk(Some(b"subscribe".to_vec())),
                    Frame::Bulk(Some(b"b".to_vec())),
                    Frame::Int(2),
                ]))
            );
            assert_eq!(
                common::read_frame(&mut s).await,
                Frame::Array(Some(vec![
                    Frame::Bulk(Some(b"subscribe".to_vec())),
                    Frame::Bulk(Some(b"c".to_vec())),
                    Frame::Int(3),
                ]))
            );
        })
        .await;
}
