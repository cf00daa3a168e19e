//! End-to-end scenario 4: hash promotion boundary. 65 fields pushes a hash
//! past any small-hash optimization threshold; deleting all fields still
//! deletes the key entirely.

mod common;

use common::Frame;
use tokio::task::LocalSet;

#[tokio::test]
async fn hash_of_65_fields_reports_len_and_empties_on_full_delete() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let server = common::spawn(&local, |_| {}).await;
            let mut conn = common::connect(server.addr).await;

            let mut hset = vec![b"HSET".to_vec(), b"h".to_vec()];
            for i in 0..65 {
                hset.push(format!("f{i}").into_bytes());
                hset.push(format!("v{i}").into_bytes());
            }
            let hset_parts: Vec<&[u8]> = hset.iter().map(|v| v.as_slice()).collect();
            common::send(&mut conn, &hset_parts).await;
            assert_eq!(common::read_frame(&mut conn).await, Frame::Int(65));

            common::send(&mut conn, &[b"HLEN", b"h"]).await;
            assert_eq!(common::read_frame(&mut conn).await, Frame::Int(65));

            let mut hdel = vec![b"HDEL".to_vec(), b"h".to_vec()];
            for i in 0..65 {
                hdel.push(format!("f{i}").into_bytes());
            }
            let hdel_parts: Vec<&[u8]> = hdel.iter().map(|v| v.as_slice()).collect();
            common::send(&mut conn, &hdel_parts).await;
            assert_eq!(common::read_frame(&mut conn).await, Frame::Int(65));

            common::send(&mut conn, &[b"EXISTS", b"h"]).await;
            assert_eq!(common::read_frame(&mut conn).await, Frame::Int(0));
        })
        .await;
}
