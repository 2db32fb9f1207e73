use std::time::Duration;

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::UnixStream,
    time::timeout,
};

use crate::{error::Error, Client};

#[tokio::test]
async fn frames_requests_and_decodes_results() {
    let (client_sock, server_sock) = UnixStream::pair().unwrap();
    let client = Client::new(client_sock);
    let (read, mut write) = server_sock.into_split();
    let mut lines = BufReader::new(read).lines();

    let server = async {
        let line = lines.next_line().await.unwrap().unwrap();
        // exact wire format: fixed field order, no whitespace
        assert_eq!(
            line,
            r#"{"jsonrpc":"2.0","id":1,"method":"get_bdevs","params":{"name":"vol"}}"#
        );
        write
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":\
                  [{\"name\":\"vol\",\"num_blocks\":2048,\"block_size\":512}]}\n",
            )
            .await
            .unwrap();
    };

    let (bdevs, _) = tokio::join!(client.get_bdevs(Some("vol")), server);
    let bdevs = bdevs.unwrap();
    assert_eq!(bdevs.len(), 1);
    assert_eq!(bdevs[0].name, "vol");
    assert_eq!(bdevs[0].size_bytes(), 2048 * 512);
}

#[tokio::test]
async fn matches_out_of_order_replies_by_id() {
    let (client_sock, server_sock) = UnixStream::pair().unwrap();
    let client = Client::new(client_sock);
    let (read, mut write) = server_sock.into_split();
    let mut lines = BufReader::new(read).lines();

    let server = async {
        let first = lines.next_line().await.unwrap().unwrap();
        let second = lines.next_line().await.unwrap().unwrap();
        assert!(first.contains("\"id\":1"));
        assert!(second.contains("\"id\":2"));
        // answer the second request first
        write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":22}\n")
            .await
            .unwrap();
        write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":11}\n")
            .await
            .unwrap();
    };

    let (one, two, _) = tokio::join!(
        client.call::<(), i32>("one", None),
        client.call::<(), i32>("two", None),
        server
    );
    assert_eq!(one.unwrap(), 11);
    assert_eq!(two.unwrap(), 22);
}

#[tokio::test]
async fn exposes_invalid_params_code() {
    let (client_sock, server_sock) = UnixStream::pair().unwrap();
    let client = Client::new(client_sock);
    let (read, mut write) = server_sock.into_split();
    let mut lines = BufReader::new(read).lines();

    let server = async {
        lines.next_line().await.unwrap().unwrap();
        write
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":\
                  {\"code\":-32602,\"message\":\"no such bdev\"}}\n",
            )
            .await
            .unwrap();
    };

    let (res, _) = tokio::join!(client.get_bdevs(Some("missing")), server);
    let err = res.unwrap_err();
    assert!(err.is_invalid_params());
    assert_eq!(
        err.into_status().code(),
        tonic::Code::InvalidArgument
    );
}

#[tokio::test]
async fn maps_negated_errno_codes() {
    let (client_sock, server_sock) = UnixStream::pair().unwrap();
    let client = Client::new(client_sock);
    let (read, mut write) = server_sock.into_split();
    let mut lines = BufReader::new(read).lines();

    let server = async {
        lines.next_line().await.unwrap().unwrap();
        write
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":\
                  {\"code\":-17,\"message\":\"exists\"}}\n",
            )
            .await
            .unwrap();
    };

    let (res, _) = tokio::join!(client.delete_bdev("vol"), server);
    match res.unwrap_err() {
        Error::RpcError { code, .. } => {
            assert_eq!(code, crate::error::RpcCode::AlreadyExists)
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn late_reply_after_cancellation_poisons_connection() {
    let (client_sock, server_sock) = UnixStream::pair().unwrap();
    let client = Client::new(client_sock);
    let (read, mut write) = server_sock.into_split();
    let mut lines = BufReader::new(read).lines();

    // caller gives up before any reply arrives; the id stays reserved
    let cancelled = timeout(
        Duration::from_millis(20),
        client.call::<(), serde_json::Value>("slow", None),
    )
    .await;
    assert!(cancelled.is_err());
    let request = lines.next_line().await.unwrap().unwrap();
    assert!(request.contains("\"id\":1"));

    // the reply nobody waits for arrives; connection may no longer be used
    write
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":true}\n")
        .await
        .unwrap();
    drop(write);
    drop(lines);

    let res = timeout(
        Duration::from_secs(1),
        client.call::<(), serde_json::Value>("ping", None),
    )
    .await
    .expect("call must fail, not hang");
    assert!(res.is_err());
}
