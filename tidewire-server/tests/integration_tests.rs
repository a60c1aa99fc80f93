//! Integration tests for the Tidewire server
//!
//! Each test starts a real server on an ephemeral port and talks raw
//! HTTP/1.1 to it over TCP.

use std::sync::Arc;
use std::time::Duration;
use tidewire_server::prelude::*;
use tidewire_server::WorkerPool;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

async fn start(keep_alive: Duration, compression: bool) -> RunningServer {
    Server::builder()
        .bind("127.0.0.1:0")
        .unwrap()
        .keep_alive_timeout(keep_alive)
        .keep_alive_tick(Duration::from_millis(50))
        .compression(compression)
        .worker_pool(Arc::new(WorkerPool::current()))
        .get("/hello", |_req, resp| resp.set_body("hello"))
        .post("/echo", |req, resp| resp.set_body(req.body.clone()))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read exactly one response, head plus `Content-Length` body
async fn read_response(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("Content-Length: "))
                .map(|value| value.trim().parse::<usize>().unwrap())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return String::from_utf8_lossy(&buf[..end + 4 + body_len]).to_string();
            }
        }
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before a full response");
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn expect_eof(stream: &mut TcpStream, within: Duration) {
    let mut rest = Vec::new();
    let read = timeout(within, stream.read_to_end(&mut rest))
        .await
        .expect("connection stayed open");
    assert!(read.is_ok());
}

#[tokio::test]
async fn test_keep_alive_serves_several_requests() {
    let server = start(Duration::from_millis(300), false).await;
    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();

    for _ in 0..3 {
        client
            .write_all(b"GET /hello HTTP/1.1\r\nHost: t\r\nConnection: keep-alive\r\n\r\n")
            .await
            .unwrap();
        let response = read_response(&mut client).await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Connection: keep-alive\r\n"));
        assert!(response.contains("Server: Tidewire/"));
        assert!(response.ends_with("\r\n\r\nhello"));
    }

    // Idle past the timeout: the reaper closes the connection
    expect_eof(&mut client, Duration::from_secs(3)).await;
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connection_closes_without_keep_alive() {
    let server = start(Duration::from_secs(60), false).await;
    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();

    client
        .write_all(b"GET /hello HTTP/1.1\r\nHost: t\r\n\r\n")
        .await
        .unwrap();
    let response = read_response(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(!response.contains("Connection:"));

    expect_eof(&mut client, Duration::from_secs(1)).await;
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_post_body_and_missing_route() {
    let server = start(Duration::from_secs(60), false).await;
    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();

    client
        .write_all(
            b"POST /echo HTTP/1.1\r\nHost: t\r\nConnection: keep-alive\r\nContent-Length: 5\r\n\r\nabcde",
        )
        .await
        .unwrap();
    let response = read_response(&mut client).await;
    assert!(response.contains("Content-Length: 5\r\n"));
    assert!(response.ends_with("abcde"));

    client
        .write_all(b"GET /missing HTTP/1.1\r\nHost: t\r\n\r\n")
        .await
        .unwrap();
    let response = read_response(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_request_split_across_writes() {
    let server = start(Duration::from_secs(60), false).await;
    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();

    client.write_all(b"GET /hel").await.unwrap();
    client.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.write_all(b"lo HTTP/1.1\r\nHost: t\r\n\r\n").await.unwrap();

    let response = read_response(&mut client).await;
    assert!(response.ends_with("hello"));
    server.shutdown().await.unwrap();
}

#[cfg(feature = "compression")]
#[tokio::test]
async fn test_gzip_when_accepted() {
    let server = start(Duration::from_secs(60), true).await;
    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();

    client
        .write_all(b"GET /hello HTTP/1.1\r\nHost: t\r\nAccept-Encoding: gzip, deflate\r\n\r\n")
        .await
        .unwrap();
    let response = read_response(&mut client).await;
    assert!(response.contains("Content-Encoding: gzip\r\n"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_live_sessions() {
    let server = start(Duration::from_secs(60), false).await;
    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();

    client
        .write_all(b"GET /hello HTTP/1.1\r\nHost: t\r\nConnection: keep-alive\r\n\r\n")
        .await
        .unwrap();
    read_response(&mut client).await;
    assert_eq!(server.manager().len().await, 1);

    server.shutdown().await.unwrap();
    expect_eof(&mut client, Duration::from_secs(1)).await;
}
