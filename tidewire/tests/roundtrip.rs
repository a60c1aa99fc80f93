//! End-to-end HTTP and WebSocket round trips over real TCP

#![cfg(feature = "server")]

use std::sync::Arc;
use std::time::Duration;
use tidewire::prelude::*;
use tidewire::server::{RunningServer, WorkerPool};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

struct Echo;

#[async_trait]
impl SocketHandler for Echo {
    async fn on_open(&self, _session: &SessionHandle, _request: &HttpRequest) -> Option<Frame> {
        Some(Frame::text("ready"))
    }

    async fn on_message(
        &self,
        _session: &SessionHandle,
        _request: &HttpRequest,
        payload: Bytes,
    ) -> Option<Frame> {
        Some(Frame::text(payload))
    }
}

async fn start() -> RunningServer {
    tidewire::Server::builder()
        .bind("127.0.0.1:0")
        .unwrap()
        .heartbeat_delay(Duration::from_millis(100))
        .compression(false)
        .worker_pool(Arc::new(WorkerPool::current()))
        .get("/", |_req, resp| resp.set_body("index"))
        .socket("/echo", Echo)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap()
}

struct Client {
    stream: TcpStream,
    buf: BytesMut,
}

impl Client {
    async fn connect(server: &RunningServer) -> Self {
        Self {
            stream: TcpStream::connect(server.local_addr()).await.unwrap(),
            buf: BytesMut::new(),
        }
    }

    async fn fill(&mut self) {
        let n = timeout(Duration::from_secs(5), self.stream.read_buf(&mut self.buf))
            .await
            .expect("server went quiet")
            .unwrap();
        assert!(n > 0, "connection closed");
    }

    async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Response head including the blank line; bodies are read separately
    async fn head(&mut self) -> String {
        loop {
            if let Some(end) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = self.buf.split_to(end + 4);
                return String::from_utf8(head.to_vec()).unwrap();
            }
            self.fill().await;
        }
    }

    async fn body(&mut self, len: usize) -> Bytes {
        while self.buf.len() < len {
            self.fill().await;
        }
        self.buf.split_to(len).freeze()
    }

    async fn frame(&mut self) -> Frame {
        loop {
            if let Ok(frame) = Frame::parse(&mut self.buf, 1 << 20) {
                return frame;
            }
            self.fill().await;
        }
    }

    async fn upgrade(&mut self) -> String {
        self.send(
            b"GET /echo HTTP/1.1\r\nHost: t\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
        )
        .await;
        self.head().await
    }

    async fn expect_eof(&mut self) {
        let mut rest = Vec::new();
        timeout(Duration::from_secs(2), self.stream.read_to_end(&mut rest))
            .await
            .expect("connection stayed open")
            .unwrap();
    }
}

#[tokio::test]
async fn test_http_then_websocket_on_one_connection() {
    let server = start().await;
    let mut client = Client::connect(&server).await;

    client
        .send(b"GET / HTTP/1.1\r\nHost: t\r\nConnection: keep-alive\r\n\r\n")
        .await;
    let head = client.head().await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Length: 5\r\n"));
    assert_eq!(client.body(5).await, "index");

    let head = client.upgrade().await;
    assert_eq!(
        head,
        "HTTP/1.1 101 Switching Protocols\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"
    );

    let greeting = client.frame().await;
    assert_eq!(greeting.opcode, Opcode::Text);
    assert_eq!(greeting.payload, "ready");
    let heartbeat = client.frame().await;
    assert_eq!(heartbeat.opcode, Opcode::Ping);

    client.send(&Frame::text("hi").masked_with(MASK).to_bytes()).await;
    assert_eq!(client.frame().await.payload, "hi");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_fragments_ping_and_close() {
    let server = start().await;
    let mut client = Client::connect(&server).await;
    client.upgrade().await;
    client.frame().await;
    client.frame().await;

    client
        .send(&Frame::text("Hel").fin(false).masked_with(MASK).to_bytes())
        .await;
    client
        .send(&Frame::continuation("lo").masked_with(MASK).to_bytes())
        .await;
    let message = client.frame().await;
    assert_eq!(message.opcode, Opcode::Text);
    assert_eq!(message.payload, "Hello");

    client.send(&Frame::ping("p").masked_with(MASK).to_bytes()).await;
    let pong = client.frame().await;
    assert_eq!(pong.opcode, Opcode::Pong);
    assert_eq!(pong.payload, "p");

    let close = Frame::close(Some(1000), Some("done"));
    client.send(&close.clone().masked_with(MASK).to_bytes()).await;
    let echo = client.frame().await;
    assert_eq!(echo.opcode, Opcode::Close);
    assert_eq!(echo.payload, close.payload);
    client.expect_eof().await;

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pong_is_answered_with_a_later_ping() {
    let server = start().await;
    let mut client = Client::connect(&server).await;
    client.upgrade().await;
    client.frame().await;
    assert_eq!(client.frame().await.opcode, Opcode::Ping);

    let sent = tokio::time::Instant::now();
    client.send(&Frame::pong(Bytes::new()).masked_with(MASK).to_bytes()).await;
    let ping = client.frame().await;
    assert_eq!(ping.opcode, Opcode::Ping);
    assert!(sent.elapsed() >= Duration::from_millis(100));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unmasked_frame_is_a_protocol_error() {
    let server = start().await;
    let mut client = Client::connect(&server).await;
    client.upgrade().await;
    client.frame().await;
    client.frame().await;

    client.send(&Frame::text("bare").to_bytes()).await;
    let close = client.frame().await;
    assert_eq!(close.opcode, Opcode::Close);
    assert_eq!(&close.payload[..], &1002u16.to_be_bytes());
    client.expect_eof().await;

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_upgrade_without_key_is_refused() {
    let server = start().await;
    let mut client = Client::connect(&server).await;

    client
        .send(b"GET /echo HTTP/1.1\r\nHost: t\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n")
        .await;
    let head = client.head().await;
    assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));

    server.shutdown().await.unwrap();
}
