//! Chat server demo
//!
//! Serves a plain-text index on `/` and a broadcast chat on `/chat`: every
//! text message a client sends is forwarded to all other connected clients.
//!
//! Run with `cargo run --example chat`, then connect any WebSocket client to
//! `ws://127.0.0.1:28080/chat`.

use std::collections::HashMap;
use tidewire::prelude::*;
use tidewire::SessionId;
use tokio::sync::Mutex;

#[derive(Default)]
struct Chat {
    members: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl Chat {
    async fn broadcast(&self, from: SessionId, text: String) {
        let frame = Frame::text(text).to_bytes();
        for (id, member) in self.members.lock().await.iter() {
            if *id != from {
                member.send(frame.clone());
            }
        }
    }
}

#[async_trait]
impl SocketHandler for Chat {
    async fn on_open(&self, session: &SessionHandle, _request: &HttpRequest) -> Option<Frame> {
        self.members
            .lock()
            .await
            .insert(session.id(), session.clone());
        self.broadcast(session.id(), format!("user {} joined", session.id()))
            .await;
        Some(Frame::text(format!("welcome, you are user {}", session.id())))
    }

    async fn on_message(
        &self,
        session: &SessionHandle,
        _request: &HttpRequest,
        payload: Bytes,
    ) -> Option<Frame> {
        let text = String::from_utf8_lossy(&payload);
        self.broadcast(session.id(), format!("user {}: {}", session.id(), text))
            .await;
        None
    }

    async fn on_close(&self, session: &SessionHandle, _request: &HttpRequest) {
        self.members.lock().await.remove(&session.id());
        self.broadcast(session.id(), format!("user {} left", session.id()))
            .await;
    }
}

#[tokio::main]
async fn main() -> tidewire::server::Result<()> {
    if let Err(err) = tidewire::server::init_logging() {
        eprintln!("logging disabled: {err}");
    }

    let server = tidewire::Server::builder()
        .bind("127.0.0.1:28080")?
        .max_connections(100)
        .get("/", |_req, resp| {
            resp.set_header("Content-Type", "text/plain");
            resp.set_body("connect a WebSocket client to /chat");
        })
        .socket("/chat", Chat::default())
        .build()?;

    server.serve().await
}
