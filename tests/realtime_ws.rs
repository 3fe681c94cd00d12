//! End-to-end transport tests against a local WebSocket peer.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tether::{ConnectionState, Envelope, RealtimeTransport};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

// ============================================================================
// Helpers
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr)
}

/// Accepts one WebSocket client and reports the handshake query string.
async fn accept(listener: &TcpListener) -> (WebSocketStream<TcpStream>, Option<String>) {
    let (stream, _) = listener.accept().await.expect("accept");
    let (query_tx, query_rx) = oneshot::channel();

    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let _ = query_tx.send(req.uri().query().map(str::to_owned));
        Ok(resp)
    };

    let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .expect("handshake");
    let query = query_rx.await.expect("query");
    (ws, query)
}

fn transport(addr: SocketAddr) -> RealtimeTransport {
    RealtimeTransport::builder()
        .url(format!("ws://{addr}/ws"))
        .reconnect_base_delay(Duration::from_millis(50))
        .max_reconnect_attempts(3)
        .build()
        .expect("build")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_connect_passes_credential_and_exchanges_envelopes() {
    init_tracing();
    let (listener, addr) = bind().await;
    let transport = transport(addr);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Value>();
    let _sub = transport.subscribe("lead.updated", move |payload: &Value| {
        let _ = event_tx.send(payload.clone());
    });

    let server = tokio::spawn(async move {
        let (mut ws, query) = accept(&listener).await;

        let push = Envelope::new("lead.updated", json!({ "id": 7 }));
        ws.send(Message::Text(push.to_frame().expect("frame").into()))
            .await
            .expect("push");

        let inbound = loop {
            match ws.next().await.expect("frame").expect("read") {
                Message::Text(text) => break Envelope::parse(text.as_str()).expect("envelope"),
                _ => continue,
            }
        };
        (query, inbound)
    });

    transport.connect(Some("secret")).await;
    assert_eq!(transport.state(), ConnectionState::Connected);

    let pushed = timeout(WAIT, event_rx.recv()).await.expect("timely").expect("event");
    assert_eq!(pushed, json!({ "id": 7 }));

    assert!(transport.send("lead.ack", &json!({ "id": 7 })));

    let (query, inbound) = timeout(WAIT, server).await.expect("timely").expect("server");
    assert_eq!(query.as_deref(), Some("token=secret"));
    assert_eq!(inbound.event, "lead.ack");
    assert_eq!(inbound.payload, json!({ "id": 7 }));

    transport.disconnect();
    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert!(!transport.send("lead.ack", &json!({})));
}

#[tokio::test]
async fn test_reconnects_after_peer_drops() {
    init_tracing();
    let (listener, addr) = bind().await;
    let transport = transport(addr);

    let (state_tx, mut state_rx) = mpsc::unbounded_channel();
    let _sub = transport.on_connection_change(move |state: ConnectionState| {
        let _ = state_tx.send(state);
    });

    let server = tokio::spawn(async move {
        let (mut first, first_query) = accept(&listener).await;
        first.close(None).await.expect("close");
        drop(first);

        let (second, second_query) = accept(&listener).await;
        (second, first_query, second_query)
    });

    transport.connect(Some("secret")).await;

    let mut connected = 0;
    while connected < 2 {
        let state = timeout(WAIT, state_rx.recv()).await.expect("timely").expect("state");
        if state == ConnectionState::Connected {
            connected += 1;
        }
    }

    let (_second, first_query, second_query) =
        timeout(WAIT, server).await.expect("timely").expect("server");
    assert_eq!(first_query, second_query);
    assert!(transport.is_connected());
    assert_eq!(transport.reconnect_attempts(), 0);

    transport.disconnect();
}

#[tokio::test]
async fn test_unreachable_peer_reports_error() {
    init_tracing();
    let (listener, addr) = bind().await;
    drop(listener);

    let transport = RealtimeTransport::builder()
        .url(format!("ws://{addr}/ws"))
        .max_reconnect_attempts(0)
        .build()
        .expect("build");

    transport.connect(None).await;
    assert_eq!(transport.state(), ConnectionState::Error);
    assert!(!transport.send("anything", &json!(null)));
}
