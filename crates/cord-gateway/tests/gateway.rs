//! End-to-end controller tests against a scripted transport.
//!
//! The wire is a pair of in-memory channels: the test plays the server by
//! pushing inbound frames and asserting on what the client writes out.

use async_trait::async_trait;
use cord_common::GatewayConfig;
use cord_gateway::{
    CloseFrame, Envelope, Gateway, GatewayError, Identifier, Json, OpCode, Transport,
    TransportError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

// ── Scripted transport ──────────────────────────────────────

struct ScriptedTransport {
    fail_dials: bool,
    dials: AtomicUsize,
    closes: AtomicUsize,
    inbound: Mutex<mpsc::UnboundedReceiver<Result<Vec<u8>, TransportError>>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl ScriptedTransport {
    fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn dial(&self) -> Result<(), TransportError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.fail_dials {
            return Err(TransportError::Dial("connection refused".into()));
        }
        Ok(())
    }

    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|err| TransportError::Send(Box::new(err)))
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .unwrap_or(Err(TransportError::StreamEnded))
    }

    async fn close(&self, _frame: Option<CloseFrame>) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// The server's end of the scripted wire.
struct Wire {
    inbound: mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Wire {
    fn push(&self, frame: Value) {
        self.inbound
            .send(Ok(frame.to_string().into_bytes()))
            .expect("client hung up");
    }

    fn push_error(&self, err: TransportError) {
        self.inbound.send(Err(err)).expect("client hung up");
    }

    async fn next_frame(&mut self) -> Envelope {
        let raw = timeout(Duration::from_secs(2), self.outbound.recv())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("outbound channel closed");
        serde_json::from_slice(&raw).expect("client sent unparsable frame")
    }

    /// Next outbound frame that is not a heartbeat.
    async fn next_non_heartbeat(&mut self) -> Envelope {
        loop {
            let envelope = self.next_frame().await;
            if envelope.op != OpCode::Heartbeat {
                return envelope;
            }
        }
    }

    /// Next outbound heartbeat.
    async fn next_heartbeat(&mut self) -> Envelope {
        loop {
            let envelope = self.next_frame().await;
            if envelope.op == OpCode::Heartbeat {
                return envelope;
            }
        }
    }
}

fn scripted(fail_dials: bool) -> (Arc<ScriptedTransport>, Wire) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let transport = Arc::new(ScriptedTransport {
        fail_dials,
        dials: AtomicUsize::new(0),
        closes: AtomicUsize::new(0),
        inbound: Mutex::new(inbound_rx),
        outbound: outbound_tx,
    });

    (
        transport,
        Wire {
            inbound: inbound_tx,
            outbound: outbound_rx,
        },
    )
}

fn test_config() -> GatewayConfig {
    GatewayConfig {
        send_timeout_ms: 1_000,
        event_buffer: 10,
        reconnect_retries: 3,
        extra_read_timeout_ms: 1_000,
    }
}

fn gateway_with(transport: &Arc<ScriptedTransport>) -> Gateway {
    Gateway::from_parts(
        Identifier::new("Bot test"),
        Arc::clone(transport) as Arc<dyn Transport>,
        Arc::new(Json),
        test_config(),
    )
}

// ── Frame builders ──────────────────────────────────────────

fn hello(interval_ms: u64) -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": interval_ms}})
}

fn ready(session_id: &str, seq: u64) -> Value {
    json!({"op": 0, "t": "READY", "s": seq, "d": {"v": 6, "session_id": session_id}})
}

fn resumed(seq: u64) -> Value {
    json!({"op": 0, "t": "RESUMED", "s": seq, "d": null})
}

fn dispatch(name: &str, seq: u64, data: Value) -> Value {
    json!({"op": 0, "t": name, "s": seq, "d": data})
}

fn heartbeat_ack() -> Value {
    json!({"op": 11})
}

// ── Helpers ─────────────────────────────────────────────────

async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Run the fresh-login handshake: Hello in, Identify out, Ready in.
async fn fresh_login(gateway: &Gateway, mut wire: Wire, hello_ms: u64, session_id: &str) -> Wire {
    wire.push(hello(hello_ms));

    let server = tokio::spawn(async move {
        let identify = wire.next_frame().await;
        assert_eq!(
            identify.op,
            OpCode::Identify,
            "first outbound frame after dial must be Identify"
        );
        wire
    });

    let open = gateway.open();
    let (open_result, server) = tokio::join!(open, async {
        let wire = server.await.expect("server task panicked");
        wire.push(ready(session_id, 1));
        wire
    });
    open_result.expect("open failed");
    server
}

// ── Scenarios ───────────────────────────────────────────────

#[tokio::test]
async fn fresh_login_happy_path() {
    let (transport, wire) = scripted(false);
    let gateway = gateway_with(&transport);
    let mut events = gateway.take_events().expect("events already taken");

    let mut wire = fresh_login(&gateway, wire, 40, "S1").await;

    wire.push(dispatch("MESSAGE_CREATE", 2, json!({"content": "hi"})));

    // A heartbeat arrives within roughly one interval, carrying the last
    // observed sequence.
    let heartbeat = wire.next_heartbeat().await;
    let seq = heartbeat.d.as_ref().and_then(Value::as_u64);
    assert!(
        seq == Some(1) || seq == Some(2),
        "heartbeat carried {seq:?}, expected last sequence"
    );
    wire.push(heartbeat_ack());

    // Dispatch events arrive in transport order.
    let first = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no READY event")
        .expect("event channel closed");
    assert_eq!(first.name, "READY");
    assert_eq!(first.sequence, Some(1));

    let second = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no MESSAGE_CREATE event")
        .expect("event channel closed");
    assert_eq!(second.name, "MESSAGE_CREATE");
    assert_eq!(second.sequence, Some(2));

    assert_eq!(gateway.session_id().as_deref(), Some("S1"));
    assert_eq!(gateway.sequence(), Some(2));

    gateway.close().await.expect("close failed");
    assert!(transport.closes() >= 1);
}

#[tokio::test]
async fn missing_acks_kill_session_and_resume() {
    let (transport, wire) = scripted(false);
    let gateway = gateway_with(&transport);
    let mut events = gateway.take_events().expect("events already taken");

    // 40ms heartrate and no acks ever: the pacer declares death after two
    // missed intervals and the controller redials.
    let mut wire = fresh_login(&gateway, wire, 40, "S1").await;

    wait_until(|| transport.dials() >= 2).await;
    wire.push(hello(40));

    let resume = wire.next_non_heartbeat().await;
    assert_eq!(resume.op, OpCode::Resume, "reconnect must resume, not identify");
    let data = resume.d.expect("resume payload missing");
    assert_eq!(data["session_id"], "S1");
    assert_eq!(data["seq"], 1);
    assert_eq!(data["token"], "Bot test");

    wire.push(resumed(1));
    wire.push(heartbeat_ack());

    let first = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no READY event")
        .expect("event channel closed");
    assert_eq!(first.name, "READY");

    let second = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no RESUMED event")
        .expect("event channel closed");
    assert_eq!(second.name, "RESUMED");

    gateway.close().await.expect("close failed");
}

#[tokio::test]
async fn invalid_session_forces_fresh_login() {
    let (transport, wire) = scripted(false);
    let gateway = gateway_with(&transport);
    let _events = gateway.take_events().expect("events already taken");

    let mut wire = fresh_login(&gateway, wire, 50, "S1").await;
    assert_eq!(gateway.session_id().as_deref(), Some("S1"));

    wire.push(json!({"op": 9, "d": false}));

    wait_until(|| transport.dials() >= 2).await;
    // The resume pair was cleared before the redial.
    assert_eq!(gateway.session_id(), None);
    wire.push(hello(50));

    let auth = wire.next_non_heartbeat().await;
    assert_eq!(auth.op, OpCode::Identify, "cleared session must identify");

    wire.push(ready("S2", 1));
    wire.push(heartbeat_ack());

    wait_until(|| gateway.session_id().as_deref() == Some("S2")).await;

    gateway.close().await.expect("close failed");
}

#[tokio::test]
async fn server_reconnect_opcode_resumes() {
    let (transport, wire) = scripted(false);
    let gateway = gateway_with(&transport);
    let mut events = gateway.take_events().expect("events already taken");

    let mut wire = fresh_login(&gateway, wire, 50, "S1").await;

    wire.push(dispatch("MESSAGE_CREATE", 6, json!({"content": "bye"})));
    wire.push(json!({"op": 7}));

    wait_until(|| transport.dials() >= 2).await;
    wire.push(hello(50));

    let resume = wire.next_non_heartbeat().await;
    assert_eq!(resume.op, OpCode::Resume);
    let data = resume.d.expect("resume payload missing");
    assert_eq!(data["session_id"], "S1");
    assert_eq!(data["seq"], 6);

    wire.push(resumed(6));
    wire.push(heartbeat_ack());

    let names: Vec<String> = {
        let mut names = Vec::new();
        for _ in 0..3 {
            let event = timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("missing event")
                .expect("event channel closed");
            names.push(event.name);
        }
        names
    };
    assert_eq!(names, ["READY", "MESSAGE_CREATE", "RESUMED"]);

    gateway.close().await.expect("close failed");
}

#[tokio::test]
async fn retry_exhaustion_publishes_fatal_error() {
    let (transport, _wire) = scripted(true);
    let gateway = gateway_with(&transport);

    let err = gateway.open().await.expect_err("open must fail");
    assert!(matches!(
        err,
        GatewayError::Transport(TransportError::Dial(_))
    ));
    assert_eq!(transport.dials(), 1);

    let err = gateway.reconnect().await.expect_err("reconnect must fail");
    assert!(matches!(err, GatewayError::MaxTriesReached));
    // Exactly reconnect_retries dial attempts on top of the initial open.
    assert_eq!(transport.dials(), 1 + 3);

    let fatal = timeout(Duration::from_secs(1), gateway.wait())
        .await
        .expect("fatal slot empty");
    assert!(matches!(fatal, GatewayError::MaxTriesReached));
}

#[tokio::test]
async fn non_recoverable_close_code_skips_reconnect() {
    let (transport, wire) = scripted(false);
    let gateway = gateway_with(&transport);
    let _events = gateway.take_events().expect("events already taken");

    let wire = fresh_login(&gateway, wire, 50, "S1").await;

    // The server closes with 4004: redialing with the same token cannot
    // possibly go better, so the error must land on the fatal slot directly.
    wire.push_error(TransportError::Closed {
        code: 4004,
        reason: "Authentication failed".to_string(),
    });

    let fatal = timeout(Duration::from_secs(2), gateway.wait())
        .await
        .expect("fatal slot empty");
    assert!(matches!(
        fatal,
        GatewayError::Transport(TransportError::Closed { code: 4004, .. })
    ));
    assert_eq!(transport.dials(), 1, "no redial after a terminal close code");
}

#[tokio::test]
async fn server_requested_heartbeat_bypasses_tick() {
    let (transport, wire) = scripted(false);
    let gateway = gateway_with(&transport);
    let _events = gateway.take_events().expect("events already taken");

    // A one-minute heartrate: the ticker will not fire during this test.
    let mut wire = fresh_login(&gateway, wire, 60_000, "S1").await;

    // The pacer's single startup beat.
    let startup = wire.next_heartbeat().await;
    assert_eq!(startup.d.as_ref().and_then(Value::as_u64), Some(1));
    wire.push(heartbeat_ack());

    // Opcode 1 from the server demands an immediate beat.
    wire.push(json!({"op": 1}));
    let demanded = timeout(Duration::from_secs(1), wire.next_heartbeat())
        .await
        .expect("no heartbeat in response to server request");
    assert_eq!(demanded.d.as_ref().and_then(Value::as_u64), Some(1));

    gateway.close().await.expect("close failed");
}
