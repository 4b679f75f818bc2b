//! The gateway session controller
//!
//! Owns the socket, drives the Hello → Identify/Resume → Ready/Resumed
//! handshake, multiplexes inbound frames into the event channel, watches the
//! pacemaker, and reconnects with resume semantics when the session dies.

use crate::client::{Identifier, Sequence};
use crate::codec::{Codec, Json};
use crate::error::GatewayError;
use crate::events::{Event, EventType};
use crate::protocol::{Envelope, OpCode, Ready, ENCODING, VERSION};
use crate::rest::RestClient;
use crate::transport::{CloseFrame, Transport, TransportError, WebsocketTransport};
use async_trait::async_trait;
use cord_common::GatewayConfig;
use cord_heart::{Death, HeartError, Pacemaker, Pulse};
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// A connected (or connectable) gateway session.
///
/// All events received over the session are dispatch frames; control frames
/// are consumed internally. Terminal failures surface through [`wait`].
///
/// [`wait`]: Gateway::wait
pub struct Gateway {
    inner: Arc<Inner>,
    events_rx: StdMutex<Option<mpsc::Receiver<Event>>>,
    fatal_rx: Mutex<mpsc::Receiver<GatewayError>>,
}

/// Background tasks of one session. The event-loop wrapper removes its own
/// handle before it initiates a reconnect, so teardown never awaits the task
/// it runs on.
struct SessionTasks {
    pacemaker: Arc<Pacemaker>,
    pace_task: JoinHandle<()>,
    event_task: Option<JoinHandle<()>>,
}

struct Inner {
    config: GatewayConfig,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    identifier: Identifier,

    // Resume pair: an empty session id means the fresh-login path.
    session_id: StdRwLock<Option<String>>,
    sequence: Sequence,

    // Current pacemaker, replaced wholesale on every reconnect.
    pacemaker: StdRwLock<Option<Arc<Pacemaker>>>,

    events_tx: mpsc::Sender<Event>,
    fatal_tx: mpsc::Sender<GatewayError>,

    // Readers/writers gate: sends take the read side, the handshake and only
    // the handshake holds the write side.
    available: RwLock<()>,
    tasks: Mutex<Option<SessionTasks>>,
}

/// The pacemaker's pulse: one gated heartbeat frame per beat.
struct Heartbeater {
    inner: Arc<Inner>,
}

#[async_trait]
impl Pulse for Heartbeater {
    async fn beat(&self) -> Result<(), HeartError> {
        self.inner
            .send_envelope(true, Envelope::heartbeat(self.inner.sequence.get()))
            .await
            .map_err(|err| HeartError::Pulse(Box::new(err)))
    }
}

impl Gateway {
    /// Connect a gateway with the default JSON codec.
    ///
    /// Fetches the gateway URL over REST and prepares an undialed websocket;
    /// call [`open`](Self::open) to actually connect.
    pub async fn new(token: impl Into<String>) -> Result<Self, GatewayError> {
        Self::new_with_codec(token, Arc::new(Json)).await
    }

    /// Connect a gateway with a custom wire codec.
    pub async fn new_with_codec(
        token: impl Into<String>,
        codec: Arc<dyn Codec>,
    ) -> Result<Self, GatewayError> {
        let url = RestClient::new().gateway_url().await?;
        let url = format!("{url}?v={VERSION}&encoding={ENCODING}");
        debug!(url = %url, "resolved gateway endpoint");

        let transport = Arc::new(WebsocketTransport::new(url));
        Ok(Self::from_parts(
            Identifier::new(token),
            transport,
            codec,
            GatewayConfig::from_env(),
        ))
    }

    /// Assemble a gateway from explicit collaborators.
    #[must_use]
    pub fn from_parts(
        identifier: Identifier,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn Codec>,
        config: GatewayConfig,
    ) -> Self {
        // Buffer of at least 1 so the handshake can forward Ready/Resumed
        // without anyone draining the channel yet.
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer());
        let (fatal_tx, fatal_rx) = mpsc::channel(1);

        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                codec,
                identifier,
                session_id: StdRwLock::new(None),
                sequence: Sequence::new(),
                pacemaker: StdRwLock::new(None),
                events_tx,
                fatal_tx,
                available: RwLock::new(()),
                tasks: Mutex::new(None),
            }),
            events_rx: StdMutex::new(Some(events_rx)),
            fatal_rx: Mutex::new(fatal_rx),
        }
    }

    /// Dial the websocket and run the handshake.
    pub async fn open(&self) -> Result<(), GatewayError> {
        Inner::open(&self.inner).await
    }

    /// Run the handshake on an already-dialed socket.
    pub async fn start(&self) -> Result<(), GatewayError> {
        Inner::start(&self.inner).await
    }

    /// Stop the pacemaker, wait for the background tasks to exit, and close
    /// the websocket. Call at most once per successful open.
    pub async fn close(&self) -> Result<(), GatewayError> {
        Inner::close(&self.inner).await
    }

    /// Tear down any live session and retry [`open`](Self::open) up to the
    /// configured number of times.
    pub async fn reconnect(&self) -> Result<(), GatewayError> {
        Inner::reconnect(&self.inner).await
    }

    /// Send a payload under the given op code.
    ///
    /// Concurrent sends are fine; none run while a handshake or teardown is
    /// in progress.
    pub async fn send<T: Serialize>(&self, op: OpCode, payload: &T) -> Result<(), GatewayError> {
        let value = serde_json::to_value(payload)?;
        self.inner
            .send_envelope(true, Envelope::wrap(op, Some(value)))
            .await
    }

    /// Block until the gateway fails fatally (reconnect retries exhausted).
    pub async fn wait(&self) -> GatewayError {
        match self.fatal_rx.lock().await.recv().await {
            Some(err) => err,
            // Unreachable while the gateway is alive: the controller keeps a
            // sender for the fatal slot.
            None => GatewayError::MaxTriesReached,
        }
    }

    /// Non-blocking probe of the fatal-error slot.
    #[must_use]
    pub fn try_wait(&self) -> Option<GatewayError> {
        self.fatal_rx.try_lock().ok()?.try_recv().ok()
    }

    /// Take the dispatch event receiver. Yields `Some` exactly once.
    #[must_use]
    pub fn take_events(&self) -> Option<mpsc::Receiver<Event>> {
        self.events_rx.lock().ok()?.take()
    }

    /// The current session id, if a session has been established.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id()
    }

    /// The last observed dispatch sequence number.
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.inner.sequence.get()
    }
}

impl Inner {
    async fn open(inner: &Arc<Self>) -> Result<(), GatewayError> {
        match tokio::time::timeout(inner.config.send_timeout(), inner.transport.dial()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(GatewayError::Transport(TransportError::Dial(
                    "dial deadline elapsed".into(),
                )))
            }
        }

        debug!("dialed, starting handshake");
        Self::start(inner).await
    }

    /// `open` behind type erasure: it is reachable from inside the event-loop
    /// task it spawns, so one link of the call cycle must be boxed.
    fn open_boxed(inner: &Arc<Self>) -> BoxFuture<'_, Result<(), GatewayError>> {
        Box::pin(Self::open(inner))
    }

    async fn start(inner: &Arc<Self>) -> Result<(), GatewayError> {
        let available = inner.available.write().await;

        match Self::handshake(inner).await {
            Ok(()) => {
                debug!("started successfully");
                Ok(())
            }
            Err(err) => {
                // Release the gate first: the pacemaker's first beat may be
                // parked on the read side and has to drain before teardown
                // can observe the stop.
                drop(available);

                debug!(error = %err, "handshake failed, tearing down");
                if let Err(close_err) = Self::close(inner).await {
                    debug!(error = %close_err, "teardown after failed handshake also failed");
                }
                Err(err)
            }
        }
    }

    /// The handshake proper; runs with `available` held in write mode.
    async fn handshake(inner: &Arc<Self>) -> Result<(), GatewayError> {
        // Hello carries the heartrate.
        let raw = Self::recv_deadline(inner, inner.config.send_timeout()).await?;
        let envelope = inner.codec.decode(&raw)?;
        if envelope.op != OpCode::Hello {
            return Err(GatewayError::UnexpectedOpcode {
                expected: OpCode::Hello,
                got: envelope.op,
            });
        }
        let hello = envelope
            .as_hello()
            .ok_or_else(|| GatewayError::Protocol("hello frame missing payload".to_string()))?;
        let heartrate = hello.heartrate();
        debug!(heartbeat_interval_ms = hello.heartbeat_interval, "received hello");

        let read_deadline = heartrate + inner.config.extra_read_timeout();
        inner.transport.set_read_timeout(Some(read_deadline)).await;

        // Fresh pacemaker per session; registered before anything can fail so
        // teardown always finds it.
        let pacemaker = Pacemaker::new(heartrate);
        let (pace_task, death) = pacemaker.start(Heartbeater {
            inner: Arc::clone(inner),
        });
        inner.set_pacemaker(Some(Arc::clone(&pacemaker)));
        *inner.tasks.lock().await = Some(SessionTasks {
            pacemaker,
            pace_task,
            event_task: None,
        });

        // Identify on a fresh session, Resume on a dead one. Both bypass the
        // gate we are holding.
        match inner.session_id() {
            None => {
                debug!("identifying (fresh session)");
                let identify = Envelope::identify(&inner.identifier.identify());
                inner.send_envelope(false, identify).await?;
            }
            Some(session_id) => {
                let seq = inner.sequence.get().ok_or(GatewayError::MissingForResume)?;
                debug!(session_id = %session_id, seq, "resuming");
                let resume = Envelope::resume(&inner.identifier.resume(session_id, seq));
                inner.send_envelope(false, resume).await?;
            }
        }

        // The server answers with Ready or Resumed; read it under an explicit
        // deadline rather than trusting the transport's alone.
        let raw = Self::recv_deadline(inner, read_deadline).await?;
        if raw.is_empty() {
            return Err(GatewayError::EmptyFrame);
        }
        let envelope = inner.codec.decode(&raw)?;
        match envelope.op {
            OpCode::Dispatch => Self::handle_dispatch(inner, &envelope).await?,
            OpCode::InvalidSession => {
                inner.clear_session();
                return Err(GatewayError::InvalidSession);
            }
            got => {
                return Err(GatewayError::UnexpectedOpcode {
                    expected: OpCode::Dispatch,
                    got,
                })
            }
        }

        let event_task = tokio::spawn(Self::run_session(Arc::clone(inner), death));
        if let Some(tasks) = inner.tasks.lock().await.as_mut() {
            tasks.event_task = Some(event_task);
        }

        Ok(())
    }

    /// Event-loop wrapper task: runs the loop, then drives reconnect when it
    /// failed.
    async fn run_session(inner: Arc<Self>, mut death: Death) {
        let result = Self::event_loop(&inner, &mut death).await;

        // Drop our own handle from the session slot before any teardown.
        if let Some(tasks) = inner.tasks.lock().await.as_mut() {
            tasks.event_task = None;
        }

        let Err(err) = result else {
            debug!("event loop stopped cleanly");
            return;
        };

        if !err.should_reconnect() {
            error!(error = %err, "gateway closed with a non-recoverable code");
            let _ = inner.fatal_tx.try_send(err);
            return;
        }

        error!(error = %err, "event loop failed, reconnecting");
        if let Err(fatal) = Self::reconnect(&inner).await {
            error!(error = %fatal, "gateway is dead");
            // No-op when reconnect already published the exhaustion error.
            let _ = inner.fatal_tx.try_send(fatal);
        }
    }

    async fn event_loop(inner: &Arc<Self>, death: &mut Death) -> Result<(), GatewayError> {
        loop {
            tokio::select! {
                verdict = &mut *death => {
                    return match verdict {
                        Ok(Ok(())) => {
                            debug!("pacemaker stopped without errors");
                            Ok(())
                        }
                        Ok(Err(err)) => Err(err.into()),
                        // Pacer task dropped without a verdict.
                        Err(_) => Ok(()),
                    };
                }
                frame = inner.transport.recv() => {
                    let raw = frame?;
                    if raw.is_empty() {
                        return Err(GatewayError::EmptyFrame);
                    }

                    match Self::handle_frame(inner, &raw).await {
                        Ok(()) => {}
                        Err(err) if err.is_session_fatal() => return Err(err),
                        Err(err) => warn!(error = %err, "gateway handler error"),
                    }
                }
            }
        }
    }

    async fn handle_frame(inner: &Arc<Self>, raw: &[u8]) -> Result<(), GatewayError> {
        let envelope = inner.codec.decode(raw)?;
        trace!(%envelope, "received frame");

        match envelope.op {
            OpCode::Dispatch => Self::handle_dispatch(inner, &envelope).await,
            OpCode::Heartbeat => {
                debug!("server requested an immediate heartbeat");
                inner
                    .send_envelope(true, Envelope::heartbeat(inner.sequence.get()))
                    .await
            }
            OpCode::HeartbeatAck => {
                trace!("heartbeat acknowledged");
                if let Some(pacemaker) = inner.pacemaker() {
                    pacemaker.echo();
                }
                Ok(())
            }
            OpCode::Reconnect => {
                info!("server requested a reconnect");
                Err(GatewayError::ReconnectRequested)
            }
            OpCode::InvalidSession => {
                warn!("server invalidated the session");
                inner.clear_session();
                Err(GatewayError::InvalidSession)
            }
            OpCode::Hello => {
                warn!("unexpected hello mid-session");
                Ok(())
            }
            op => {
                warn!(%op, direction = ?op.direction(), "ignoring frame the server should not send");
                Ok(())
            }
        }
    }

    async fn handle_dispatch(inner: &Arc<Self>, envelope: &Envelope) -> Result<(), GatewayError> {
        // Transport-arrival order is authoritative for the sequence.
        if let Some(seq) = envelope.s {
            inner.sequence.set(seq);
        }

        match envelope.event_name().and_then(EventType::parse) {
            Some(EventType::Ready) => {
                let ready: Ready = envelope.payload().map_err(|err| {
                    GatewayError::Protocol(format!("malformed ready payload: {err}"))
                })?;
                info!(session_id = %ready.session_id, "session ready");
                inner.set_session_id(Some(ready.session_id));
            }
            Some(EventType::Resumed) => {
                info!("session resumed");
            }
            _ => {}
        }

        let event = Event::from_envelope(envelope);
        if inner.events_tx.send(event).await.is_err() {
            warn!("event receiver dropped; discarding dispatch event");
        }
        Ok(())
    }

    async fn reconnect(inner: &Arc<Self>) -> Result<(), GatewayError> {
        debug!("reconnecting");

        if inner.tasks.lock().await.is_some() {
            debug!("gateway is not closed, closing before reconnecting");
            if let Err(err) = Self::close(inner).await {
                debug!(error = %err, "pre-reconnect close failed");
            }
        }

        for attempt in 0..inner.config.reconnect_retries {
            debug!(attempt, "trying to open the gateway");

            match Self::open_boxed(inner).await {
                Ok(()) => {
                    info!(attempt, "reconnected");
                    return Ok(());
                }
                Err(GatewayError::InvalidSession) => {
                    // The handler already cleared the resume pair; the next
                    // attempt takes the Identify path.
                    warn!(attempt, "session invalidated while reconnecting");
                }
                Err(err) if !err.should_reconnect() => {
                    error!(attempt, error = %err, "server refused the session, giving up");
                    return Err(err);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "failed to open gateway");
                }
            }
        }

        let _ = inner.fatal_tx.try_send(GatewayError::MaxTriesReached);
        Err(GatewayError::MaxTriesReached)
    }

    async fn close(inner: &Arc<Self>) -> Result<(), GatewayError> {
        debug!("stopping pacemaker");
        let tasks = inner.tasks.lock().await.take();

        if let Some(tasks) = tasks {
            tasks.pacemaker.stop();
            // The pacer's exit publishes its death, which wakes the event
            // loop; waiting on the pacer first keeps shutdown ordered.
            let _ = tasks.pace_task.await;
            if let Some(event_task) = tasks.event_task {
                let _ = event_task.await;
            }
            debug!("background tasks finished");
        }

        inner.set_pacemaker(None);
        inner.transport.close(Some(CloseFrame::normal())).await?;
        Ok(())
    }

    async fn send_envelope(&self, acquire: bool, envelope: Envelope) -> Result<(), GatewayError> {
        trace!(%envelope, "sending frame");
        let raw = self.codec.encode(&envelope)?;

        // Handshake-internal sends already run under the write side of the
        // gate and must not take it again.
        let _gate = if acquire {
            Some(self.available.read().await)
        } else {
            None
        };

        match tokio::time::timeout(self.config.send_timeout(), self.transport.send(raw)).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(GatewayError::SendTimeout),
        }
    }

    async fn recv_deadline(
        inner: &Arc<Self>,
        deadline: Duration,
    ) -> Result<Vec<u8>, GatewayError> {
        match tokio::time::timeout(deadline, inner.transport.recv()).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(GatewayError::Transport(TransportError::ReadTimeout)),
        }
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|guard| guard.clone())
    }

    fn set_session_id(&self, value: Option<String>) {
        if let Ok(mut guard) = self.session_id.write() {
            *guard = value;
        }
    }

    fn clear_session(&self) {
        self.set_session_id(None);
        self.sequence.reset();
    }

    fn pacemaker(&self) -> Option<Arc<Pacemaker>> {
        self.pacemaker.read().ok().and_then(|guard| guard.clone())
    }

    fn set_pacemaker(&self, value: Option<Arc<Pacemaker>>) {
        if let Ok(mut guard) = self.pacemaker.write() {
            *guard = value;
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("session_id", &self.session_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}
