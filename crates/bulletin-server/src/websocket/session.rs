//! Connection session lifecycle: one connected client from upgrade through
//! close.
//!
//! A session runs three loops side by side: the reader feeds inbound frames
//! to the dispatcher, the writer drains the outbound queue (plus control
//! frames) onto the transport, and the heartbeat watches liveness. Whichever
//! finishes first decides how the session ends:
//!
//! - close frame, end of stream, `disconnect` request or server shutdown:
//!   `Draining`, flush within the grace period, then `Closed`
//! - read/write failure, heartbeat timeout or the queue being closed from
//!   outside: straight to `Closed`, queue discarded

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use bulletin_core::{BulletinError, ServerEvent};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::Connection;
use super::dispatcher::{DispatchOutcome, EventDispatcher, encode_bulletin};
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;
use crate::hub::BulletinHub;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Bound on pending control frames (connect, ack, error) per session.
const CONTROL_CAPACITY: usize = 64;

/// Timing knobs for a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Interval between server Ping frames and heartbeat checks.
    pub heartbeat_interval: Duration,
    /// Silence after which the connection is considered dead.
    pub heartbeat_timeout: Duration,
    /// Upper bound on flushing a draining connection.
    pub drain_grace: Duration,
}

impl From<&ServerConfig> for SessionConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
            drain_grace: config.drain_grace(),
        }
    }
}

/// Everything a session needs from the server.
pub struct SessionContext {
    /// Shared registry, engine and dispatcher.
    pub hub: Arc<BulletinHub>,
    /// Timing.
    pub config: SessionConfig,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a `disconnect` event.
    ClientRequest,
    /// The client sent a Close frame or the stream ended.
    TransportClosed,
    /// The server is shutting down.
    Shutdown,
    /// The registry refused the connection.
    Refused(BulletinError),
    /// Reading from or writing to the transport failed.
    TransportError(String),
    /// No client activity within the heartbeat timeout.
    HeartbeatTimeout,
    /// The outbound queue was closed outside the session, e.g. the
    /// connection was unregistered.
    QueueClosed,
}

impl CloseReason {
    /// Short label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientRequest => "client_request",
            Self::TransportClosed => "transport_closed",
            Self::Shutdown => "server_shutdown",
            Self::Refused(_) => "resource_exhausted",
            Self::TransportError(_) => "transport_error",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::QueueClosed => "queue_closed",
        }
    }

    /// Whether the session drains its queue before closing.
    pub fn is_graceful(&self) -> bool {
        matches!(
            self,
            Self::ClientRequest | Self::TransportClosed | Self::Shutdown
        )
    }

    /// `disconnect` frame sent as the last thing on the transport, if any.
    fn farewell(&self) -> Option<ServerEvent> {
        match self {
            Self::ClientRequest | Self::Shutdown | Self::Refused(_) => {
                Some(ServerEvent::Disconnect {
                    reason: self.as_str().to_string(),
                })
            }
            _ => None,
        }
    }
}

/// How the reader loop stopped.
enum ReadEnd {
    Closed,
    DisconnectRequested,
    Failed(BulletinError),
}

/// Run a session over an upgraded axum `WebSocket`.
pub async fn run_ws_session(ws: WebSocket, ctx: Arc<SessionContext>) {
    let (sink, stream) = ws.split();
    let _ = serve_transport(sink, stream, &ctx).await;
}

/// Admit a transport into the registry and run its session.
///
/// If the registry is full the client gets a `disconnect` frame and the
/// transport is closed.
pub async fn serve_transport<S, R, E>(mut sink: S, stream: R, ctx: &SessionContext) -> CloseReason
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display,
{
    match ctx.hub.registry().register() {
        Ok(connection) => run_session(sink, stream, connection, ctx).await,
        Err(err) => {
            warn!(error = %err, "connection refused");
            let reason = CloseReason::Refused(err);
            if let Some(farewell) = reason.farewell() {
                let _ = sink.send(Message::Text(farewell.to_json().into())).await;
            }
            let _ = sink.close().await;
            reason
        }
    }
}

/// Drive one registered connection until it closes, then unregister it.
#[instrument(skip_all, fields(connection_id = %connection.id))]
pub async fn run_session<S, R, E>(
    sink: S,
    stream: R,
    connection: Arc<Connection>,
    ctx: &SessionContext,
) -> CloseReason
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display,
{
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
    let _ = control_tx.try_send(ServerEvent::Connect {
        connection_id: connection.id.clone(),
    });

    let heartbeat_cancel = ctx.shutdown.child_token();
    let writer = write_loop(sink, &connection, control_rx, ctx.config.heartbeat_interval);
    let reader = read_loop(stream, &connection, ctx.hub.dispatcher(), control_tx);
    let heartbeat = run_heartbeat(
        Arc::clone(&connection),
        ctx.config.heartbeat_interval,
        ctx.config.heartbeat_timeout,
        heartbeat_cancel.clone(),
    );
    tokio::pin!(writer, reader, heartbeat);

    // Only reader, heartbeat and shutdown endings are graceful, so the drain
    // below never polls a writer that already finished.
    let reason = tokio::select! {
        written = &mut writer => match written {
            Ok(mut sink) => {
                let _ = sink.close().await;
                CloseReason::QueueClosed
            }
            Err(err) => CloseReason::TransportError(err.to_string()),
        },
        read = &mut reader => match read {
            ReadEnd::Closed => CloseReason::TransportClosed,
            ReadEnd::DisconnectRequested => CloseReason::ClientRequest,
            ReadEnd::Failed(err) => CloseReason::TransportError(err.to_string()),
        },
        beat = &mut heartbeat => match beat {
            HeartbeatResult::TimedOut => CloseReason::HeartbeatTimeout,
            HeartbeatResult::Cancelled => CloseReason::Shutdown,
        },
        () = ctx.shutdown.cancelled() => CloseReason::Shutdown,
    };
    heartbeat_cancel.cancel();

    if reason.is_graceful() {
        if connection.begin_draining() {
            debug!(queued = connection.queue().len(), "draining");
        }
        match time::timeout(ctx.config.drain_grace, &mut writer).await {
            Ok(Ok(mut sink)) => {
                if let Some(farewell) = reason.farewell() {
                    let _ = sink.send(Message::Text(farewell.to_json().into())).await;
                }
                let _ = sink.close().await;
            }
            Ok(Err(err)) => debug!(error = %err, "flush failed while draining"),
            Err(_) => warn!(
                grace = ?ctx.config.drain_grace,
                discarded = connection.queue().len(),
                "drain grace elapsed"
            ),
        }
    } else {
        let discarded = connection.queue().len();
        let _ = connection.close();
        warn!(reason = reason.as_str(), discarded, "connection closed abruptly");
    }

    let _ = ctx.hub.registry().unregister(&connection.id);
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    info!(
        reason = reason.as_str(),
        graceful = reason.is_graceful(),
        age = ?connection.age(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    reason
}

/// Write control frames and queued bulletins, pinging every `ping_every`.
///
/// Returns the sink once the queue is finished and empty.
async fn write_loop<S>(
    mut sink: S,
    connection: &Connection,
    mut control: mpsc::Receiver<ServerEvent>,
    ping_every: Duration,
) -> Result<S, BulletinError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = time::interval_at(time::Instant::now() + ping_every, ping_every);

    loop {
        tokio::select! {
            biased;
            Some(event) = control.recv() => {
                send_text(&mut sink, event.to_json()).await?;
            }
            next = connection.queue().pop() => match next {
                Some(bulletin) => send_text(&mut sink, encode_bulletin(&bulletin)).await?,
                None => break,
            },
            _ = ping.tick() => {
                sink.send(Message::Ping(Bytes::new()))
                    .await
                    .map_err(BulletinError::transport)?;
            }
        }
    }

    while let Ok(event) = control.try_recv() {
        send_text(&mut sink, event.to_json()).await?;
    }
    Ok(sink)
}

async fn send_text<S>(sink: &mut S, text: String) -> Result<(), BulletinError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    sink.send(Message::Text(text.into()))
        .await
        .map_err(BulletinError::transport)
}

/// Read frames until the client leaves or the transport fails.
async fn read_loop<R, E>(
    mut stream: R,
    connection: &Connection,
    dispatcher: &EventDispatcher,
    control: mpsc::Sender<ServerEvent>,
) -> ReadEnd
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = stream.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(err) => return ReadEnd::Failed(BulletinError::transport(err)),
        };
        connection.mark_alive();

        let outcome = match message {
            Message::Text(text) => dispatcher.dispatch_text(&connection.id, text.as_str()),
            Message::Binary(bytes) => dispatcher.dispatch_binary(&connection.id, &bytes),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => {
                debug!("client sent close frame");
                return ReadEnd::Closed;
            }
        };

        match &outcome {
            DispatchOutcome::DisconnectRequested => return ReadEnd::DisconnectRequested,
            DispatchOutcome::Rejected(err) if err.is_fatal_to_session() => {
                return ReadEnd::Failed(err.clone());
            }
            _ => {}
        }
        if let Some(reply) = outcome.reply() {
            if control.try_send(reply).is_err() {
                warn!("control channel full, reply dropped");
            }
        }
    }
    ReadEnd::Closed
}
