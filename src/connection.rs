use std::{collections::VecDeque, fmt, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::sleep,
};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use url::Url;

use crate::{
    errors::FeedResult,
    protocol::{classify_frame, ControlFrame, InboundFrame, LiveUpdate, Snapshot},
};

/// Fixed delay between a connection loss and the next dial attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Observable lifecycle of the single logical push connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Typed event emitted by the connection task. The store consumes these;
/// nothing on the socket path mutates state directly.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
    ConnectionStateChanged(ConnectionState),
    SnapshotReceived(Snapshot),
    UpdateReceived(LiveUpdate),
}

/// Transition inputs for the connection state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ConnInput {
    Start,
    DialOk,
    DialErr,
    StreamEnded,
    RetryElapsed,
    Stop,
}

/// Effects requested by a transition, executed by the task loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ConnAction {
    Publish(ConnectionState),
    Dial,
    Drive,
    ScheduleRetry,
}

/// Pure state machine behind the connection task. Owns the rules — exactly
/// one reconnect attempt per loss, none after stop, dialing only from
/// `Disconnected` — so they are testable without a socket.
#[derive(Debug, Default)]
pub(crate) struct ConnFsm {
    state: ConnectionState,
    stopping: bool,
    retry_pending: bool,
}

impl ConnFsm {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn on(&mut self, input: ConnInput) -> Vec<ConnAction> {
        match input {
            ConnInput::Start => {
                if self.stopping
                    || self.retry_pending
                    || self.state != ConnectionState::Disconnected
                {
                    return Vec::new();
                }
                self.state = ConnectionState::Connecting;
                vec![
                    ConnAction::Publish(ConnectionState::Connecting),
                    ConnAction::Dial,
                ]
            }
            ConnInput::DialOk => {
                self.state = ConnectionState::Connected;
                vec![
                    ConnAction::Publish(ConnectionState::Connected),
                    ConnAction::Drive,
                ]
            }
            ConnInput::DialErr | ConnInput::StreamEnded => {
                self.state = ConnectionState::Disconnected;
                let mut actions = vec![ConnAction::Publish(ConnectionState::Disconnected)];
                if !self.stopping {
                    self.retry_pending = true;
                    actions.push(ConnAction::ScheduleRetry);
                }
                actions
            }
            ConnInput::RetryElapsed => {
                self.retry_pending = false;
                if self.stopping {
                    return Vec::new();
                }
                self.state = ConnectionState::Connecting;
                vec![
                    ConnAction::Publish(ConnectionState::Connecting),
                    ConnAction::Dial,
                ]
            }
            ConnInput::Stop => {
                self.stopping = true;
                self.retry_pending = false;
                Vec::new()
            }
        }
    }
}

/// Rewrite an http(s) base URL into the ws(s) push endpoint.
pub(crate) fn build_ws_url(host: &str, path: &str) -> FeedResult<Url> {
    let mut candidate = host.to_string();
    if candidate.starts_with("https://") {
        candidate = candidate.replacen("https://", "wss://", 1);
    } else if candidate.starts_with("http://") {
        candidate = candidate.replacen("http://", "ws://", 1);
    } else if !candidate.starts_with("ws://") && !candidate.starts_with("wss://") {
        candidate = format!("wss://{candidate}");
    }

    let mut url = Url::parse(&candidate)?;
    url.set_path(path);
    Ok(url)
}

enum Driven {
    Ended,
    Stopped,
}

struct ConnectionTask {
    url: Url,
    reconnect_delay: Duration,
    events: mpsc::Sender<FeedEvent>,
    commands: mpsc::Receiver<ControlFrame>,
    stop: watch::Receiver<bool>,
    fsm: ConnFsm,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut queue: VecDeque<ConnAction> = self.fsm.on(ConnInput::Start).into();
        let mut socket: Option<WebSocketStream<MaybeTlsStream<TcpStream>>> = None;

        while let Some(action) = queue.pop_front() {
            let produced = match action {
                ConnAction::Publish(state) => {
                    tracing::info!(%state, "connection state changed");
                    if self
                        .events
                        .send(FeedEvent::ConnectionStateChanged(state))
                        .await
                        .is_err()
                    {
                        return;
                    }
                    Vec::new()
                }
                ConnAction::Dial => {
                    tokio::select! {
                        result = connect_async(self.url.as_str()) => match result {
                            Ok((stream, _)) => {
                                socket = Some(stream);
                                self.fsm.on(ConnInput::DialOk)
                            }
                            Err(err) => {
                                tracing::warn!(%err, url = %self.url, "dial failed");
                                self.fsm.on(ConnInput::DialErr)
                            }
                        },
                        _ = wait_for_stop(&mut self.stop) => self.fsm.on(ConnInput::Stop),
                    }
                }
                ConnAction::Drive => {
                    let Some(stream) = socket.take() else {
                        continue;
                    };
                    match self.drive(stream).await {
                        Driven::Ended => self.fsm.on(ConnInput::StreamEnded),
                        Driven::Stopped => self.fsm.on(ConnInput::Stop),
                    }
                }
                ConnAction::ScheduleRetry => {
                    tokio::select! {
                        _ = sleep(self.reconnect_delay) => self.fsm.on(ConnInput::RetryElapsed),
                        _ = wait_for_stop(&mut self.stop) => self.fsm.on(ConnInput::Stop),
                    }
                }
            };
            queue.extend(produced);
        }
    }

    /// Pump one open socket: inbound frames out as events, queued control
    /// frames onto the wire. Returns when the socket dies or stop is
    /// requested. A socket error forces a close rather than lingering
    /// half-open.
    async fn drive(&mut self, stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Driven {
        let (mut sink, mut source) = stream.split();
        loop {
            tokio::select! {
                _ = wait_for_stop(&mut self.stop) => {
                    let _ = sink.close().await;
                    return Driven::Stopped;
                }
                command = self.commands.recv() => match command {
                    Some(frame) => {
                        if let Err(err) = sink.send(Message::Text(frame.to_json())).await {
                            tracing::warn!(%err, "control frame send failed");
                            return Driven::Ended;
                        }
                    }
                    None => return Driven::Stopped,
                },
                message = source.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if !forward_frame(&self.events, &text).await {
                            return Driven::Stopped;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => {
                            if !forward_frame(&self.events, &text).await {
                                return Driven::Stopped;
                            }
                        }
                        Err(_) => tracing::warn!("non-utf8 frame dropped"),
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => return Driven::Ended,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(%err, "socket error, forcing close");
                        return Driven::Ended;
                    }
                },
            }
        }
    }
}

/// Classify and forward one inbound frame. Malformed or unrecognized frames
/// are logged and dropped; they never disturb the task. Returns `false` when
/// the event receiver is gone.
async fn forward_frame(events: &mpsc::Sender<FeedEvent>, text: &str) -> bool {
    let event = match classify_frame(text) {
        Ok(Some(InboundFrame::Snapshot(snapshot))) => FeedEvent::SnapshotReceived(snapshot),
        Ok(Some(InboundFrame::Update(update))) => FeedEvent::UpdateReceived(update),
        Ok(None) => {
            tracing::debug!("frame of unknown shape ignored");
            return true;
        }
        Err(err) => {
            tracing::warn!(%err, "malformed frame dropped");
            return true;
        }
    };
    events.send(event).await.is_ok()
}

async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    // A dropped sender counts as a stop request.
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Owner of the push-connection lifecycle.
///
/// `start` spawns the socket task exactly once; repeated calls are no-ops,
/// so only one physical connection can exist. `stop` closes the socket,
/// cancels any pending reconnect timer and suppresses further attempts.
/// Inbound frame handling lives entirely here — other components only write
/// control frames through [`ConnectionManager::control_sender`].
pub struct ConnectionManager {
    task: Option<ConnectionTask>,
    handle: Option<JoinHandle<()>>,
    stop: watch::Sender<bool>,
    commands: mpsc::Sender<ControlFrame>,
}

impl ConnectionManager {
    pub fn new(
        ws_url: Url,
        reconnect_delay: Duration,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (events_tx, events_rx) = mpsc::channel(event_buffer.max(1));
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = ConnectionTask {
            url: ws_url,
            reconnect_delay,
            events: events_tx,
            commands: commands_rx,
            stop: stop_rx,
            fsm: ConnFsm::new(),
        };

        let manager = Self {
            task: Some(task),
            handle: None,
            stop: stop_tx,
            commands: commands_tx,
        };
        (manager, events_rx)
    }

    /// Spawn the connection task. No-op if already started.
    pub fn start(&mut self) {
        match self.task.take() {
            Some(task) => {
                self.handle = Some(tokio::spawn(task.run()));
            }
            None => tracing::debug!("start ignored, connection task already running"),
        }
    }

    /// Outbound control-frame handle for the subscription manager.
    pub fn control_sender(&self) -> mpsc::Sender<ControlFrame> {
        self.commands.clone()
    }

    /// Close the connection and suppress reconnection. Awaits task exit so
    /// no timer or socket outlives the manager.
    pub async fn stop(&mut self) {
        let _ = self.stop.send(true);
        self.task = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
