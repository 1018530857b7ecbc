use tokio::sync::mpsc;

use crate::{
    connection::ConnectionState,
    protocol::ControlFrame,
    types::{ExpiryDate, Range, Symbol},
};

/// The single contract currently observed for live Greeks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub symbol: Symbol,
    pub expiry: ExpiryDate,
    pub range: Range,
}

/// Tracks which option is active and writes subscribe/unsubscribe intents to
/// the connection's control channel. It never reads from the socket.
///
/// A subscribe issued before the connection is open is queued and flushed
/// exactly once when the state reaches `Connected`, so callers never have to
/// guess at retry timing. The server treats a new subscribe as an implicit
/// replacement, so resubscribing does not require an unsubscribe first.
pub struct SubscriptionManager {
    control: mpsc::Sender<ControlFrame>,
    active: Option<Subscription>,
    pending: Option<ControlFrame>,
    connected: bool,
}

impl SubscriptionManager {
    pub fn new(control: mpsc::Sender<ControlFrame>) -> Self {
        Self {
            control,
            active: None,
            pending: None,
            connected: false,
        }
    }

    /// Record the active contract without touching the wire.
    pub fn set_active(&mut self, subscription: Subscription) {
        self.active = Some(subscription);
    }

    pub fn active(&self) -> Option<&Subscription> {
        self.active.as_ref()
    }

    /// Ask the server for live updates on one contract. Queued until the
    /// connection opens if it is not open yet.
    pub fn subscribe(&mut self, symbol: Symbol, expiry: ExpiryDate) {
        let frame = ControlFrame::Subscribe { symbol, expiry };
        if self.connected {
            self.send(frame);
        } else {
            tracing::debug!("connection not open, subscribe queued");
            self.pending = Some(frame);
        }
    }

    /// Stop all live updates. Clears any queued subscribe so a pending intent
    /// cannot resurrect after teardown.
    pub fn unsubscribe(&mut self) {
        self.active = None;
        self.pending = None;
        if self.connected {
            self.send(ControlFrame::UnsubscribeAll);
        }
    }

    /// React to a connection lifecycle edge. On `Connected` the queued intent
    /// is flushed once; with nothing queued, the active subscription is
    /// re-issued because the server forgets it across reconnects.
    pub fn on_connection_state(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Connected => {
                self.connected = true;
                if let Some(frame) = self.pending.take() {
                    self.send(frame);
                } else if let Some(active) = &self.active {
                    self.send(ControlFrame::Subscribe {
                        symbol: active.symbol.clone(),
                        expiry: active.expiry.clone(),
                    });
                }
            }
            ConnectionState::Connecting | ConnectionState::Disconnected => {
                self.connected = false;
            }
        }
    }

    fn send(&self, frame: ControlFrame) {
        if let Err(err) = self.control.try_send(frame) {
            tracing::warn!(%err, "control channel rejected frame");
        }
    }
}
