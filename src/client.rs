use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::mpsc;
use url::Url;

use crate::{
    connection::{build_ws_url, ConnectionManager, ConnectionState, FeedEvent, RECONNECT_DELAY},
    errors::{ClientError, ClientResult, FeedError},
    history::{
        downsample, merge_history, splice_live, to_points, HistoryFetcher, HistoryKey,
        HistoryPoint, RawHistoryPoint,
    },
    protocol::LiveUpdate,
    rest::RestClient,
    store::RiskStore,
    subscription::{Subscription, SubscriptionManager},
    timegrid::session_grid,
    types::{ExpiryDate, Range, Symbol},
};

/// Client configuration. Defaults target a local backend; everything is
/// overridable through the `with_` builders.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// http(s) base of the backend; the push endpoint is derived from it.
    pub base_url: String,
    pub ws_path: String,
    pub reconnect_delay: Duration,
    pub request_timeout: Duration,
    /// Capacity of the feed event channel.
    pub event_buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            ws_path: "/ws".to_string(),
            reconnect_delay: RECONNECT_DELAY,
            request_timeout: Duration::from_secs(10),
            event_buffer: 256,
        }
    }
}

impl FeedConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }
}

/// Top-level handle tying the pieces together: REST bootstrap, push
/// connection, reconciliation store, subscription intent and history fetches.
///
/// [`RiskFeedClient::connect`] performs the initial health check and snapshot
/// load before the push channel attaches; a failure there is
/// [`ClientError::Init`], the only error that should block the live view.
/// Afterwards the caller drives [`RiskFeedClient::next_event`] and reads the
/// store between events.
pub struct RiskFeedClient {
    store: RiskStore,
    connection: ConnectionManager,
    events: mpsc::Receiver<FeedEvent>,
    subscriptions: SubscriptionManager,
    rest: RestClient,
    fetcher: HistoryFetcher,
    state: ConnectionState,
}

impl RiskFeedClient {
    pub async fn connect(config: FeedConfig) -> ClientResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(FeedError::from)?;
        let rest = RestClient::new(base_url, config.request_timeout)?;

        rest.health().await.map_err(ClientError::Init)?;
        let snapshot = rest.snapshot().await.map_err(ClientError::Init)?;
        let mut store = RiskStore::new();
        store.apply_snapshot(snapshot);

        let ws_url = build_ws_url(&config.base_url, &config.ws_path)?;
        let (mut connection, events) =
            ConnectionManager::new(ws_url, config.reconnect_delay, config.event_buffer);
        let subscriptions = SubscriptionManager::new(connection.control_sender());
        connection.start();

        Ok(Self {
            store,
            connection,
            events,
            subscriptions,
            rest,
            fetcher: HistoryFetcher::new(),
            state: ConnectionState::Disconnected,
        })
    }

    /// Wait for the next feed event and apply it to the store. `None` means
    /// the connection task has ended for good.
    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        let event = self.events.recv().await?;
        match &event {
            FeedEvent::ConnectionStateChanged(state) => {
                self.state = *state;
                self.subscriptions.on_connection_state(*state);
            }
            FeedEvent::SnapshotReceived(snapshot) => self.store.apply_snapshot(snapshot.clone()),
            FeedEvent::UpdateReceived(update) => self.store.apply_live_update(update.clone()),
        }
        Some(event)
    }

    pub fn store(&self) -> &RiskStore {
        &self.store
    }

    /// Last observed connection state; `Disconnected` until the first event.
    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn select_expiry(&mut self, expiry: ExpiryDate) {
        self.store.select_expiry(expiry);
    }

    /// Start watching one contract for live updates. A new watch implicitly
    /// supersedes the previous one server-side.
    pub fn watch(&mut self, symbol: Symbol, expiry: ExpiryDate, range: Range) {
        self.subscriptions.set_active(Subscription {
            symbol: symbol.clone(),
            expiry: expiry.clone(),
            range,
        });
        self.subscriptions.subscribe(symbol, expiry);
    }

    /// Stop live updates for the watched contract, e.g. on leaving a detail
    /// view.
    pub fn stop_watching(&mut self) {
        self.subscriptions.unsubscribe();
    }

    pub fn watched(&self) -> Option<&Subscription> {
        self.subscriptions.active()
    }

    /// Fetch and assemble the historical series for one contract and range.
    ///
    /// Intraday series are aligned onto the fixed session grid; longer ranges
    /// render on their own axis and are thinned for display. Either way the
    /// freshest live reading is spliced in. A response that resolves after a
    /// newer `load_history` call was issued comes back as
    /// [`crate::errors::RestError::Stale`] and must not be rendered.
    pub async fn load_history(
        &mut self,
        symbol: Symbol,
        expiry: ExpiryDate,
        range: Range,
    ) -> ClientResult<Vec<HistoryPoint>> {
        let key = HistoryKey {
            symbol: symbol.clone(),
            expiry: expiry.clone(),
            range,
        };
        let request_id = self.fetcher.begin(key.clone());
        let raw = self.rest.history(&symbol, &expiry, range, request_id).await?;
        let raw = self.fetcher.accept(&key, request_id, raw)?;

        let live = self.store.latest_reading(&symbol).cloned();
        Ok(assemble_series(
            &raw,
            range,
            Local::now().naive_local(),
            live.as_ref(),
        ))
    }

    /// Intentional teardown: unsubscribe, close the connection, cancel any
    /// pending reconnect and clear the store.
    pub async fn shutdown(&mut self) {
        self.subscriptions.unsubscribe();
        self.connection.stop().await;
        self.store.reset();
    }
}

fn assemble_series(
    raw: &[RawHistoryPoint],
    range: Range,
    now: NaiveDateTime,
    live: Option<&LiveUpdate>,
) -> Vec<HistoryPoint> {
    if range.is_intraday() {
        let grid = session_grid(now.date());
        merge_history(raw, &grid, now.time(), live)
    } else {
        let mut points = downsample(to_points(raw));
        if let Some(live) = live {
            splice_live(&mut points, live);
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timegrid::GRID_POINTS;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 2, 20)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn config_defaults_are_sane() {
        let config = FeedConfig::default();
        assert_eq!(config.reconnect_delay, Duration::from_millis(3000));
        assert_eq!(config.ws_path, "/ws");

        let config = FeedConfig::new("https://risk.example.com")
            .with_ws_path("/stream")
            .with_event_buffer(64);
        assert_eq!(config.base_url, "https://risk.example.com");
        assert_eq!(config.ws_path, "/stream");
        assert_eq!(config.event_buffer, 64);
    }

    #[test]
    fn intraday_series_lands_on_the_session_grid() {
        let raw = vec![RawHistoryPoint {
            timestamp: "2025-02-20T09:15:00".to_string(),
            risk_score: Some(30.0),
            ltp: Some(100.0),
            delta: None,
            theta: None,
            iv: None,
        }];
        let series = assemble_series(&raw, Range::Intraday, noon(), None);
        assert_eq!(series.len(), GRID_POINTS);
        assert_eq!(series[0].ltp, Some(100.0));
    }

    #[test]
    fn longer_ranges_bypass_the_grid_and_splice_live() {
        let raw = vec![
            RawHistoryPoint {
                timestamp: "2025-02-18T10:00:00".to_string(),
                risk_score: Some(30.0),
                ltp: Some(100.0),
                delta: None,
                theta: None,
                iv: None,
            },
            RawHistoryPoint {
                timestamp: "2025-02-19T10:00:00".to_string(),
                risk_score: Some(35.0),
                ltp: Some(104.0),
                delta: None,
                theta: None,
                iv: None,
            },
        ];
        let live = LiveUpdate {
            symbol: Symbol::new("A"),
            ltp: Some(106.5),
            ..LiveUpdate::default()
        };
        let series = assemble_series(&raw, Range::Week, noon(), Some(&live));
        assert_eq!(series.len(), 2);
        assert_eq!(series[1].ltp, Some(106.5));
        assert_eq!(series[1].risk_score, Some(35.0));
    }
}
