use chrono::{DateTime, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::{
    errors::{RestError, RestResult},
    protocol::LiveUpdate,
    timegrid::minute_of_day,
    types::{ExpiryDate, Range, RequestId, Symbol},
};

/// Raw match tolerance when snapping backend samples onto the grid.
const MATCH_TOLERANCE_MS: i64 = 30_000;

/// Cap on rendered series length; longer raw series are thinned for display.
/// Never applied before alert or statistic computation.
pub const MAX_RENDER_POINTS: usize = 2000;

/// One historical sample as returned by `GET /api/history`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawHistoryPoint {
    pub timestamp: String,
    #[serde(default, alias = "risk")]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub ltp: Option<f64>,
    #[serde(default)]
    pub delta: Option<f64>,
    #[serde(default)]
    pub theta: Option<f64>,
    #[serde(default)]
    pub iv: Option<f64>,
}

/// One aligned chart point. All numeric fields are nullable: `None` means
/// "no data yet" for past slots and "unknowable" for future ones.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryPoint {
    pub timestamp: NaiveDateTime,
    pub risk_score: Option<f64>,
    pub ltp: Option<f64>,
    pub delta: Option<f64>,
    pub theta: Option<f64>,
    pub iv: Option<f64>,
}

impl HistoryPoint {
    fn empty(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            risk_score: None,
            ltp: None,
            delta: None,
            theta: None,
            iv: None,
        }
    }
}

/// Parse a wire timestamp into session wall-clock time. RFC 3339 with or
/// without an offset; the offset itself is dropped, the backend and the grid
/// agree on the session timezone.
pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// Align raw history samples onto the session grid and splice in the latest
/// live reading.
///
/// Slots after `now` (minute-of-day comparison) come out all-`None`. Earlier
/// slots adopt the first raw sample within 30 s, otherwise forward-fill the
/// last adopted values; before any sample has been seen they stay `None`.
/// If a live reading exists its fields override the last slot that carries
/// an `ltp`, field by field, so the chart's right edge always shows the
/// freshest push data. Merging the same inputs twice yields the same output.
pub fn merge_history(
    raw: &[RawHistoryPoint],
    grid: &[NaiveDateTime],
    now: NaiveTime,
    live: Option<&LiveUpdate>,
) -> Vec<HistoryPoint> {
    let now_minute = minute_of_day(now);
    let mut filled = Vec::with_capacity(grid.len());
    let mut last_known: Option<HistoryPoint> = None;

    for &slot in grid {
        if minute_of_day(slot.time()) > now_minute {
            filled.push(HistoryPoint::empty(slot));
            continue;
        }

        let matched = raw.iter().find(|point| {
            parse_timestamp(&point.timestamp).is_some_and(|ts| {
                (ts - slot).num_milliseconds().abs() < MATCH_TOLERANCE_MS
            })
        });

        match (matched, &last_known) {
            (Some(point), _) => {
                let adopted = HistoryPoint {
                    timestamp: slot,
                    risk_score: point.risk_score,
                    ltp: point.ltp,
                    delta: point.delta,
                    theta: point.theta,
                    iv: point.iv,
                };
                last_known = Some(adopted.clone());
                filled.push(adopted);
            }
            (None, Some(known)) => {
                // Carry values forward, not timestamps.
                filled.push(HistoryPoint {
                    timestamp: slot,
                    ..known.clone()
                });
            }
            (None, None) => filled.push(HistoryPoint::empty(slot)),
        }
    }

    if let Some(live) = live {
        splice_live(&mut filled, live);
    }
    filled
}

/// Convert raw samples directly to chart points (non-intraday ranges that
/// render on their own axis rather than the session grid).
pub fn to_points(raw: &[RawHistoryPoint]) -> Vec<HistoryPoint> {
    raw.iter()
        .filter_map(|point| {
            let timestamp = parse_timestamp(&point.timestamp)?;
            Some(HistoryPoint {
                timestamp,
                risk_score: point.risk_score,
                ltp: point.ltp,
                delta: point.delta,
                theta: point.theta,
                iv: point.iv,
            })
        })
        .collect()
}

/// Override the last slot holding an `ltp` with the live reading's values;
/// fields absent from the reading keep the slot's fetched values.
pub fn splice_live(points: &mut [HistoryPoint], live: &LiveUpdate) {
    let Some(slot) = points.iter_mut().rev().find(|point| point.ltp.is_some()) else {
        return;
    };
    if live.ltp.is_some() {
        slot.ltp = live.ltp;
    }
    if live.risk_score.is_some() {
        slot.risk_score = live.risk_score;
    }
    if live.delta.is_some() {
        slot.delta = live.delta;
    }
    if live.theta.is_some() {
        slot.theta = live.theta;
    }
    if live.iv.is_some() {
        slot.iv = live.iv;
    }
}

/// Thin a series for display by keeping every `ceil(n / MAX_RENDER_POINTS)`-th
/// point. Lossy and display-only.
pub fn downsample(points: Vec<HistoryPoint>) -> Vec<HistoryPoint> {
    if points.len() <= MAX_RENDER_POINTS {
        return points;
    }
    let step = points.len().div_ceil(MAX_RENDER_POINTS);
    points
        .into_iter()
        .step_by(step)
        .collect()
}

/// Identity of one history request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HistoryKey {
    pub symbol: Symbol,
    pub expiry: ExpiryDate,
    pub range: Range,
}

/// Stale-response guard for history fetches.
///
/// Fetches are keyed by `(symbol, expiry, range)` and tagged with a
/// monotonically increasing [`RequestId`]; only the most recently begun
/// request is accepted, so a slow response for a superseded selection can
/// never overwrite a newer one.
#[derive(Debug, Default)]
pub struct HistoryFetcher {
    next_request: u64,
    latest: Option<(HistoryKey, RequestId)>,
}

impl HistoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new fetch as the current one and hand back its tag.
    pub fn begin(&mut self, key: HistoryKey) -> RequestId {
        self.next_request += 1;
        let request_id = RequestId::new(self.next_request);
        self.latest = Some((key, request_id));
        request_id
    }

    /// Whether a response tagged `request_id` for `key` is still the current
    /// request.
    pub fn is_current(&self, key: &HistoryKey, request_id: RequestId) -> bool {
        self.latest
            .as_ref()
            .is_some_and(|(latest_key, latest_id)| latest_key == key && *latest_id == request_id)
    }

    /// Accept a resolved fetch, or reject it as stale if a newer request was
    /// begun in the meantime.
    pub fn accept(
        &self,
        key: &HistoryKey,
        request_id: RequestId,
        points: Vec<RawHistoryPoint>,
    ) -> RestResult<Vec<RawHistoryPoint>> {
        if self.is_current(key, request_id) {
            Ok(points)
        } else {
            Err(RestError::Stale {
                symbol: key.symbol.clone(),
                request_id,
            })
        }
    }
}
