use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    errors::FeedResult,
    types::{ExpiryDate, Symbol},
};

/// Call/put side of a contract. Accepts the common wire spellings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    #[serde(alias = "CALL", alias = "CE")]
    Call,
    #[serde(alias = "PUT", alias = "PE")]
    Put,
}

/// Server-side action hint for a contract.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Recommendation {
    #[default]
    Hold,
    Reduce,
    Exit,
}

impl Recommendation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Recommendation::Hold => "HOLD",
            Recommendation::Reduce => "REDUCE",
            Recommendation::Exit => "EXIT",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Recommendation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Recommendation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // Unknown hints degrade to HOLD instead of poisoning the frame.
        Ok(match raw.to_ascii_uppercase().as_str() {
            "REDUCE" => Recommendation::Reduce,
            "EXIT" => Recommendation::Exit,
            _ => Recommendation::Hold,
        })
    }
}

/// One contract's current state as held by the store. Replaced wholesale on
/// snapshot, patched in place by live updates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub symbol: Symbol,
    pub strike: f64,
    #[serde(rename = "type")]
    pub option_type: OptionType,
    /// Last traded price. Snapshots carry this as `price`.
    #[serde(rename = "price", alias = "ltp")]
    pub ltp: f64,
    #[serde(alias = "risk")]
    pub risk_score: f64,
    #[serde(default)]
    pub delta: f64,
    #[serde(default)]
    pub theta: f64,
    #[serde(default)]
    pub iv: f64,
    #[serde(default)]
    pub recommendation: Recommendation,
}

/// Full-state baseline for all tracked options across all expiries. Not a
/// diff: applying it replaces every previously held expiry.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub timestamp: String,
    /// Expiry groups in the order the server sent them.
    pub expiries: Vec<(ExpiryDate, Vec<OptionQuote>)>,
}

/// Partial update for exactly one option's computed metrics. `None` fields
/// mean "unchanged".
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct LiveUpdate {
    pub symbol: Symbol,
    #[serde(default)]
    pub expiry: Option<ExpiryDate>,
    #[serde(default)]
    pub ltp: Option<f64>,
    #[serde(default, alias = "overall_risk_score")]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub delta: Option<f64>,
    #[serde(default)]
    pub theta: Option<f64>,
    #[serde(default)]
    pub iv: Option<f64>,
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
}

/// Classified inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    Snapshot(Snapshot),
    Update(LiveUpdate),
}

#[derive(Debug, Deserialize)]
struct SnapshotEnvelope {
    #[serde(default)]
    timestamp: String,
    /// `serde_json` is built with `preserve_order`, so iteration yields the
    /// server's expiry order.
    expiries: serde_json::Map<String, Value>,
}

/// Classify a raw frame into a snapshot or a live update.
///
/// A frame carrying an `expiries` map (or an explicit `"type": "snapshot"`
/// marker) is a snapshot; `"type": "greeks"` is a live update. `Ok(None)`
/// means the frame is well-formed JSON of a shape we do not consume; parse
/// failures surface as errors so the connection layer can log and drop them.
pub fn classify_frame(text: &str) -> FeedResult<Option<InboundFrame>> {
    let value: Value = serde_json::from_str(text)?;
    let frame_type = value.get("type").and_then(Value::as_str);

    if frame_type == Some("snapshot") || value.get("expiries").is_some() {
        return Ok(Some(InboundFrame::Snapshot(parse_snapshot(value)?)));
    }

    match frame_type {
        Some("greeks") => {
            let update: LiveUpdate = serde_json::from_value(value)?;
            Ok(Some(InboundFrame::Update(update)))
        }
        _ => Ok(None),
    }
}

/// Parse a snapshot-shaped body (push frame or `/api/snapshot` response).
pub fn parse_snapshot(value: Value) -> serde_json::Result<Snapshot> {
    let envelope: SnapshotEnvelope = serde_json::from_value(value)?;
    let mut expiries = Vec::with_capacity(envelope.expiries.len());
    for (expiry, options) in envelope.expiries {
        let options: Vec<OptionQuote> = serde_json::from_value(options)?;
        expiries.push((ExpiryDate::new(expiry), options));
    }
    Ok(Snapshot {
        timestamp: envelope.timestamp,
        expiries,
    })
}

/// Outbound control frame written to the push connection.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlFrame {
    Subscribe {
        symbol: Symbol,
        expiry: ExpiryDate,
    },
    UnsubscribeAll,
}

impl ControlFrame {
    pub fn to_json(&self) -> String {
        match self {
            ControlFrame::Subscribe { symbol, expiry } => json!({
                "subscribe": symbol.as_str(),
                "expiry": expiry.as_str(),
            })
            .to_string(),
            ControlFrame::UnsubscribeAll => json!({ "unsubscribe": true }).to_string(),
        }
    }
}
