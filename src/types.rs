use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Identifier for an option contract, e.g. `NIFTY24500CE`. Unique within a
/// snapshot; carries the strike and call/put suffix.
#[repr(transparent)]
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Expiry date used as a grouping key for options, ISO date string
/// (`2025-02-20`). Kept as a string key to match the wire format exactly.
#[repr(transparent)]
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpiryDate(String);

impl ExpiryDate {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for ExpiryDate {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ExpiryDate {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ExpiryDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monotonically increasing tag attached to history requests so a stale
/// response can be discarded.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<RequestId> for u64 {
    fn from(value: RequestId) -> Self {
        value.into_inner()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// History window requested for charting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Range {
    #[default]
    Intraday,
    Week,
    TwoWeeks,
    Month,
}

impl Range {
    pub const fn as_str(self) -> &'static str {
        match self {
            Range::Intraday => "1D",
            Range::Week => "1W",
            Range::TwoWeeks => "2W",
            Range::Month => "1M",
        }
    }

    /// Whether this range renders on the fixed intraday session grid.
    pub const fn is_intraday(self) -> bool {
        matches!(self, Range::Intraday)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Range {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1D" => Ok(Range::Intraday),
            "1W" => Ok(Range::Week),
            "2W" => Ok(Range::TwoWeeks),
            "1M" => Ok(Range::Month),
            other => Err(format!("unknown range: {other}")),
        }
    }
}

impl Serialize for Range {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Range {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_round_trips_through_str() {
        for range in [Range::Intraday, Range::Week, Range::TwoWeeks, Range::Month] {
            assert_eq!(range.as_str().parse::<Range>().unwrap(), range);
        }
    }

    #[test]
    fn range_rejects_unknown() {
        assert!("3M".parse::<Range>().is_err());
    }
}
