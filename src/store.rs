use std::collections::HashMap;

use crate::{
    protocol::{LiveUpdate, OptionQuote, Snapshot},
    types::{ExpiryDate, Symbol},
};

/// Risk score above which an option enters the alert set. The boundary value
/// itself does not alert.
pub const ALERT_THRESHOLD: f64 = 75.0;

/// Upper bound of the "safe" band for overview filtering.
pub const SAFE_THRESHOLD: f64 = 50.0;

/// An alerting option paired with the expiry it belongs to. Derived state,
/// recomputed from the stored quotes rather than held independently.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertEntry {
    pub expiry: ExpiryDate,
    pub option: OptionQuote,
}

/// Three-way risk partition used by overview filters. `Watch` (the
/// 50..=75 band) has no dedicated filter bucket and only shows under "all";
/// that split is intentional.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiskBand {
    Safe,
    Watch,
    HighRisk,
}

impl RiskBand {
    pub fn of(risk_score: f64) -> Self {
        if risk_score <= SAFE_THRESHOLD {
            RiskBand::Safe
        } else if risk_score <= ALERT_THRESHOLD {
            RiskBand::Watch
        } else {
            RiskBand::HighRisk
        }
    }
}

/// Central reconciliation store: the single source of truth for option state.
///
/// Ingests full snapshots and incremental per-option updates and derives the
/// alert set and expiry selection from them. The store is the only mutator of
/// option state; consumers read via the accessors and never mutate what they
/// are handed. Connection drops do not touch it — only [`RiskStore::reset`]
/// clears state, so the UI degrades to "stale but present" instead of blank.
#[derive(Debug, Default)]
pub struct RiskStore {
    expiries: Vec<(ExpiryDate, Vec<OptionQuote>)>,
    available_expiries: Vec<ExpiryDate>,
    selected_expiry: Option<ExpiryDate>,
    alerts: Vec<AlertEntry>,
    last_updated: Option<String>,
    /// Freshest live reading per symbol, consumed by the history merger.
    /// Deliberately survives snapshot application: a snapshot arriving after
    /// a live update must not revert the fresher spliced values.
    latest_readings: HashMap<Symbol, LiveUpdate>,
}

impl RiskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all expiry/option state with the snapshot baseline.
    ///
    /// Recomputes the available-expiry list (server order), defaults the
    /// selection to the first expiry when nothing valid is selected, and
    /// rescans every option for alerts. Applying the same snapshot twice
    /// yields identical derived state.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.available_expiries = snapshot
            .expiries
            .iter()
            .map(|(expiry, _)| expiry.clone())
            .collect();
        self.expiries = snapshot.expiries;
        self.last_updated = Some(snapshot.timestamp);

        let selection_valid = self
            .selected_expiry
            .as_ref()
            .is_some_and(|expiry| self.available_expiries.contains(expiry));
        if !selection_valid {
            self.selected_expiry = self.available_expiries.first().cloned();
        }

        self.recompute_alerts();
    }

    /// Merge a partial per-option update into the matching quote.
    ///
    /// The currently selected expiry is scanned first, then the update's
    /// explicit expiry, then everything else. An update for a symbol the
    /// store does not know leaves the visible state untouched — it never
    /// creates a new option — but the latest-reading slot is recorded either
    /// way so the history splice always sees the freshest push data.
    pub fn apply_live_update(&mut self, update: LiveUpdate) {
        self.record_latest_reading(&update);

        let Some(quote) = self.find_quote_mut(&update) else {
            tracing::debug!(symbol = %update.symbol, "live update for unknown symbol dropped");
            return;
        };

        if let Some(ltp) = update.ltp {
            quote.ltp = ltp;
        }
        if let Some(risk_score) = update.risk_score {
            quote.risk_score = risk_score;
        }
        if let Some(delta) = update.delta {
            quote.delta = delta;
        }
        if let Some(theta) = update.theta {
            quote.theta = theta;
        }
        if let Some(iv) = update.iv {
            quote.iv = iv;
        }
        if let Some(recommendation) = update.recommendation {
            quote.recommendation = recommendation;
        }

        // Recompute on every update as well as on snapshots, so an option
        // crossing the threshold alerts without waiting for the next baseline.
        self.recompute_alerts();
    }

    /// Switch the active expiry view. A no-op for unknown expiries; stored
    /// data is never touched.
    pub fn select_expiry(&mut self, expiry: ExpiryDate) {
        if self.available_expiries.contains(&expiry) {
            self.selected_expiry = Some(expiry);
        }
    }

    /// Clear all stored and derived state back to empty. Intentional
    /// teardown only — transient disconnects must not call this.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn available_expiries(&self) -> &[ExpiryDate] {
        &self.available_expiries
    }

    pub fn selected_expiry(&self) -> Option<&ExpiryDate> {
        self.selected_expiry.as_ref()
    }

    pub fn alerts(&self) -> &[AlertEntry] {
        &self.alerts
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.last_updated.as_deref()
    }

    pub fn options_for(&self, expiry: &ExpiryDate) -> Option<&[OptionQuote]> {
        self.expiries
            .iter()
            .find(|(candidate, _)| candidate == expiry)
            .map(|(_, options)| options.as_slice())
    }

    /// Options under the currently selected expiry, display order.
    pub fn selected_options(&self) -> &[OptionQuote] {
        self.selected_expiry
            .as_ref()
            .and_then(|expiry| self.options_for(expiry))
            .unwrap_or(&[])
    }

    /// Options under the selected expiry restricted to one risk band, or all
    /// of them when `band` is `None`.
    pub fn filtered_options(&self, band: Option<RiskBand>) -> Vec<&OptionQuote> {
        self.selected_options()
            .iter()
            .filter(|option| band.map_or(true, |band| RiskBand::of(option.risk_score) == band))
            .collect()
    }

    /// Freshest live reading for a symbol, if any update arrived this session.
    pub fn latest_reading(&self, symbol: &Symbol) -> Option<&LiveUpdate> {
        self.latest_readings.get(symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }

    fn record_latest_reading(&mut self, update: &LiveUpdate) {
        let slot = self
            .latest_readings
            .entry(update.symbol.clone())
            .or_insert_with(|| LiveUpdate {
                symbol: update.symbol.clone(),
                ..LiveUpdate::default()
            });
        if update.expiry.is_some() {
            slot.expiry = update.expiry.clone();
        }
        if update.ltp.is_some() {
            slot.ltp = update.ltp;
        }
        if update.risk_score.is_some() {
            slot.risk_score = update.risk_score;
        }
        if update.delta.is_some() {
            slot.delta = update.delta;
        }
        if update.theta.is_some() {
            slot.theta = update.theta;
        }
        if update.iv.is_some() {
            slot.iv = update.iv;
        }
        if update.recommendation.is_some() {
            slot.recommendation = update.recommendation;
        }
    }

    fn find_quote_mut(&mut self, update: &LiveUpdate) -> Option<&mut OptionQuote> {
        let symbol = &update.symbol;

        let mut search_order: Vec<&ExpiryDate> = Vec::new();
        if let Some(selected) = self.selected_expiry.as_ref() {
            search_order.push(selected);
        }
        if let Some(explicit) = update.expiry.as_ref() {
            if !search_order.contains(&explicit) {
                search_order.push(explicit);
            }
        }

        let mut found: Option<usize> = None;
        for expiry in &search_order {
            if let Some(index) = self.expiry_index_with_symbol(expiry, symbol) {
                found = Some(index);
                break;
            }
        }
        if found.is_none() {
            found = self.expiries.iter().position(|(_, options)| {
                options.iter().any(|option| &option.symbol == symbol)
            });
        }

        let index = found?;
        self.expiries[index]
            .1
            .iter_mut()
            .find(|option| &option.symbol == symbol)
    }

    fn expiry_index_with_symbol(&self, expiry: &ExpiryDate, symbol: &Symbol) -> Option<usize> {
        self.expiries.iter().position(|(candidate, options)| {
            candidate == expiry && options.iter().any(|option| &option.symbol == symbol)
        })
    }

    fn recompute_alerts(&mut self) {
        self.alerts = self
            .expiries
            .iter()
            .flat_map(|(expiry, options)| {
                options
                    .iter()
                    .filter(|option| option.risk_score > ALERT_THRESHOLD)
                    .map(|option| AlertEntry {
                        expiry: expiry.clone(),
                        option: option.clone(),
                    })
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{OptionType, Recommendation};

    fn quote(symbol: &str, risk_score: f64) -> OptionQuote {
        OptionQuote {
            symbol: Symbol::new(symbol),
            strike: 24500.0,
            option_type: OptionType::Call,
            ltp: 100.0,
            risk_score,
            delta: 0.5,
            theta: -0.1,
            iv: 18.0,
            recommendation: Recommendation::Hold,
        }
    }

    fn snapshot(expiries: Vec<(&str, Vec<OptionQuote>)>) -> Snapshot {
        Snapshot {
            timestamp: "2025-02-20T10:00:00Z".to_string(),
            expiries: expiries
                .into_iter()
                .map(|(expiry, options)| (ExpiryDate::new(expiry), options))
                .collect(),
        }
    }

    #[test]
    fn snapshot_sets_available_expiries_in_order() {
        let mut store = RiskStore::new();
        store.apply_snapshot(snapshot(vec![
            ("2025-03-06", vec![]),
            ("2025-02-27", vec![]),
        ]));
        let order: Vec<&str> = store
            .available_expiries()
            .iter()
            .map(ExpiryDate::as_str)
            .collect();
        assert_eq!(order, ["2025-03-06", "2025-02-27"]);
        assert_eq!(store.selected_expiry().unwrap().as_str(), "2025-03-06");
    }

    #[test]
    fn second_snapshot_fully_replaces_first() {
        let mut store = RiskStore::new();
        store.apply_snapshot(snapshot(vec![
            ("2025-02-27", vec![quote("A", 80.0)]),
            ("2025-03-06", vec![quote("B", 10.0)]),
        ]));
        store.apply_snapshot(snapshot(vec![("2025-03-06", vec![quote("B", 10.0)])]));

        assert_eq!(store.available_expiries().len(), 1);
        assert!(store.options_for(&ExpiryDate::new("2025-02-27")).is_none());
        // Alerts from the dropped expiry are gone too.
        assert!(store.alerts().is_empty());
        // The vanished selection falls back to the first available expiry.
        assert_eq!(store.selected_expiry().unwrap().as_str(), "2025-03-06");
    }

    #[test]
    fn snapshot_application_is_idempotent() {
        let mut store = RiskStore::new();
        let snap = snapshot(vec![("2025-02-27", vec![quote("A", 80.0), quote("B", 20.0)])]);
        store.apply_snapshot(snap.clone());
        let alerts = store.alerts().to_vec();
        let expiries = store.available_expiries().to_vec();
        store.apply_snapshot(snap);
        assert_eq!(store.alerts(), alerts.as_slice());
        assert_eq!(store.available_expiries(), expiries.as_slice());
    }

    #[test]
    fn alert_threshold_is_exclusive() {
        let mut store = RiskStore::new();
        store.apply_snapshot(snapshot(vec![(
            "2025-02-27",
            vec![
                quote("A", 10.0),
                quote("B", 76.0),
                quote("C", 75.0),
                quote("D", 100.0),
            ],
        )]));
        let alerting: Vec<&str> = store
            .alerts()
            .iter()
            .map(|entry| entry.option.symbol.as_str())
            .collect();
        assert_eq!(alerting, ["B", "D"]);
    }

    #[test]
    fn live_update_merges_present_fields_only() {
        let mut store = RiskStore::new();
        store.apply_snapshot(snapshot(vec![("2025-02-27", vec![quote("A", 40.0)])]));
        store.apply_live_update(LiveUpdate {
            symbol: Symbol::new("A"),
            ltp: Some(123.0),
            risk_score: Some(90.0),
            ..LiveUpdate::default()
        });

        let option = &store.selected_options()[0];
        assert_eq!(option.ltp, 123.0);
        assert_eq!(option.risk_score, 90.0);
        // Fields absent from the update are untouched.
        assert_eq!(option.delta, 0.5);
        assert_eq!(option.iv, 18.0);
        // The update pushed the option over the threshold.
        assert_eq!(store.alerts().len(), 1);
    }

    #[test]
    fn unknown_symbol_update_never_creates_an_option() {
        let mut store = RiskStore::new();
        store.apply_snapshot(snapshot(vec![("2025-02-27", vec![quote("A", 40.0)])]));
        let before = store.selected_options().to_vec();

        store.apply_live_update(LiveUpdate {
            symbol: Symbol::new("GHOST"),
            ltp: Some(1.0),
            ..LiveUpdate::default()
        });

        assert_eq!(store.selected_options(), before.as_slice());
        assert_eq!(store.available_expiries().len(), 1);
        // The side table still records the reading.
        assert_eq!(
            store.latest_reading(&Symbol::new("GHOST")).unwrap().ltp,
            Some(1.0)
        );
    }

    #[test]
    fn update_with_explicit_expiry_finds_unselected_option() {
        let mut store = RiskStore::new();
        store.apply_snapshot(snapshot(vec![
            ("2025-02-27", vec![quote("A", 40.0)]),
            ("2025-03-06", vec![quote("B", 40.0)]),
        ]));
        // Selection is 2025-02-27; B lives under the other expiry.
        store.apply_live_update(LiveUpdate {
            symbol: Symbol::new("B"),
            expiry: Some(ExpiryDate::new("2025-03-06")),
            theta: Some(-0.9),
            ..LiveUpdate::default()
        });
        let options = store.options_for(&ExpiryDate::new("2025-03-06")).unwrap();
        assert_eq!(options[0].theta, -0.9);
    }

    #[test]
    fn latest_reading_accumulates_and_survives_snapshots() {
        let mut store = RiskStore::new();
        store.apply_snapshot(snapshot(vec![("2025-02-27", vec![quote("A", 40.0)])]));
        store.apply_live_update(LiveUpdate {
            symbol: Symbol::new("A"),
            ltp: Some(110.0),
            ..LiveUpdate::default()
        });
        store.apply_live_update(LiveUpdate {
            symbol: Symbol::new("A"),
            delta: Some(0.7),
            ..LiveUpdate::default()
        });

        // A later snapshot replaces baseline quotes but not the live slot.
        store.apply_snapshot(snapshot(vec![("2025-02-27", vec![quote("A", 40.0)])]));

        let reading = store.latest_reading(&Symbol::new("A")).unwrap();
        assert_eq!(reading.ltp, Some(110.0));
        assert_eq!(reading.delta, Some(0.7));
    }

    #[test]
    fn select_expiry_ignores_unknown() {
        let mut store = RiskStore::new();
        store.apply_snapshot(snapshot(vec![("2025-02-27", vec![])]));
        store.select_expiry(ExpiryDate::new("1999-01-01"));
        assert_eq!(store.selected_expiry().unwrap().as_str(), "2025-02-27");
    }

    #[test]
    fn selection_survives_snapshot_that_keeps_it() {
        let mut store = RiskStore::new();
        store.apply_snapshot(snapshot(vec![
            ("2025-02-27", vec![]),
            ("2025-03-06", vec![]),
        ]));
        store.select_expiry(ExpiryDate::new("2025-03-06"));
        store.apply_snapshot(snapshot(vec![
            ("2025-02-27", vec![]),
            ("2025-03-06", vec![]),
        ]));
        assert_eq!(store.selected_expiry().unwrap().as_str(), "2025-03-06");
    }

    #[test]
    fn reset_clears_everything() {
        let mut store = RiskStore::new();
        store.apply_snapshot(snapshot(vec![("2025-02-27", vec![quote("A", 90.0)])]));
        store.apply_live_update(LiveUpdate {
            symbol: Symbol::new("A"),
            ltp: Some(1.0),
            ..LiveUpdate::default()
        });
        store.reset();

        assert!(store.is_empty());
        assert!(store.available_expiries().is_empty());
        assert!(store.alerts().is_empty());
        assert!(store.selected_expiry().is_none());
        assert!(store.last_updated().is_none());
        assert!(store.latest_reading(&Symbol::new("A")).is_none());
    }

    #[test]
    fn risk_bands_partition_scores() {
        assert_eq!(RiskBand::of(0.0), RiskBand::Safe);
        assert_eq!(RiskBand::of(50.0), RiskBand::Safe);
        assert_eq!(RiskBand::of(50.1), RiskBand::Watch);
        assert_eq!(RiskBand::of(75.0), RiskBand::Watch);
        assert_eq!(RiskBand::of(75.1), RiskBand::HighRisk);
    }

    #[test]
    fn filtered_options_respects_band() {
        let mut store = RiskStore::new();
        store.apply_snapshot(snapshot(vec![(
            "2025-02-27",
            vec![quote("A", 20.0), quote("B", 60.0), quote("C", 90.0)],
        )]));
        let high: Vec<&str> = store
            .filtered_options(Some(RiskBand::HighRisk))
            .iter()
            .map(|option| option.symbol.as_str())
            .collect();
        assert_eq!(high, ["C"]);
        assert_eq!(store.filtered_options(None).len(), 3);
    }
}
