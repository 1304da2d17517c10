// Reconciler - merges validated payloads into the view state
use crate::application::last_known_good::LastKnownGood;
use crate::application::validator;
use crate::domain::payload::{EarningsRecord, ReportPayload};
use crate::domain::report::{DataKind, ViewState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Result of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    /// The incoming payload was valid and merged
    Fresh,
    /// The incoming payload was rejected and the cached payload was re-merged
    FromCache,
    /// Rejected with nothing cached; the view state is untouched
    Dropped,
}

impl Outcome {
    pub fn is_accepted(self) -> bool {
        !matches!(self, Outcome::Dropped)
    }

    pub fn is_fresh(self) -> bool {
        matches!(self, Outcome::Fresh)
    }
}

#[derive(Debug)]
pub struct Reconciler {
    view: ViewState,
    cache: LastKnownGood,
    last_updated: Option<DateTime<Utc>>,
    initial_load: bool,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            view: ViewState::default(),
            cache: LastKnownGood::new(),
            last_updated: None,
            initial_load: true,
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn is_initial_load(&self) -> bool {
        self.initial_load
    }

    pub fn reconcile(&mut self, payload: Option<&Value>, kind: DataKind) -> Outcome {
        let outcome = match validator::accept(payload, kind) {
            Ok(accepted) => {
                merge(&mut self.view, &accepted);
                self.cache.put(accepted);
                Outcome::Fresh
            }
            Err(rejection) => {
                tracing::debug!("Rejected {:?} payload: {}", kind, rejection);
                match self.cache.get(kind) {
                    Some(cached) => {
                        tracing::warn!("Falling back to last known good {:?} payload", kind);
                        merge(&mut self.view, cached);
                        Outcome::FromCache
                    }
                    None => return Outcome::Dropped,
                }
            }
        };

        self.last_updated = Some(Utc::now());
        self.initial_load = false;
        outcome
    }
}

fn merge(view: &mut ViewState, payload: &ReportPayload) {
    match payload {
        ReportPayload::Summary(record) => view.summary = record.totals.clone(),
        ReportPayload::EarningsSeries(record) => merge_earnings(view, record),
        ReportPayload::DriverTable(record) => view.drivers = record.drivers.clone(),
    }
}

fn merge_earnings(view: &mut ViewState, record: &EarningsRecord) {
    view.series = record.points.clone();

    let patch = &record.summary;
    let totals = &mut view.summary;
    let fields = [
        (patch.total_earnings, &mut totals.total_earnings),
        (patch.earnings_change, &mut totals.earnings_change),
        (patch.total_rides, &mut totals.total_rides),
        (patch.rides_change, &mut totals.rides_change),
        (patch.avg_per_ride, &mut totals.avg_per_ride),
        (patch.avg_per_ride_change, &mut totals.avg_per_ride_change),
        (patch.cancellation_rate, &mut totals.cancellation_rate),
        (
            patch.cancellation_rate_change,
            &mut totals.cancellation_rate_change,
        ),
    ];
    for (value, target) in fields {
        if let Some(value) = value {
            *target = value;
        }
    }
}
