// View-state projection - display values derived from a dashboard snapshot
use crate::application::connection::ConnectionState;
use crate::application::data_source::{DashboardSnapshot, DataStatus};
use crate::domain::query::QueryParams;
use crate::domain::report::{DriverAggregate, SeriesPoint, SummaryTotals};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialBreakdown {
    pub discount: f64,
    pub driver_expense: f64,
    pub company_profit: f64,
}

/// Period-over-period changes, already formatted for display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedChanges {
    pub earnings: String,
    pub rides: String,
    pub avg_per_ride: String,
    pub cancellation_rate: String,
    pub discount: String,
    pub driver_expense: String,
    pub company_profit: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub status: &'static str,
    pub connection: ConnectionState,
    pub loading: bool,
    /// True until the first payload of any kind has been accepted
    pub initial_load: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub params: QueryParams,
    pub totals: SummaryTotals,
    pub changes: FormattedChanges,
    pub breakdown: FinancialBreakdown,
    pub series: Vec<SeriesPoint>,
    pub drivers: Vec<DriverAggregate>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn financial_breakdown(totals: &SummaryTotals) -> FinancialBreakdown {
    let share = |percentage: f64| round2(totals.total_earnings * percentage / 100.0);
    FinancialBreakdown {
        discount: share(totals.discount_percentage),
        driver_expense: share(totals.driver_expense_percentage),
        company_profit: share(totals.company_profit_percentage),
    }
}

/// `+X.X`, `-X.X`, or `0.0` when there is nothing meaningful to show
pub fn format_change(change: Option<f64>) -> String {
    let Some(change) = change.filter(|c| c.is_finite()) else {
        return "0.0".to_string();
    };
    let rounded = (change * 10.0).round() / 10.0;
    if rounded > 0.0 {
        format!("+{:.1}", rounded)
    } else if rounded < 0.0 {
        format!("{:.1}", rounded)
    } else {
        "0.0".to_string()
    }
}

/// Text of the connection/status indicator. Only live push data reads "Live".
pub fn status_label(snapshot: &DashboardSnapshot) -> &'static str {
    if snapshot.status == DataStatus::Cached {
        return "Cached";
    }
    match snapshot.connection {
        ConnectionState::Connected => match snapshot.status {
            DataStatus::Live => "Live",
            DataStatus::Remote => "Remote",
            DataStatus::Loading | DataStatus::Cached => "Loading",
        },
        ConnectionState::Connecting if snapshot.status == DataStatus::Remote => "Remote",
        ConnectionState::Connecting => "Connecting",
        ConnectionState::Disconnected => "Disconnected",
        ConnectionState::Error => "Error",
    }
}

pub fn project(snapshot: &DashboardSnapshot) -> ReportView {
    let totals = &snapshot.view.summary;
    ReportView {
        status: status_label(snapshot),
        connection: snapshot.connection,
        loading: snapshot.loading,
        initial_load: snapshot.initial_load,
        last_updated: snapshot.last_updated,
        params: snapshot.params.clone(),
        totals: totals.clone(),
        changes: FormattedChanges {
            earnings: format_change(Some(totals.earnings_change)),
            rides: format_change(Some(totals.rides_change)),
            avg_per_ride: format_change(Some(totals.avg_per_ride_change)),
            cancellation_rate: format_change(Some(totals.cancellation_rate_change)),
            discount: format_change(Some(totals.discount_change)),
            driver_expense: format_change(Some(totals.driver_expense_change)),
            company_profit: format_change(Some(totals.company_profit_change)),
        },
        breakdown: financial_breakdown(totals),
        series: snapshot.view.series.clone(),
        drivers: snapshot.view.drivers.clone(),
    }
}
