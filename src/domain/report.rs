// Report domain model - the unified view state of one dashboard session
use serde::Serialize;

pub const DEFAULT_DISCOUNT_PERCENTAGE: f64 = 16.67;
pub const DEFAULT_DRIVER_EXPENSE_PERCENTAGE: f64 = 50.0;
pub const DEFAULT_COMPANY_PROFIT_PERCENTAGE: f64 = 33.33;

/// The three independently fetched parts of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DataKind {
    Summary,
    EarningsSeries,
    DriverTable,
}

impl DataKind {
    pub const ALL: [DataKind; 3] = [
        DataKind::Summary,
        DataKind::EarningsSeries,
        DataKind::DriverTable,
    ];

    /// Event name used to ask for this kind over either channel
    pub fn request_event(self) -> &'static str {
        match self {
            DataKind::Summary => "requestReportsSummary",
            DataKind::EarningsSeries => "requestEarningsReport",
            DataKind::DriverTable => "requestDriverPerformance",
        }
    }

    /// Event name the push channel answers with
    pub fn response_event(self) -> &'static str {
        match self {
            DataKind::Summary => "reportsSummary",
            DataKind::EarningsSeries => "earningsReport",
            DataKind::DriverTable => "driverPerformance",
        }
    }

    pub fn from_response_event(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.response_event() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTotals {
    pub total_earnings: f64,
    pub earnings_change: f64,
    pub total_rides: f64,
    pub rides_change: f64,
    pub avg_per_ride: f64,
    pub avg_per_ride_change: f64,
    pub cancellation_rate: f64,
    pub cancellation_rate_change: f64,
    pub discount_percentage: f64,
    pub driver_expense_percentage: f64,
    pub company_profit_percentage: f64,
    pub discount_change: f64,
    pub driver_expense_change: f64,
    pub company_profit_change: f64,
}

impl Default for SummaryTotals {
    fn default() -> Self {
        Self {
            total_earnings: 0.0,
            earnings_change: 0.0,
            total_rides: 0.0,
            rides_change: 0.0,
            avg_per_ride: 0.0,
            avg_per_ride_change: 0.0,
            cancellation_rate: 0.0,
            cancellation_rate_change: 0.0,
            discount_percentage: DEFAULT_DISCOUNT_PERCENTAGE,
            driver_expense_percentage: DEFAULT_DRIVER_EXPENSE_PERCENTAGE,
            company_profit_percentage: DEFAULT_COMPANY_PROFIT_PERCENTAGE,
            discount_change: 0.0,
            driver_expense_change: 0.0,
            company_profit_change: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub label: String,
    pub earnings: f64,
    pub ride_count: f64,
    pub cancellation_count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverAggregate {
    pub id: String,
    pub name: String,
    pub ride_count: f64,
    pub earnings: f64,
}

/// Display-ready report state. Only the reconciler writes to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub summary: SummaryTotals,
    pub series: Vec<SeriesPoint>,
    pub drivers: Vec<DriverAggregate>,
}
