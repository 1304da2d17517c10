// Query parameters of a report view and the requests derived from them
use super::report::DataKind;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Day,
    Week,
    Month,
}

impl TimeRange {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Day => "day",
            TimeRange::Week => "week",
            TimeRange::Month => "month",
        }
    }

    pub fn lookback(self) -> Duration {
        match self {
            TimeRange::Day => Duration::days(1),
            TimeRange::Week => Duration::days(7),
            TimeRange::Month => Duration::days(30),
        }
    }
}

/// Either every driver or a single driver id. Serialized as `"all"` or the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DriverFilter {
    All,
    Driver(String),
}

impl From<String> for DriverFilter {
    fn from(value: String) -> Self {
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            DriverFilter::All
        } else {
            DriverFilter::Driver(value)
        }
    }
}

impl From<DriverFilter> for String {
    fn from(filter: DriverFilter) -> Self {
        match filter {
            DriverFilter::All => "all".to_string(),
            DriverFilter::Driver(id) => id,
        }
    }
}

impl DriverFilter {
    pub fn as_str(&self) -> &str {
        match self {
            DriverFilter::All => "all",
            DriverFilter::Driver(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveView {
    #[default]
    Overview,
    Earnings,
    Drivers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub time_range: TimeRange,
    pub driver_filter: DriverFilter,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub active_view: ActiveView,
}

impl QueryParams {
    /// Params for a preset range ending at `now`
    pub fn for_range(time_range: TimeRange, now: DateTime<Utc>) -> Self {
        Self {
            time_range,
            driver_filter: DriverFilter::All,
            start_date: now - time_range.lookback(),
            end_date: now,
            active_view: ActiveView::default(),
        }
    }

    pub fn requests(&self) -> [ReportRequest; 3] {
        DataKind::ALL.map(|kind| ReportRequest::for_kind(kind, self))
    }
}

fn iso(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One logical request, identical over the push and the pull channel
#[derive(Debug, Clone, PartialEq)]
pub enum ReportRequest {
    Summary,
    Earnings {
        time_range: TimeRange,
        driver_filter: DriverFilter,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    },
    DriverPerformance {
        time_range: TimeRange,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    },
}

impl ReportRequest {
    pub fn for_kind(kind: DataKind, params: &QueryParams) -> Self {
        match kind {
            DataKind::Summary => ReportRequest::Summary,
            DataKind::EarningsSeries => ReportRequest::Earnings {
                time_range: params.time_range,
                driver_filter: params.driver_filter.clone(),
                start_date: params.start_date,
                end_date: params.end_date,
            },
            DataKind::DriverTable => ReportRequest::DriverPerformance {
                time_range: params.time_range,
                start_date: params.start_date,
                end_date: params.end_date,
            },
        }
    }

    pub fn kind(&self) -> DataKind {
        match self {
            ReportRequest::Summary => DataKind::Summary,
            ReportRequest::Earnings { .. } => DataKind::EarningsSeries,
            ReportRequest::DriverPerformance { .. } => DataKind::DriverTable,
        }
    }

    pub fn event_name(&self) -> &'static str {
        self.kind().request_event()
    }

    /// Query string pairs for the REST endpoint
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            ReportRequest::Summary => Vec::new(),
            ReportRequest::Earnings {
                time_range,
                driver_filter,
                start_date,
                end_date,
            } => vec![
                ("timeRange", time_range.as_str().to_string()),
                ("driverId", driver_filter.as_str().to_string()),
                ("startDate", iso(start_date)),
                ("endDate", iso(end_date)),
            ],
            ReportRequest::DriverPerformance {
                time_range,
                start_date,
                end_date,
            } => vec![
                ("timeRange", time_range.as_str().to_string()),
                ("startDate", iso(start_date)),
                ("endDate", iso(end_date)),
            ],
        }
    }

    /// Parameters object emitted alongside the request event
    pub fn emit_params(&self) -> serde_json::Value {
        match self {
            ReportRequest::Summary => serde_json::Value::Null,
            ReportRequest::Earnings {
                time_range,
                driver_filter,
                start_date,
                end_date,
            } => json!({
                "timeRange": time_range.as_str(),
                "driverId": driver_filter.as_str(),
                "startDate": iso(start_date),
                "endDate": iso(end_date),
            }),
            ReportRequest::DriverPerformance {
                time_range,
                start_date,
                end_date,
            } => json!({
                "timeRange": time_range.as_str(),
                "startDate": iso(start_date),
                "endDate": iso(end_date),
            }),
        }
    }
}
