// Typed report payloads - what a raw channel payload becomes once validated
use super::report::{DataKind, DriverAggregate, SeriesPoint, SummaryTotals};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A payload that passed validation for its kind.
///
/// Values of this type are only produced by the validator, so anything holding
/// one (the last-known-good cache in particular) never sees placeholder data.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportPayload {
    Summary(SummaryRecord),
    EarningsSeries(EarningsRecord),
    DriverTable(DriverRecord),
}

impl ReportPayload {
    pub fn kind(&self) -> DataKind {
        match self {
            ReportPayload::Summary(_) => DataKind::Summary,
            ReportPayload::EarningsSeries(_) => DataKind::EarningsSeries,
            ReportPayload::DriverTable(_) => DataKind::DriverTable,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub totals: SummaryTotals,
}

/// Summary fields embedded in an earnings report. Absent fields leave the
/// current view state untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryPatch {
    pub total_earnings: Option<f64>,
    pub earnings_change: Option<f64>,
    pub total_rides: Option<f64>,
    pub rides_change: Option<f64>,
    pub avg_per_ride: Option<f64>,
    pub avg_per_ride_change: Option<f64>,
    pub cancellation_rate: Option<f64>,
    pub cancellation_rate_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EarningsRecord {
    pub points: Vec<SeriesPoint>,
    pub summary: SummaryPatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverRecord {
    pub drivers: Vec<DriverAggregate>,
}

// Wire shapes as sent by the reports API and the realtime channel.
//
// Only the payload structure is validated. Field values are read leniently:
// numbers may arrive as numeric strings, and nulls or unreadable values fall
// back to their defaults instead of failing the whole payload.

fn number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(number(&Value::deserialize(deserializer)?).unwrap_or(0.0))
}

fn lenient_optional_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    Ok(number(&Value::deserialize(deserializer)?))
}

/// Driver ids arrive as strings from some backends and as numbers from others
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Entries of a row array that are not records carry nothing to show and are skipped
fn record_rows<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let rows = Vec::<Value>::deserialize(deserializer)?;
    Ok(rows
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|row| serde_json::from_value(row).ok())
        .collect())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SummaryWire {
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub total_earnings: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub earnings_change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub total_rides: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub rides_change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub average_earning_per_ride: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub avg_per_ride: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub avg_per_ride_change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub cancellation_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub cancellation_rate_change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub discount_percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub driver_expense_percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub company_profit_percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub discount_change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub driver_expense_change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub company_profit_change: Option<f64>,
}

impl SummaryWire {
    fn average(&self) -> Option<f64> {
        self.average_earning_per_ride.or(self.avg_per_ride)
    }

    /// Resolve a full summary. Callers check the required totals first.
    pub fn into_record(self) -> SummaryRecord {
        let defaults = SummaryTotals::default();
        let total_earnings = self.total_earnings.unwrap_or(0.0);
        let total_rides = self.total_rides.unwrap_or(0.0);
        let avg_per_ride = self.average().unwrap_or_else(|| {
            if total_rides > 0.0 {
                total_earnings / total_rides
            } else {
                0.0
            }
        });

        SummaryRecord {
            totals: SummaryTotals {
                total_earnings,
                earnings_change: self.earnings_change.unwrap_or(0.0),
                total_rides,
                rides_change: self.rides_change.unwrap_or(0.0),
                avg_per_ride,
                avg_per_ride_change: self.avg_per_ride_change.unwrap_or(0.0),
                cancellation_rate: self.cancellation_rate.unwrap_or(0.0),
                cancellation_rate_change: self.cancellation_rate_change.unwrap_or(0.0),
                discount_percentage: self
                    .discount_percentage
                    .unwrap_or(defaults.discount_percentage),
                driver_expense_percentage: self
                    .driver_expense_percentage
                    .unwrap_or(defaults.driver_expense_percentage),
                company_profit_percentage: self
                    .company_profit_percentage
                    .unwrap_or(defaults.company_profit_percentage),
                discount_change: self.discount_change.unwrap_or(0.0),
                driver_expense_change: self.driver_expense_change.unwrap_or(0.0),
                company_profit_change: self.company_profit_change.unwrap_or(0.0),
            },
        }
    }

    pub fn into_patch(self) -> SummaryPatch {
        SummaryPatch {
            total_earnings: self.total_earnings,
            earnings_change: self.earnings_change,
            total_rides: self.total_rides,
            rides_change: self.rides_change,
            avg_per_ride: self.average(),
            avg_per_ride_change: self.avg_per_ride_change,
            cancellation_rate: self.cancellation_rate,
            cancellation_rate_change: self.cancellation_rate_change,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SeriesPointWire {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub earnings: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub rides: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub cancellations: f64,
}

impl From<SeriesPointWire> for SeriesPoint {
    fn from(point: SeriesPointWire) -> Self {
        SeriesPoint {
            label: point.name,
            earnings: point.earnings,
            ride_count: point.rides,
            cancellation_count: point.cancellations,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct EarningsWire {
    #[serde(rename = "chartData", deserialize_with = "record_rows")]
    pub chart_data: Vec<SeriesPointWire>,
    pub summary: SummaryWire,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DriverRowWire {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub rides: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub earnings: f64,
}

impl From<DriverRowWire> for DriverAggregate {
    fn from(row: DriverRowWire) -> Self {
        DriverAggregate {
            id: row.id,
            name: row.name,
            ride_count: row.rides,
            earnings: row.earnings,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DriverTableWire {
    #[serde(rename = "tableData", deserialize_with = "record_rows")]
    pub table_data: Vec<DriverRowWire>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_falls_back_to_derived_value() {
        let wire = SummaryWire {
            total_earnings: Some(900.0),
            total_rides: Some(30.0),
            ..Default::default()
        };
        assert_eq!(wire.into_record().totals.avg_per_ride, 30.0);

        let wire = SummaryWire {
            total_earnings: Some(900.0),
            total_rides: Some(0.0),
            ..Default::default()
        };
        assert_eq!(wire.into_record().totals.avg_per_ride, 0.0);
    }

    #[test]
    fn test_average_alias_prefers_long_name() {
        let wire = SummaryWire {
            total_earnings: Some(100.0),
            total_rides: Some(4.0),
            average_earning_per_ride: Some(24.0),
            avg_per_ride: Some(22.0),
            ..Default::default()
        };
        assert_eq!(wire.into_record().totals.avg_per_ride, 24.0);
    }

    #[test]
    fn test_numeric_driver_id() {
        let row: DriverRowWire =
            serde_json::from_value(serde_json::json!({"id": 42, "name": "Ana", "rides": 3}))
                .unwrap();
        let driver = DriverAggregate::from(row);
        assert_eq!(driver.id, "42");
        assert_eq!(driver.ride_count, 3.0);
        assert_eq!(driver.earnings, 0.0);
    }

    #[test]
    fn test_row_fields_tolerate_null_and_numeric_strings() {
        let table: DriverTableWire = serde_json::from_value(serde_json::json!({
            "tableData": [
                {"id": "d1", "name": "Ana", "rides": 8, "earnings": null},
                {"id": "d2", "name": null, "rides": "5", "earnings": "72.5"},
                {"id": null, "rides": "n/a", "earnings": {"amount": 3}}
            ]
        }))
        .unwrap();
        let drivers: Vec<DriverAggregate> = table.table_data.into_iter().map(Into::into).collect();

        assert_eq!(drivers.len(), 3);
        assert_eq!(drivers[0].earnings, 0.0);
        assert_eq!(drivers[1].name, "");
        assert_eq!(drivers[1].ride_count, 5.0);
        assert_eq!(drivers[1].earnings, 72.5);
        assert_eq!(drivers[2].id, "");
        assert_eq!(drivers[2].ride_count, 0.0);
        assert_eq!(drivers[2].earnings, 0.0);
    }

    #[test]
    fn test_non_record_rows_are_skipped() {
        let earnings: EarningsWire = serde_json::from_value(serde_json::json!({
            "chartData": [3, null, {"name": "Tue", "earnings": "40", "rides": 2}],
            "summary": {}
        }))
        .unwrap();
        assert_eq!(earnings.chart_data.len(), 1);
        assert_eq!(earnings.chart_data[0].name, "Tue");
        assert_eq!(earnings.chart_data[0].earnings, 40.0);
    }

    #[test]
    fn test_summary_reads_numeric_strings() {
        let wire: SummaryWire = serde_json::from_value(serde_json::json!({
            "totalEarnings": "1000",
            "totalRides": 50,
            "earningsChange": null,
            "discountPercentage": "abc"
        }))
        .unwrap();
        let totals = wire.into_record().totals;
        assert_eq!(totals.total_earnings, 1000.0);
        assert_eq!(totals.avg_per_ride, 20.0);
        assert_eq!(totals.earnings_change, 0.0);
        assert_eq!(totals.discount_percentage, SummaryTotals::default().discount_percentage);
    }
}
