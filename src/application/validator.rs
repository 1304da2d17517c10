// Payload validation - decides whether a raw payload may reach the view state
use crate::domain::payload::{
    DriverRecord, DriverTableWire, EarningsRecord, EarningsWire, ReportPayload, SummaryWire,
};
use crate::domain::report::DataKind;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

const PLACEHOLDER_MARKER: &str = "isSampleData";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("payload is absent")]
    Missing,
    #[error("payload is not a record")]
    NotARecord,
    #[error("payload is placeholder sample data")]
    Placeholder,
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),
    #[error("field `{field}` is not {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Accept/reject decision for a payload of the given kind
pub fn validate(payload: Option<&Value>, kind: DataKind) -> bool {
    accept(payload, kind).is_ok()
}

/// Validate a raw payload and turn it into its typed form
pub fn accept(payload: Option<&Value>, kind: DataKind) -> Result<ReportPayload, Rejection> {
    let value = match payload {
        None | Some(Value::Null) => return Err(Rejection::Missing),
        Some(value) => value,
    };
    let record = value.as_object().ok_or(Rejection::NotARecord)?;

    if record.get(PLACEHOLDER_MARKER).is_some_and(is_truthy) {
        return Err(Rejection::Placeholder);
    }

    match kind {
        DataKind::Summary => {
            require_present(record, "totalEarnings")?;
            require_present(record, "totalRides")?;
            let wire: SummaryWire = decode(value)?;
            Ok(ReportPayload::Summary(wire.into_record()))
        }
        DataKind::EarningsSeries => {
            require_array(record, "chartData")?;
            require_object(record, "summary")?;
            let wire: EarningsWire = decode(value)?;
            Ok(ReportPayload::EarningsSeries(EarningsRecord {
                points: wire.chart_data.into_iter().map(Into::into).collect(),
                summary: wire.summary.into_patch(),
            }))
        }
        DataKind::DriverTable => {
            require_array(record, "tableData")?;
            let wire: DriverTableWire = decode(value)?;
            Ok(ReportPayload::DriverTable(DriverRecord {
                drivers: wire.table_data.into_iter().map(Into::into).collect(),
            }))
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn require_present(record: &Map<String, Value>, field: &'static str) -> Result<(), Rejection> {
    match record.get(field) {
        None | Some(Value::Null) => Err(Rejection::MissingField(field)),
        Some(_) => Ok(()),
    }
}

fn require_array(record: &Map<String, Value>, field: &'static str) -> Result<(), Rejection> {
    require_present(record, field)?;
    if record[field].is_array() {
        Ok(())
    } else {
        Err(Rejection::WrongType {
            field,
            expected: "an array",
        })
    }
}

fn require_object(record: &Map<String, Value>, field: &'static str) -> Result<(), Rejection> {
    require_present(record, field)?;
    if record[field].is_object() {
        Ok(())
    } else {
        Err(Rejection::WrongType {
            field,
            expected: "a record",
        })
    }
}

fn decode<'a, T: Deserialize<'a>>(value: &'a Value) -> Result<T, Rejection> {
    T::deserialize(value).map_err(|e| Rejection::Malformed(e.to_string()))
}
