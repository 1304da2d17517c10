// Last-known-good cache - most recently accepted payload per data kind
use crate::domain::payload::ReportPayload;
use crate::domain::report::DataKind;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct LastKnownGood {
    entries: HashMap<DataKind, ReportPayload>,
}

impl LastKnownGood {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: DataKind) -> Option<&ReportPayload> {
        self.entries.get(&kind)
    }

    pub fn put(&mut self, payload: ReportPayload) {
        self.entries.insert(payload.kind(), payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payload::{DriverRecord, SummaryRecord};
    use crate::domain::report::SummaryTotals;

    #[test]
    fn test_put_replaces_per_kind() {
        let mut cache = LastKnownGood::new();
        assert!(cache.get(DataKind::Summary).is_none());

        let first = ReportPayload::Summary(SummaryRecord {
            totals: SummaryTotals {
                total_earnings: 10.0,
                ..Default::default()
            },
        });
        let second = ReportPayload::Summary(SummaryRecord {
            totals: SummaryTotals {
                total_earnings: 20.0,
                ..Default::default()
            },
        });
        cache.put(first);
        cache.put(second.clone());
        cache.put(ReportPayload::DriverTable(DriverRecord { drivers: vec![] }));

        assert_eq!(cache.get(DataKind::Summary), Some(&second));
        assert!(cache.get(DataKind::DriverTable).is_some());
        assert!(cache.get(DataKind::EarningsSeries).is_none());
    }
}
