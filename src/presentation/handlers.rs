// HTTP request handlers
use crate::application::data_source::SourceStopped;
use crate::domain::query::{ActiveView, DriverFilter, QueryParams, TimeRange};
use crate::presentation::app_state::AppState;
use crate::presentation::projection::{ReportView, project};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;

/// Partial update of the query params; omitted fields keep their current value
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamsUpdate {
    pub time_range: Option<TimeRange>,
    pub driver_filter: Option<DriverFilter>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub active_view: Option<ActiveView>,
}

impl ParamsUpdate {
    /// Changing the range without explicit dates re-anchors the window at `now`
    fn apply(self, current: &QueryParams, now: DateTime<Utc>) -> QueryParams {
        let mut params = match self.time_range {
            Some(range) if range != current.time_range => {
                let mut params = QueryParams::for_range(range, now);
                params.driver_filter = current.driver_filter.clone();
                params.active_view = current.active_view;
                params
            }
            _ => current.clone(),
        };
        if let Some(filter) = self.driver_filter {
            params.driver_filter = filter;
        }
        if let Some(start) = self.start_date {
            params.start_date = start;
        }
        if let Some(end) = self.end_date {
            params.end_date = end;
        }
        if let Some(view) = self.active_view {
            params.active_view = view;
        }
        params
    }
}

fn unavailable(_: SourceStopped) -> (StatusCode, String) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "report source is not running".to_string(),
    )
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Current report view
pub async fn get_report(State(state): State<Arc<AppState>>) -> Json<ReportView> {
    Json(project(&state.source.snapshot()))
}

/// Server-sent events carrying every new report view, starting with the current one
pub async fn stream_report(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let updates = WatchStream::new(state.source.subscribe())
        .map(|snapshot| Event::default().event("report").json_data(project(&snapshot)));
    Sse::new(updates).keep_alive(KeepAlive::default())
}

pub async fn refresh_report(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.source.refresh().await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn update_params(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ParamsUpdate>,
) -> Result<Json<QueryParams>, (StatusCode, String)> {
    let current = state.source.snapshot().params;
    let params = update.apply(&current, Utc::now());
    if params.start_date > params.end_date {
        return Err((
            StatusCode::BAD_REQUEST,
            "startDate must not be after endDate".to_string(),
        ));
    }

    state
        .source
        .set_params(params.clone())
        .await
        .map_err(unavailable)?;
    Ok(Json(params))
}
