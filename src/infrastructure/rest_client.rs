// Reports REST API client - the pull channel
use crate::application::channels::{ChannelError, PullClient};
use crate::domain::query::ReportRequest;
use crate::domain::report::DataKind;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct RestPullClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RestPullClient {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn endpoint(kind: DataKind) -> &'static str {
        match kind {
            DataKind::Summary => "/reports/summary",
            DataKind::EarningsSeries => "/reports/earnings",
            DataKind::DriverTable => "/reports/driver-performance",
        }
    }

    fn build_url(&self, request: &ReportRequest) -> String {
        let mut url = format!("{}{}", self.base_url, Self::endpoint(request.kind()));
        let query: Vec<String> = request
            .query_pairs()
            .into_iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(&value)))
            .collect();
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }
}

/// Some deployments wrap every body in `{"success": true, "data": {...}}`
fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map)
            if map.contains_key("data")
                && map
                    .keys()
                    .all(|k| matches!(k.as_str(), "data" | "success" | "message")) =>
        {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[async_trait]
impl PullClient for RestPullClient {
    async fn fetch(&self, request: &ReportRequest) -> Result<Value, ChannelError> {
        let url = self.build_url(request);
        tracing::debug!("Fetching {}", url);

        let mut builder = self.client.get(&url).header("Accept", "application/json");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)?;
        Ok(unwrap_envelope(body))
    }
}
