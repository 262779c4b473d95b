//! Generic JSON-over-HTTP provider adapter
//!
//! Each configured provider exposes one endpoint per (ticker, facet), given by
//! a URL template, answering with
//!
//! ```json
//! {"records": [{"year": 2023, "fields": {"revenue": 1.0e9, "eps": 2.1}}]}
//! ```
//!
//! Field keys use the consolidated field names; anything else is ignored.

use super::types::{Facet, PartialRecord, ProviderId};
use super::DataProvider;
use crate::config::ProviderConfig;
use crate::error::{AppError, ProviderError, Result};
use crate::reconcile::fields::FinancialFields;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Provider backed by a JSON HTTP API
pub struct HttpJsonProvider {
    id: ProviderId,
    client: Client,
    url_template: String,
    tickers_url: Option<String>,
    api_key: Option<String>,
    facets: Vec<Facet>,
}

impl HttpJsonProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty());

        Ok(Self {
            id: config.id,
            client,
            url_template: config.url_template.clone(),
            tickers_url: config.tickers_url.clone(),
            api_key,
            facets: config.facets.clone(),
        })
    }

    fn url_for(&self, entity_id: &str, facet: Facet) -> String {
        expand_template(&self.url_template, entity_id, facet)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            if let Ok(value) = format!("Bearer {}", key).parse() {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    async fn get_json(&self, url: &str, entity_id: &str, cancel: &CancellationToken) -> Result<Value> {
        let request = self.client.get(url).headers(self.headers()).send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            response = request => response?,
        };

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        if let Some(error) = classify_status(self.id, entity_id, status, retry_after) {
            return Err(error.into());
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::Malformed {
                provider: self.id.to_string(),
                message: format!("invalid JSON: {}", e),
            }
            .into()
        })
    }
}

#[async_trait]
impl DataProvider for HttpJsonProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn facets(&self) -> &[Facet] {
        &self.facets
    }

    async fn fetch(
        &self,
        entity_id: &str,
        facet: Facet,
        cancel: &CancellationToken,
    ) -> Result<Vec<PartialRecord>> {
        let url = self.url_for(entity_id, facet);
        debug!("{} fetching {} for {}", self.id, facet, entity_id);

        let body = self.get_json(&url, entity_id, cancel).await?;
        Ok(parse_records(self.id, facet, &body)?)
    }

    async fn list_tickers(&self) -> Result<Vec<String>> {
        let Some(url) = &self.tickers_url else {
            return Ok(Vec::new());
        };
        let body = self.get_json(url, "*", &CancellationToken::new()).await?;
        Ok(parse_tickers(self.id, &body)?)
    }
}

/// Substitute `{ticker}` (URL-encoded) and `{facet}`
pub fn expand_template(template: &str, entity_id: &str, facet: Facet) -> String {
    template
        .replace("{ticker}", &urlencoding::encode(entity_id))
        .replace("{facet}", facet.as_str())
}

/// Map a non-success HTTP status to a provider error
pub fn classify_status(
    provider: ProviderId,
    entity_id: &str,
    status: StatusCode,
    retry_after: Option<Duration>,
) -> Option<ProviderError> {
    let provider = provider.to_string();
    match status {
        s if s.is_success() => None,
        StatusCode::NOT_FOUND => Some(ProviderError::NotFound {
            provider,
            entity: entity_id.to_string(),
        }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(ProviderError::Auth {
            provider,
            message: status.to_string(),
        }),
        StatusCode::TOO_MANY_REQUESTS => Some(ProviderError::RateLimited {
            provider,
            retry_after,
        }),
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            Some(ProviderError::Transient {
                provider,
                message: status.to_string(),
            })
        }
        _ => Some(ProviderError::Malformed {
            provider,
            message: format!("unexpected status {}", status),
        }),
    }
}

/// `Retry-After` in delta-seconds form
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Parse the `records` envelope
pub fn parse_records(
    provider: ProviderId,
    facet: Facet,
    body: &Value,
) -> std::result::Result<Vec<PartialRecord>, ProviderError> {
    let malformed = |message: &str| ProviderError::Malformed {
        provider: provider.to_string(),
        message: message.to_string(),
    };

    let rows = body
        .get("records")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("missing `records` array"))?;

    rows.iter()
        .map(|row| {
            let year = row
                .get("year")
                .and_then(Value::as_i64)
                .ok_or_else(|| malformed("record without numeric `year`"))?;
            let fields = row
                .get("fields")
                .and_then(Value::as_object)
                .map(FinancialFields::from_json_map)
                .ok_or_else(|| malformed("record without `fields` object"))?;
            Ok::<_, ProviderError>(PartialRecord::new(provider, facet, year as i32, fields))
        })
        .collect()
}

/// Accepts a bare array of tickers or `{"tickers": [...]}`
pub fn parse_tickers(
    provider: ProviderId,
    body: &Value,
) -> std::result::Result<Vec<String>, ProviderError> {
    let list = body
        .as_array()
        .or_else(|| body.get("tickers").and_then(Value::as_array))
        .ok_or_else(|| ProviderError::Malformed {
            provider: provider.to_string(),
            message: "expected a ticker list".to_string(),
        })?;

    Ok(list
        .iter()
        .filter_map(Value::as_str)
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect())
}
