// src/ingest/providers/http.rs
use futures::future::ready;
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use std::collections::BTreeMap;
use tracing::Span;

use crate::config::ConfigLookup;
use crate::error::IngestionError;
use crate::ingest::{counted, Pull, RecordSource, RecordStream, RetryPolicy, SourceKind, SourceStats};
use crate::record::{self, Record};

/// JSON API fetched with one GET per ingest call.
pub struct HttpSource {
    request: ApiRequest,
    retry: RetryPolicy,
    stats: SourceStats,
    span: Span,
}

struct ApiRequest {
    client: reqwest::Client,
    endpoint: String,
    params: BTreeMap<String, String>,
    headers: HeaderMap,
}

impl HttpSource {
    pub fn new(
        endpoint: &str,
        params: BTreeMap<String, String>,
        config: &dyn ConfigLookup,
    ) -> Result<Self, IngestionError> {
        reqwest::Url::parse(endpoint).map_err(|e| {
            IngestionError::InvalidConfig(format!("invalid API endpoint '{endpoint}': {e}"))
        })?;

        const TIMEOUT: &str = "ingestion.sources.api.timeout_seconds";
        let timeout = config
            .get_seconds(TIMEOUT, 30.0)
            .ok_or_else(|| IngestionError::InvalidConfig(format!("{TIMEOUT} is out of range")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("quality-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestionError::InvalidConfig(format!("http client: {e}")))?;

        let api_key = config.get_opt_str("api.api_key").filter(|k| !k.is_empty());
        let headers = request_headers(api_key.as_deref())?;

        let span = tracing::info_span!("source", kind = "api", origin = %endpoint);
        Ok(Self {
            request: ApiRequest {
                client,
                endpoint: endpoint.to_string(),
                params,
                headers,
            },
            retry: RetryPolicy::from_config(config)?,
            stats: SourceStats::default(),
            span,
        })
    }
}

fn request_headers(api_key: Option<&str>) -> Result<HeaderMap, IngestionError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key {
        let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|_| IngestionError::InvalidConfig("API key is not a valid header value".into()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

impl ApiRequest {
    async fn fetch(&self, retry: &RetryPolicy) -> Result<serde_json::Value, IngestionError> {
        let response = retry
            .run(&self.endpoint, |_| {
                let pending = self
                    .client
                    .get(&self.endpoint)
                    .query(&self.params)
                    .headers(self.headers.clone())
                    .send();
                async move { pending.await.and_then(|r| r.error_for_status()) }
            })
            .await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| IngestionError::MalformedResponse {
                endpoint: self.endpoint.clone(),
                message: e.to_string(),
            })
    }
}

/// Bare list, `{"data": ...}`, `{"results": ...}` or one bare object.
pub(crate) fn normalize_payload(payload: serde_json::Value) -> Vec<serde_json::Value> {
    use serde_json::Value as J;
    match payload {
        J::Array(items) => items,
        J::Object(mut obj) => {
            let inner = obj.remove("data").or_else(|| obj.remove("results"));
            match inner {
                Some(J::Array(items)) => items,
                Some(other) => vec![other],
                None => vec![J::Object(obj)],
            }
        }
        other => vec![other],
    }
}

fn item_to_pull(item: serde_json::Value, number: u64, endpoint: &str) -> Pull {
    let serde_json::Value::Object(obj) = item else {
        return Pull::Skip {
            position: number,
            reason: format!("API record {number} is not a JSON object"),
        };
    };
    match Record::from_json_object(obj) {
        Ok(mut rec) => {
            rec.insert(record::SOURCE, "api");
            rec.insert(record::SOURCE_ENDPOINT, endpoint);
            rec.insert(record::INGESTION_TIMESTAMP, record::now_timestamp());
            rec.insert(record::RECORD_NUMBER, number as i64);
            Pull::Record(rec)
        }
        Err(reason) => Pull::Skip {
            position: number,
            reason,
        },
    }
}

impl RecordSource for HttpSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    fn origin(&self) -> &str {
        &self.request.endpoint
    }

    fn ingest(&mut self) -> RecordStream<'_> {
        tracing::info!(parent: &self.span, "starting API ingestion");
        let request = &self.request;
        let retry = &self.retry;
        let raw = stream::once(async move { request.fetch(retry).await })
            .flat_map(move |outcome| match outcome {
                Ok(payload) => {
                    let endpoint = request.endpoint.clone();
                    let items = normalize_payload(payload)
                        .into_iter()
                        .enumerate()
                        .map(move |(i, item)| item_to_pull(item, i as u64 + 1, &endpoint));
                    stream::iter(items).left_stream()
                }
                Err(e) => stream::once(ready(Pull::Fatal(e))).right_stream(),
            })
            .boxed();
        counted(raw, &mut self.stats, self.span.clone())
    }

    fn stats(&self) -> SourceStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_shapes_normalize_to_items() {
        assert_eq!(normalize_payload(json!([{"a": 1}, {"a": 2}])).len(), 2);
        assert_eq!(
            normalize_payload(json!({"data": [{"a": 1}], "results": [{"b": 1}, {"b": 2}]})),
            vec![json!({"a": 1})]
        );
        assert_eq!(normalize_payload(json!({"results": [{"b": 1}, {"b": 2}]})).len(), 2);
        assert_eq!(
            normalize_payload(json!({"id": 7, "name": "solo"})),
            vec![json!({"id": 7, "name": "solo"})]
        );
    }

    #[test]
    fn non_object_item_is_skipped() {
        match item_to_pull(json!("oops"), 4, "https://example.test") {
            Pull::Skip { position, reason } => {
                assert_eq!(position, 4);
                assert!(reason.contains("not a JSON object"));
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn bearer_header_only_with_key() {
        let h = request_headers(None).unwrap();
        assert!(h.get(AUTHORIZATION).is_none());
        assert_eq!(h.get(ACCEPT).unwrap(), "application/json");
        let h = request_headers(Some("s3cret")).unwrap();
        assert_eq!(h.get(AUTHORIZATION).unwrap(), "Bearer s3cret");
    }

    #[test]
    fn relative_endpoint_is_rejected() {
        let err = HttpSource::new("/v1/items", BTreeMap::new(), &json!({}))
            .err()
            .unwrap();
        assert!(matches!(err, IngestionError::InvalidConfig(_)));
    }

    #[test]
    fn unrepresentable_timeouts_are_rejected() {
        let huge = json!({"ingestion": {"sources": {"api": {"timeout_seconds": 1e300}}}});
        let err = HttpSource::new("https://example.test", BTreeMap::new(), &huge)
            .err()
            .unwrap();
        assert!(matches!(err, IngestionError::InvalidConfig(ref m) if m.contains("timeout_seconds")));

        let huge = json!({"ingestion": {"sources": {"api": {"retry_delay_seconds": "1e300"}}}});
        assert!(HttpSource::new("https://example.test", BTreeMap::new(), &huge).is_err());
    }
}
