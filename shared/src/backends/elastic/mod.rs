//! Elasticsearch backend.
//!
//! Talks to the cluster's REST API with `reqwest`. Statements are translated
//! by [`translate`](translate::translate); this module only sends requests
//! and shapes the responses.

pub mod translate;

use super::{Backend, BackendError, Outcome, QueryOutput, Row};
use crate::config::Settings;
use crate::query::Statement;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use translate::SearchRequest;

/// Backend querying an Elasticsearch cluster.
#[derive(Debug, Clone)]
pub struct ElasticBackend {
    client: Client,
    base_url: String,
}

/// One entry of `GET /_cat/indices?format=json`.
#[derive(Debug, Deserialize)]
struct CatIndex {
    index: String,
}

impl ElasticBackend {
    /// Connects to the cluster at `url`.
    ///
    /// A URL without scheme gets `http://`. The cluster root is requested once
    /// so that an unreachable cluster is reported before the session starts.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Connection`] if the client cannot be built or
    /// the cluster does not answer successfully.
    pub async fn connect(url: &str, settings: &Settings) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| BackendError::Connection(format!("Failed to create HTTP client: {e}")))?;

        let backend = Self {
            client,
            base_url: normalize_url(url),
        };
        backend.ping().await?;
        Ok(backend)
    }

    /// Returns the cluster URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .map_err(|e| BackendError::Connection(format!("{}: {e}", self.base_url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Connection(format!(
                "{} answered with status {status}",
                self.base_url
            )));
        }

        debug!(url = %self.base_url, "Cluster reachable");
        Ok(())
    }

    /// Sends a translated request and returns status and parsed body.
    async fn send(
        &self,
        request: &SearchRequest,
    ) -> Result<(reqwest::StatusCode, serde_json::Value), BackendError> {
        let url = format!("{}{}", self.base_url, request.path());
        debug!(%url, body = %request.body(), "Sending request");

        let response = self.client.post(&url).json(request.body()).send().await?;
        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str(&text) {
            Ok(body) => Ok((status, body)),
            Err(_) => Err(BackendError::Request {
                status: status.as_u16(),
                body: text,
            }),
        }
    }
}

#[async_trait]
impl Backend for ElasticBackend {
    fn name(&self) -> String {
        "Elasticsearch".to_string()
    }

    async fn list_tables(&self) -> Result<Vec<String>, BackendError> {
        let response = self
            .client
            .get(format!("{}/_cat/indices", self.base_url))
            .query(&[("format", "json")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Request {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let indices: Vec<CatIndex> = response.json().await?;
        Ok(indices.into_iter().map(|i| i.index).collect())
    }

    async fn execute(&self, statement: &Statement) -> Result<Outcome, BackendError> {
        let request = translate::translate(statement)?;
        let (status, body) = self.send(&request).await?;

        if status.is_client_error() {
            if let Some(reason) = root_cause_reason(&body) {
                debug!(%status, %reason, "Request rejected by cluster");
                return Ok(Outcome::Rejected { reason });
            }
        }
        if !status.is_success() {
            return Err(BackendError::Request {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        let output = match request {
            SearchRequest::Count { .. } => {
                let count = body
                    .get("count")
                    .and_then(serde_json::Value::as_u64)
                    .ok_or_else(|| {
                        BackendError::UnexpectedResponse(
                            "count response without 'count'".to_string(),
                        )
                    })?;
                QueryOutput::Count(count)
            }
            SearchRequest::Search { .. } => search_output(body)?,
        };
        Ok(Outcome::Data(output))
    }
}

fn search_output(mut body: serde_json::Value) -> Result<QueryOutput, BackendError> {
    let aggregations = body.get_mut("aggregations").map(serde_json::Value::take);
    if let Some(serde_json::Value::Object(aggregations)) = aggregations {
        return Ok(QueryOutput::Aggregations(aggregations));
    }

    let hits = match body.pointer_mut("/hits/hits").map(serde_json::Value::take) {
        Some(serde_json::Value::Array(hits)) => hits,
        _ => {
            return Err(BackendError::UnexpectedResponse(
                "search response without 'hits.hits'".to_string(),
            ))
        }
    };

    let rows = hits
        .into_iter()
        .map(|hit| match hit {
            serde_json::Value::Object(row) => Ok(row),
            other => Err(BackendError::UnexpectedResponse(format!(
                "hit is not an object: {other}"
            ))),
        })
        .collect::<Result<Vec<Row>, _>>()?;
    Ok(QueryOutput::Rows(rows))
}

/// Extracts the human-readable root cause from an error body.
fn root_cause_reason(body: &serde_json::Value) -> Option<String> {
    body.pointer("/error/root_cause/0/reason")
        .or_else(|| body.pointer("/error/reason"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

fn normalize_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}
