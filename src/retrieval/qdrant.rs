//! Minimal Qdrant REST client for the example collection.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::config::IndexSettings;
use crate::error::ForgeError;
use crate::retrieval::{ExamplePayload, IndexPoint, ScoredPoint, VectorIndex};

pub struct QdrantIndex {
    client: Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct QdrantScored {
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct QdrantPoint<'a> {
    id: String,
    vector: &'a [f32],
    payload: &'a ExamplePayload,
}

impl QdrantIndex {
    pub fn new(settings: &IndexSettings) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.url.trim_end_matches('/').to_string(),
            collection: settings.collection.clone(),
            api_key: settings.api_key.clone(),
        }
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response, ForgeError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ForgeError::IndexUnavailable(format!("{}: {}", what, e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::IndexUnavailable(format!(
                "{} returned {}: {}",
                what,
                status,
                body.trim()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>, ForgeError> {
        let builder = self
            .request(reqwest::Method::POST, self.collection_url("/points/search"))
            .json(&json!({
                "vector": vector,
                "limit": limit,
                "with_payload": true,
            }));
        let response = self.send(builder, "search").await?;
        let parsed: QdrantResponse<Vec<QdrantScored>> = response
            .json()
            .await
            .map_err(|e| ForgeError::IndexUnavailable(format!("Malformed search response: {}", e)))?;

        let points = parsed
            .result
            .into_iter()
            .filter_map(|p| {
                let payload = p
                    .payload
                    .and_then(|v| serde_json::from_value::<ExamplePayload>(v).ok());
                if payload.is_none() {
                    debug!(score = p.score, "Skipping hit without description/script payload");
                }
                payload.map(|payload| ScoredPoint {
                    score: p.score,
                    payload,
                })
            })
            .collect();
        Ok(points)
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<(), ForgeError> {
        let probe = self
            .request(reqwest::Method::GET, self.collection_url(""))
            .send()
            .await
            .map_err(|e| ForgeError::IndexUnavailable(format!("collection lookup: {}", e)))?;
        if probe.status().is_success() {
            return Ok(());
        }
        if probe.status() != StatusCode::NOT_FOUND {
            return Err(ForgeError::IndexUnavailable(format!(
                "collection lookup returned {}",
                probe.status()
            )));
        }

        let builder = self
            .request(reqwest::Method::PUT, self.collection_url(""))
            .json(&json!({
                "vectors": { "size": dimensions, "distance": "Cosine" }
            }));
        self.send(builder, "create collection").await?;
        info!(collection = %self.collection, dimensions, "Created vector collection");
        Ok(())
    }

    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<(), ForgeError> {
        if points.is_empty() {
            return Ok(());
        }
        let body: Vec<QdrantPoint<'_>> = points
            .iter()
            .map(|p| QdrantPoint {
                id: p.id.to_string(),
                vector: &p.vector,
                payload: &p.payload,
            })
            .collect();
        let builder = self
            .request(reqwest::Method::PUT, self.collection_url("/points?wait=true"))
            .json(&json!({ "points": body }));
        self.send(builder, "upsert").await?;
        Ok(())
    }
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex")
            .field("base_url", &self.base_url)
            .field("collection", &self.collection)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_urls() {
        let index = QdrantIndex::new(&IndexSettings {
            url: "http://localhost:6333/".into(),
            ..Default::default()
        });
        assert_eq!(
            index.collection_url("/points/search"),
            "http://localhost:6333/collections/cad_scripts/points/search"
        );
    }

    #[test]
    fn test_search_response_parsing() {
        let raw = r#"{"result":[
            {"id":1,"version":0,"score":0.91,"payload":{"description":"flange","script":"import cadquery"}},
            {"id":2,"version":0,"score":0.80,"payload":{"other":"x"}}
        ],"status":"ok","time":0.001}"#;
        let parsed: QdrantResponse<Vec<QdrantScored>> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.result.len(), 2);
        let payload: ExamplePayload =
            serde_json::from_value(parsed.result[0].payload.clone().unwrap()).unwrap();
        assert_eq!(payload.description, "flange");
    }

    #[tokio::test]
    async fn test_unreachable_index_is_unavailable() {
        let index = QdrantIndex::new(&IndexSettings {
            url: "http://127.0.0.1:9".into(),
            ..Default::default()
        });
        let err = index.search(&[0.0; 4], 4).await.unwrap_err();
        assert_eq!(err.label(), "INDEX_UNAVAILABLE");
    }
}
