//! S3-compatible object store over plain HTTPS with SigV4 signing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, Url};
use tracing::debug;

use crate::config::StorageSettings;
use crate::error::ForgeError;
use crate::storage::sigv4::{self, Credentials, SigningRequest};
use crate::storage::ObjectStore;

/// S3 client. With a custom endpoint it uses path-style addressing
/// (`{endpoint}/{bucket}/{key}`), otherwise virtual-hosted AWS URLs.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
}

impl S3ObjectStore {
    pub fn new(settings: &StorageSettings) -> Self {
        Self {
            client: Client::new(),
            bucket: settings.bucket.clone(),
            region: settings.region.clone(),
            endpoint: settings
                .endpoint
                .as_ref()
                .map(|e| e.trim_end_matches('/').to_string()),
            access_key: settings.access_key.clone(),
            secret_key: settings.secret_key.clone(),
        }
    }

    /// Object URL and its canonical (encoded) path.
    pub fn object_url(&self, key: &str) -> Result<(Url, String), ForgeError> {
        let encoded_key = sigv4::uri_encode(key, true);
        let (base, canonical_uri) = match &self.endpoint {
            Some(endpoint) => (
                format!("{}/{}/{}", endpoint, self.bucket, encoded_key),
                format!("/{}/{}", sigv4::uri_encode(&self.bucket, false), encoded_key),
            ),
            None => (
                format!(
                    "https://{}.s3.{}.amazonaws.com/{}",
                    self.bucket, self.region, encoded_key
                ),
                format!("/{}", encoded_key),
            ),
        };
        let url = Url::parse(&base)
            .map_err(|e| ForgeError::Config(format!("Invalid object URL {}: {}", base, e)))?;
        Ok((url, canonical_uri))
    }

    fn credentials(&self) -> Result<Credentials<'_>, ForgeError> {
        match (self.access_key.as_deref(), self.secret_key.as_deref()) {
            (Some(access_key), Some(secret_key)) => Ok(Credentials {
                access_key,
                secret_key,
            }),
            (None, _) => Err(ForgeError::AuthMissing(
                "object-store access key (CADFORGE_S3_ACCESS_KEY) is not set".into(),
            )),
            (_, None) => Err(ForgeError::AuthMissing(
                "object-store secret key (CADFORGE_S3_SECRET_KEY) is not set".into(),
            )),
        }
    }

    fn signed_request(
        &self,
        method: Method,
        key: &str,
        body: Option<Vec<u8>>,
        mime: Option<&str>,
    ) -> Result<reqwest::RequestBuilder, ForgeError> {
        let creds = self.credentials()?;
        let (url, canonical_uri) = self.object_url(key)?;
        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => return Err(ForgeError::Config(format!("Object URL has no host: {}", url))),
        };

        let now = Utc::now();
        let payload_hash = match &body {
            Some(bytes) => sigv4::sha256_hex(bytes),
            None => sigv4::EMPTY_PAYLOAD_HASH.to_string(),
        };
        let amz_date = sigv4::amz_date(now);

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), host);
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        headers.insert("x-amz-date".to_string(), amz_date.clone());

        let authorization = sigv4::authorization(
            &SigningRequest {
                method: method.as_str(),
                canonical_uri: &canonical_uri,
                canonical_query: "",
                headers: &headers,
                payload_hash: &payload_hash,
            },
            &creds,
            &self.region,
            "s3",
            now,
        );

        let mut request = self
            .client
            .request(method, url)
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", amz_date)
            .header("Authorization", authorization);
        if let Some(mime) = mime {
            request = request.header("Content-Type", mime);
        }
        if let Some(bytes) = body {
            request = request.body(bytes);
        }
        Ok(request)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, mime: &str) -> Result<(), ForgeError> {
        let request = self.signed_request(Method::PUT, key, Some(bytes), Some(mime))?;
        let response = request
            .send()
            .await
            .map_err(|e| ForgeError::UploadFailed(format!("PUT {}: {}", key, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::UploadFailed(format!(
                "PUT {} returned {}: {}",
                key,
                status,
                body.trim()
            )));
        }
        debug!(key, %status, "S3 PUT complete");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ForgeError> {
        let request = self.signed_request(Method::GET, key, None, None)?;
        let unreadable = |message: String| ForgeError::FileUnreadable {
            path: key.to_string(),
            message,
        };

        let response = request.send().await.map_err(|e| unreadable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(unreadable(format!("object store returned {}", status)));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn backend(&self) -> &'static str {
        "s3"
    }
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key.as_ref().map(|_| "[REDACTED]"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
