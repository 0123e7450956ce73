use super::sigv4::{encode_key, hex_sha256, SigV4Signer, EMPTY_PAYLOAD_SHA256};
use super::{BlockingObjectStore, ListPage, StoreError};
use crate::infrastructure::config::CosConfig;
use chrono::Utc;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

const PAGE_SIZE: &str = "1000";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Tencent Cloud COS through its S3-compatible REST API.
///
/// The HTTP client is blocking, so every method must run on a worker thread.
/// It is built lazily on first use for the same reason.
pub struct CosStore {
    bucket: String,
    host: String,
    signer: SigV4Signer,
    http: OnceLock<Client>,
}

impl CosStore {
    pub fn new(config: &CosConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            host: config.host(),
            signer: SigV4Signer::new(&config.secret_id, &config.secret_key, &config.region),
            http: OnceLock::new(),
        }
    }

    fn http(&self) -> Result<&Client, StoreError> {
        if let Some(client) = self.http.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Transport(format!("Failed to build COS client: {}", e)))?;
        Ok(self.http.get_or_init(|| client))
    }

    fn url(&self, canonical_uri: &str, canonical_query: &str) -> String {
        if canonical_query.is_empty() {
            format!("https://{}{}", self.host, canonical_uri)
        } else {
            format!("https://{}{}?{}", self.host, canonical_uri, canonical_query)
        }
    }
}

impl BlockingObjectStore for CosStore {
    fn name(&self) -> &str {
        "cos"
    }

    fn list_page(&self, prefix: &str, marker: Option<String>) -> Result<ListPage, StoreError> {
        let mut query = vec![
            ("max-keys".to_string(), PAGE_SIZE.to_string()),
            ("prefix".to_string(), prefix.to_string()),
        ];
        if let Some(marker) = marker.filter(|m| !m.is_empty()) {
            query.push(("marker".to_string(), marker));
        }

        let signed = self.signer.sign(
            "GET",
            &self.host,
            "/",
            &query,
            &[],
            EMPTY_PAYLOAD_SHA256,
            Utc::now(),
        );
        let url = self.url("/", &super::sigv4::canonical_query(&query));

        let resp = self
            .http()?
            .get(&url)
            .header("Authorization", &signed.authorization)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("x-amz-date", &signed.amz_date)
            .send()
            .map_err(|e| {
                StoreError::Transport(format!(
                    "Failed to list cos://{}/{}: {}",
                    self.bucket, prefix, e
                ))
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| StoreError::Transport(format!("Failed to read COS listing: {}", e)))?;
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }

        Ok(parse_list_objects_response(&body))
    }

    fn head(&self, key: &str) -> Result<bool, StoreError> {
        let canonical_uri = encode_key(key);
        let signed = self.signer.sign(
            "HEAD",
            &self.host,
            &canonical_uri,
            &[],
            &[],
            EMPTY_PAYLOAD_SHA256,
            Utc::now(),
        );

        let resp = self
            .http()?
            .head(self.url(&canonical_uri, ""))
            .header("Authorization", &signed.authorization)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("x-amz-date", &signed.amz_date)
            .send()
            .map_err(|e| StoreError::Transport(format!("COS head failed for {}: {}", key, e)))?;

        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StoreError::Rejected {
                status: status.as_u16(),
                message: format!("HEAD {}", key),
            }),
        }
    }

    fn put(&self, local_path: &Path, key: &str, content_type: &str) -> Result<(), StoreError> {
        let body = std::fs::read(local_path).map_err(|e| {
            StoreError::LocalFile(format!("{}: {}", local_path.display(), e))
        })?;
        let payload_hash = hex_sha256(&body);
        let canonical_uri = encode_key(key);
        let signed = self.signer.sign(
            "PUT",
            &self.host,
            &canonical_uri,
            &[],
            &[("content-type".to_string(), content_type.to_string())],
            &payload_hash,
            Utc::now(),
        );

        let resp = self
            .http()?
            .put(self.url(&canonical_uri, ""))
            .header("Authorization", &signed.authorization)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("x-amz-date", &signed.amz_date)
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .map_err(|e| StoreError::Transport(format!("COS upload failed for {}: {}", key, e)))?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(key = %key, "COS upload complete");
            Ok(())
        } else {
            let message = resp.text().unwrap_or_default();
            Err(StoreError::Rejected {
                status: status.as_u16(),
                message: message.chars().take(500).collect(),
            })
        }
    }
}

/// Parse a ListObjects (v1) response.
///
/// Without a delimiter the store may omit `NextMarker` on truncated pages;
/// the last key of the page is the marker in that case.
fn parse_list_objects_response(xml: &str) -> ListPage {
    let has_more = extract_xml_value(xml, "IsTruncated")
        .map(|v| v.trim() == "true")
        .unwrap_or(false);

    let mut keys = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        if let Some(key) = extract_xml_value(block, "Key") {
            keys.push(unescape_xml(&key));
        }
        remaining = &remaining[block_start + end + "</Contents>".len()..];
    }

    let next_token = if has_more {
        extract_xml_value(xml, "NextMarker")
            .map(|m| unescape_xml(&m))
            .filter(|m| !m.is_empty())
            .or_else(|| keys.last().cloned())
    } else {
        None
    };

    ListPage {
        keys,
        next_token,
        has_more,
    }
}

fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
