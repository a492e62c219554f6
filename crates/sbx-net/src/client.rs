//! Catalog REST client.
//!
//! Every endpoint is scoped under `/device/{device_id}/`. Bodies are small
//! JSON objects; a malformed body degrades to "nothing assigned" / defaults
//! rather than failing the caller, so a misbehaving catalog cannot wedge
//! the node (non-2xx statuses are still surfaced as errors).

use reqwest::{Client, Response, Url};
use sbx_core::config::CatalogConfig;
use sbx_core::types::{CounterPair, ManifestEntry};
use sbx_core::{SbxError, SbxResult};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct CatalogClient {
    http: Client,
    /// `<base>/device/<id>/`, kept with a trailing slash so joins are cheap.
    base: Url,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig, device_id: &str) -> SbxResult<Self> {
        let http = Client::builder()
            .user_agent(crate::USER_AGENT)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .map_err(|e| SbxError::Network(format!("building catalog client: {e}")))?;

        let mut base = Url::parse(&config.base_url)
            .map_err(|e| SbxError::Protocol(format!("bad base url {}: {e}", config.base_url)))?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let base = base
            .join(&format!("device/{device_id}/"))
            .map_err(|e| SbxError::Protocol(format!("bad device id {device_id:?}: {e}")))?;

        Ok(CatalogClient { http, base })
    }

    /// The ordered list of assets this node should hold.
    ///
    /// A body that is not the expected shape yields an empty list: a bad
    /// manifest response means "nothing to sync", never a crash.
    pub async fn manifest(&self) -> SbxResult<Vec<ManifestEntry>> {
        let body = self.get_text("videos/downloads").await?;
        let value: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "manifest body is not JSON; treating as empty");
                return Ok(Vec::new());
            }
        };

        let Some(items) = value.get("items").and_then(Value::as_array) else {
            warn!("manifest body has no items array; treating as empty");
            return Ok(Vec::new());
        };

        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<ManifestEntry>(item.clone()) {
                Ok(entry) if !entry.url.trim().is_empty() => entries.push(entry),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "skipping malformed manifest entry"),
            }
        }
        Ok(entries)
    }

    /// Whether the catalog considers this node's download work complete.
    pub async fn completion_flag(&self) -> SbxResult<bool> {
        let body = self.get_text("download_status").await?;
        let value: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "status body is not JSON; assuming incomplete");
                return Ok(false);
            }
        };
        Ok(value
            .get("download_status")
            .or_else(|| value.get("status"))
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Tell the catalog the assignment is satisfied.
    pub async fn mark_complete(&self) -> SbxResult<()> {
        self.post_json("download_update", &json!({ "status": true }))
            .await
    }

    /// Presence heartbeat.
    pub async fn post_online(&self) -> SbxResult<()> {
        self.post_json("online_update", &json!({ "is_online": true }))
            .await
    }

    /// Push the latest sensor reading, rounded to two decimals.
    pub async fn post_temperature(&self, celsius: f32) -> SbxResult<()> {
        let rounded = (f64::from(celsius) * 100.0).round() / 100.0;
        self.post_json("temperature_update", &json!({ "temperature": rounded }))
            .await
    }

    /// Current usage counters; absent or malformed fields read as zero.
    pub async fn counters(&self) -> SbxResult<CounterPair> {
        let body = self.get_text("counts").await?;
        let value: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        Ok(CounterPair {
            daily: value.get("daily_count").and_then(Value::as_i64).unwrap_or(0),
            monthly: value
                .get("monthly_count")
                .and_then(Value::as_i64)
                .unwrap_or(0),
        })
    }

    pub async fn post_daily(&self, value: i64) -> SbxResult<()> {
        self.post_json("daily_update", &json!({ "daily_count": value }))
            .await
    }

    pub async fn post_monthly(&self, value: i64) -> SbxResult<()> {
        self.post_json("monthly_update", &json!({ "monthly_count": value }))
            .await
    }

    async fn get_text(&self, path: &str) -> SbxResult<String> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| SbxError::Network(format!("GET {url}: {e}")))?;
        let response = ensure_2xx(response)?;
        response
            .text()
            .await
            .map_err(|e| SbxError::Network(format!("reading {url}: {e}")))
    }

    async fn post_json(&self, path: &str, body: &Value) -> SbxResult<()> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .post(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| SbxError::Network(format!("POST {url}: {e}")))?;
        ensure_2xx(response)?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> SbxResult<Url> {
        self.base
            .join(path)
            .map_err(|e| SbxError::Protocol(format!("bad endpoint {path}: {e}")))
    }
}

fn ensure_2xx(response: Response) -> SbxResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SbxError::Status {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
        })
    }
}
