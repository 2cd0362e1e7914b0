// api.rs - Internal VOD API Client
// Typed access to the remote service that owns streams, users and cache jobs.
// Every endpoint speaks the same contract: JSON body, `X-API-Key` header, and
// a `{success, data, error}` envelope in the response.
//
// Used by: commands (search/status/admin), dispatch.rs (downloads), poller.rs (cache jobs)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use serenity::model::id::UserId;
use std::time::Duration;
use thiserror::Error;

use crate::config::BotConfig;
use crate::results::ContentKind;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },
    #[error("{endpoint} answered with HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("API rejected the request: {0}")]
    Rejected(String),
    #[error("malformed API response: {0}")]
    Malformed(String),
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Backend account linked to a chat user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DownloadRequest {
    pub user_id: String,
    pub stream_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadTicket {
    pub url: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStartRequest {
    pub user_id: String,
    pub stream_id: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub title: String,
    pub series_title: String,
    pub season: u32,
    pub episode: u32,
    pub days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheTicket {
    /// Opaque, shown to the user as-is.
    pub expires: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Downloading,
    Ready,
    Failed,
}

impl CacheStatus {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "ready" | "complete" | "completed" | "done" => CacheStatus::Ready,
            "failed" | "error" => CacheStatus::Failed,
            _ => CacheStatus::Downloading,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CacheStatus::Downloading)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheProgress {
    pub status: CacheStatus,
    pub downloaded: Option<u64>,
    pub total: Option<u64>,
    pub percent: Option<f64>,
}

impl CacheProgress {
    pub fn from_value(data: &Value) -> Self {
        let number = |key: &str| match data.get(key) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Self {
            status: CacheStatus::parse(data.get("status").and_then(Value::as_str).unwrap_or("")),
            downloaded: number("downloaded").filter(|v| *v >= 0.0).map(|v| v as u64),
            total: number("total").filter(|v| *v > 0.0).map(|v| v as u64),
            percent: number("percent"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStatus {
    pub active_streams: u64,
    pub active_users: u64,
}

fn count(data: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|k| match data.get(*k) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::Array(items)) => Some(items.len() as u64),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        })
        .unwrap_or(0)
}

/// Decode the `{success, data, error}` envelope.
pub fn decode_envelope(endpoint: &str, status: u16, body: &str) -> Result<Value, ApiError> {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if (200..300).contains(&status) => return Err(ApiError::Malformed(e.to_string())),
        Err(_) => {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status,
            })
        }
    };
    if !envelope.success {
        return Err(ApiError::Rejected(
            envelope
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| format!("{} failed (HTTP {})", endpoint, status)),
        ));
    }
    Ok(envelope.data)
}

// ============================================================================
// CLIENT
// ============================================================================

#[async_trait]
pub trait VodApi: Send + Sync {
    /// Backend identity linked to a chat user, `None` when the user is not linked.
    async fn resolve_user(&self, user: UserId) -> Result<Option<BackendUser>, ApiError>;

    /// Raw, loosely-typed search records.
    async fn search(&self, query: &str) -> Result<Vec<Value>, ApiError>;

    async fn request_download(&self, request: &DownloadRequest) -> Result<DownloadTicket, ApiError>;

    async fn start_cache(&self, request: &CacheStartRequest) -> Result<CacheTicket, ApiError>;

    async fn cache_progress(&self, stream_id: &str) -> Result<CacheProgress, ApiError>;

    async fn status(&self) -> Result<ServerStatus, ApiError>;

    async fn disconnect_user(&self, username: &str) -> Result<(), ApiError>;

    async fn block_user(&self, username: &str, minutes: u32) -> Result<(), ApiError>;
}

pub struct HttpVodApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpVodApi {
    pub fn new(config: &BotConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent("VOD-Bot-Rust-Client/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder, endpoint: &str) -> Result<Value, ApiError> {
        let transport = |source| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source,
        };
        let response = request
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport)?;
        log::debug!("[API] {} -> HTTP {} ({} bytes)", endpoint, status, body.len());
        decode_envelope(endpoint, status, &body)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.send(self.client.post(self.url(path)).json(body), path).await
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        self.send(self.client.get(self.url(path)).query(query), path).await
    }
}

fn text(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match data.get(*k) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[async_trait]
impl VodApi for HttpVodApi {
    async fn resolve_user(&self, user: UserId) -> Result<Option<BackendUser>, ApiError> {
        let data = self
            .post("/api/users/resolve", &json!({ "discord_id": user.0.to_string() }))
            .await?;
        Ok(text(&data, &["user_id", "id"]).map(|id| BackendUser {
            username: text(&data, &["username", "name"]).unwrap_or_else(|| id.clone()),
            id,
        }))
    }

    async fn search(&self, query: &str) -> Result<Vec<Value>, ApiError> {
        let data = self.post("/api/search", &json!({ "query": query })).await?;
        match data {
            Value::Array(items) => Ok(items),
            Value::Object(ref map) => match map.get("results") {
                Some(Value::Array(items)) => Ok(items.clone()),
                _ => Err(ApiError::Malformed("search data has no result list".to_string())),
            },
            Value::Null => Ok(Vec::new()),
            other => Err(ApiError::Malformed(format!("unexpected search data: {}", other))),
        }
    }

    async fn request_download(&self, request: &DownloadRequest) -> Result<DownloadTicket, ApiError> {
        let body = serde_json::to_value(request).map_err(|e| ApiError::Malformed(e.to_string()))?;
        let data = self.post("/api/download", &body).await?;
        Ok(DownloadTicket {
            url: text(&data, &["url", "download_url", "link"]),
            message: text(&data, &["message"]),
        })
    }

    async fn start_cache(&self, request: &CacheStartRequest) -> Result<CacheTicket, ApiError> {
        let body = serde_json::to_value(request).map_err(|e| ApiError::Malformed(e.to_string()))?;
        let data = self.post("/api/cache/start", &body).await?;
        Ok(CacheTicket {
            expires: text(&data, &["expires_at", "expiration", "expires"]).unwrap_or_default(),
        })
    }

    async fn cache_progress(&self, stream_id: &str) -> Result<CacheProgress, ApiError> {
        let data = self
            .get("/api/cache/progress", &[("stream_id", stream_id)])
            .await?;
        Ok(CacheProgress::from_value(&data))
    }

    async fn status(&self) -> Result<ServerStatus, ApiError> {
        let data = self.get("/api/status", &[]).await?;
        Ok(ServerStatus {
            active_streams: count(&data, &["active_streams", "streams"]),
            active_users: count(&data, &["active_users", "users"]),
        })
    }

    async fn disconnect_user(&self, username: &str) -> Result<(), ApiError> {
        self.post("/api/admin/disconnect", &json!({ "username": username }))
            .await
            .map(|_| ())
    }

    async fn block_user(&self, username: &str, minutes: u32) -> Result<(), ApiError> {
        self.post(
            "/api/admin/block",
            &json!({ "username": username, "minutes": minutes }),
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_success_envelope() {
        let data = decode_envelope("/api/search", 200, r#"{"success":true,"data":[1,2]}"#)
            .expect("success envelope");
        assert_eq!(data, json!([1, 2]));
    }

    #[test]
    fn test_decode_rejected_envelope() {
        let err = decode_envelope("/api/search", 400, r#"{"success":false,"error":"bad key"}"#)
            .unwrap_err();
        assert!(matches!(err, ApiError::Rejected(ref m) if m == "bad key"));

        let err = decode_envelope("/api/status", 500, r#"{"success":false}"#).unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_decode_garbage_body() {
        assert!(matches!(
            decode_envelope("/api/status", 200, "<html>"),
            Err(ApiError::Malformed(_))
        ));
        assert!(matches!(
            decode_envelope("/api/status", 502, "Bad Gateway"),
            Err(ApiError::Status { status: 502, .. })
        ));
    }

    #[test]
    fn test_cache_progress_parsing() {
        let progress = CacheProgress::from_value(&json!({
            "status": "downloading",
            "downloaded": 512,
            "total": "1024",
            "percent": 50.0
        }));
        assert_eq!(progress.status, CacheStatus::Downloading);
        assert_eq!(progress.downloaded, Some(512));
        assert_eq!(progress.total, Some(1024));

        let done = CacheProgress::from_value(&json!({ "status": "READY", "total": 0 }));
        assert_eq!(done.status, CacheStatus::Ready);
        assert!(done.status.is_terminal());
        assert_eq!(done.total, None);
    }

    #[test]
    fn test_cache_start_request_wire_shape() {
        let request = CacheStartRequest {
            user_id: "u1".to_string(),
            stream_id: "s1".to_string(),
            kind: ContentKind::Series,
            title: "Lost S01E01".to_string(),
            series_title: "Lost".to_string(),
            season: 1,
            episode: 1,
            days: 7,
        };
        let value = serde_json::to_value(&request).expect("serializable");
        assert_eq!(value["type"], "series");
        assert_eq!(value["days"], 7);
    }
}
