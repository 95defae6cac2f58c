//! HTTP implementation of [`ApiClient`] for the Portfolio123 API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{ApiClient, Request};
use crate::error::ClientError;

/// Default API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.portfolio123.com:8443";

/// Path of the authentication call
const AUTH_PATH: &str = "/auth";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Connection settings for [`P123Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_id: String,
    pub api_key: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_id: api_id.into(),
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Read `P123_API_ID`, `P123_API_KEY` and the optional
    /// `P123_API_ENDPOINT` / `P123_API_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ClientError> {
        let api_id = env::var("P123_API_ID")
            .map_err(|_| ClientError::Credentials("P123_API_ID not set".to_string()))?;
        let api_key = env::var("P123_API_KEY")
            .map_err(|_| ClientError::Credentials("P123_API_KEY not set".to_string()))?;

        let mut config = Self::new(api_id, api_key);
        if let Ok(endpoint) = env::var("P123_API_ENDPOINT") {
            config.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        if let Some(secs) = env::var("P123_API_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()) {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

/// Portfolio123 API client with transparent re-authentication.
pub struct P123Client {
    config: ClientConfig,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl P123Client {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Request(e.to_string()))?;
        Ok(Self {
            config,
            http,
            token: RwLock::new(None),
        })
    }

    /// Create a client from environment variables
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn api_id(&self) -> &str {
        &self.config.api_id
    }

    async fn post(&self, request: Request, payload: &Value) -> Result<Option<reqwest::Response>, ClientError> {
        let token = self.token.read().await.clone();
        let Some(token) = token else {
            return Ok(None);
        };
        let url = format!("{}{}", self.config.endpoint, request.path());
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;
        Ok(Some(response))
    }
}

#[async_trait]
impl ApiClient for P123Client {
    async fn authenticate(&self) -> Result<(), ClientError> {
        let url = format!("{}{}", self.config.endpoint, AUTH_PATH);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.api_id, Some(&self.config.api_key))
            .send()
            .await
            .map_err(|e| ClientError::Auth(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(auth_failure(status));
        }
        let token = response
            .text()
            .await
            .map_err(|e| ClientError::Auth(e.to_string()))?;
        *self.token.write().await = Some(token.trim().to_string());
        Ok(())
    }

    async fn submit(&self, request: Request, payload: &Value) -> Result<Value, ClientError> {
        let mut response = self.post(request, payload).await?;

        // Missing or expired session: authenticate once and retry
        let expired = response
            .as_ref()
            .map_or(true, |r| r.status() == StatusCode::FORBIDDEN);
        if expired {
            self.authenticate().await?;
            response = self.post(request, payload).await?;
        }

        let response = response.ok_or_else(|| ClientError::Auth(String::new()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        if status != StatusCode::OK {
            return Err(request_failure(status, body));
        }

        if !request.returns_body() || body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse(format!("{}: {}", request, e)))
    }
}

/// Error for a refused `/auth` call.
fn auth_failure(status: StatusCode) -> ClientError {
    match status {
        StatusCode::NOT_ACCEPTABLE => ClientError::Auth("user account inactive".to_string()),
        StatusCode::PAYMENT_REQUIRED => ClientError::Auth("paying subscription required".to_string()),
        _ => ClientError::Auth(String::new()),
    }
}

/// Error for a non-OK reply to an API request.
fn request_failure(status: StatusCode, body: String) -> ClientError {
    if body.is_empty() && status == StatusCode::PAYMENT_REQUIRED {
        ClientError::Request("Request quota exhausted".to_string())
    } else {
        ClientError::Request(body)
    }
}
