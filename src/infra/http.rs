//! REST transport for the metrics API.

use std::error::Error as StdError;
use std::sync::Arc;

use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::cache::{FetchError, QueryParams};
use crate::config::ApiSettings;

use super::error::InfraError;

pub const API_BASE_PATH: &str = "/api/v1";
pub const NETWORK_ERROR_MESSAGE: &str = "Network request failed";

/// Normalized API failure.
///
/// `message` prefers the `message` field of the response body, then the
/// transport's own description.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    pub status: Option<u16>,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            message: if message.trim().is_empty() {
                NETWORK_ERROR_MESSAGE.to_string()
            } else {
                message
            },
            status: None,
            details: None,
        }
    }

    fn from_transport(error: reqwest::Error) -> Self {
        let mut api_error = Self::new(error.to_string());
        api_error.status = error.status().map(|status| status.as_u16());
        api_error.details = error
            .source()
            .map(|cause| Value::String(cause.to_string()));
        api_error
    }

    fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let details = serde_json::from_slice::<Value>(body).ok().or_else(|| {
            (!body.is_empty()).then(|| Value::String(String::from_utf8_lossy(body).into_owned()))
        });
        let message = details
            .as_ref()
            .and_then(|body| body.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("request failed with status code {}", status.as_u16()));

        Self {
            message,
            status: Some(status.as_u16()),
            details,
        }
    }

    fn decode(status: StatusCode, error: serde_json::Error) -> Self {
        Self {
            message: format!("failed to decode response body: {error}"),
            status: Some(status.as_u16()),
            details: None,
        }
    }

    pub fn into_fetch_error(self) -> FetchError {
        Arc::new(self)
    }
}

/// Thin JSON client over the API base URL.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, InfraError> {
        let mut base = settings.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Self { http, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("costboard/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for `path` under [`API_BASE_PATH`] with `params` as the
    /// query string.
    pub fn endpoint(&self, path: &str, params: &QueryParams) -> Result<Url, ApiError> {
        let relative = format!(
            "{}/{}",
            API_BASE_PATH.trim_start_matches('/'),
            path.trim_start_matches('/')
        );
        let mut url = self
            .base
            .join(&relative)
            .map_err(|err| ApiError::new(format!("invalid endpoint `{path}`: {err}")))?;

        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in params.to_query_pairs() {
                pairs.append_pair(&name, &value);
            }
        }
        Ok(url)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &QueryParams,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path, params)?;
        debug!(url = %url, "GET");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ApiError::from_transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(ApiError::from_transport)?;

        if !status.is_success() {
            return Err(ApiError::from_response(status, &bytes));
        }
        serde_json::from_slice(&bytes).map_err(|err| ApiError::decode(status, err))
    }
}
