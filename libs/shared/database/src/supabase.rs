use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_RANGE, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// SQLSTATE raised by Postgres when an exclusion constraint rejects a row.
pub const EXCLUSION_VIOLATION: &str = "23P01";

#[derive(Error, Debug)]
pub enum SupabaseError {
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl SupabaseError {
    /// PostgREST error code (a Postgres SQLSTATE for database-side failures).
    pub fn code(&self) -> Option<&str> {
        match self {
            SupabaseError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_exclusion_violation(&self) -> bool {
        self.code() == Some(EXCLUSION_VIOLATION)
    }
}

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self) -> Result<HeaderMap, SupabaseError> {
        let mut headers = HeaderMap::new();

        let key = HeaderValue::from_str(&self.service_key)
            .map_err(|e| SupabaseError::InvalidHeader(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.service_key))
            .map_err(|e| SupabaseError::InvalidHeader(e.to_string()))?;

        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(headers)
    }

    /// Send a request and decode the JSON body.
    ///
    /// Writes ask PostgREST to echo the affected rows back.
    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, SupabaseError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers()?;
        if method != Method::GET {
            headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(Self::api_error(status.as_u16(), &error_text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SupabaseError::Decode(e.to_string()))
    }

    /// Exact row count for a filtered table path, read from `Content-Range`.
    pub async fn count(&self, path: &str) -> Result<u64, SupabaseError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Counting rows at {}", url);

        let mut headers = self.get_headers()?;
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));

        let response = self.client.request(Method::HEAD, &url).headers(headers).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::api_error(status.as_u16(), &error_text));
        }

        let range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| SupabaseError::Decode("missing Content-Range header".to_string()))?;

        parse_content_range_total(range)
    }

    fn api_error(status: u16, body: &str) -> SupabaseError {
        error!("API error ({}): {}", status, body);

        let parsed: Option<PostgrestError> = serde_json::from_str(body).ok();
        let (code, message) = match parsed {
            Some(err) => (err.code, err.message.unwrap_or_else(|| body.to_string())),
            None => (None, body.to_string()),
        };

        SupabaseError::Api { status, code, message }
    }
}

/// `0-24/3573` or `*/0` -> total after the slash.
fn parse_content_range_total(range: &str) -> Result<u64, SupabaseError> {
    range
        .rsplit('/')
        .next()
        .and_then(|total| total.trim().parse::<u64>().ok())
        .ok_or_else(|| SupabaseError::Decode(format!("unexpected Content-Range '{}'", range)))
}
