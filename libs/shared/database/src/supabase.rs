use std::time::Duration;

use anyhow::{Result, anyhow};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key).unwrap());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
            );
        }

        headers
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         extra_headers: Option<HeaderMap>)
                                         -> Result<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut headers = self.get_headers(auth_token);
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Filtered read against a collection. `query` is a PostgREST filter
    /// string such as `clinic_id=eq.X&status=eq.pending&order=created_at.desc`.
    pub async fn select(&self, collection: &str, query: &str,
                        auth_token: Option<&str>) -> Result<Vec<Value>> {
        let path = format!("/rest/v1/{}?{}", collection, query);
        self.request(Method::GET, &path, auth_token, None).await
    }

    /// Insert one or more rows, returning the stored representation.
    pub async fn insert(&self, collection: &str, rows: Value,
                        auth_token: Option<&str>) -> Result<Vec<Value>> {
        let path = format!("/rest/v1/{}", collection);
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(Method::POST, &path, auth_token, Some(rows), Some(headers)).await
    }

    /// Insert-or-replace keyed on `on_conflict`. Retries of a failed
    /// multi-write operation go through here so they cannot duplicate rows.
    pub async fn upsert(&self, collection: &str, on_conflict: &str, rows: Value,
                        auth_token: Option<&str>) -> Result<Vec<Value>> {
        let path = format!("/rest/v1/{}?on_conflict={}", collection, on_conflict);
        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("return=representation,resolution=merge-duplicates"),
        );

        self.request_with_headers(Method::POST, &path, auth_token, Some(rows), Some(headers)).await
    }

    /// Patch all rows matching `query`, returning the updated rows.
    pub async fn update(&self, collection: &str, query: &str, patch: Value,
                        auth_token: Option<&str>) -> Result<Vec<Value>> {
        let path = format!("/rest/v1/{}?{}", collection, query);
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(Method::PATCH, &path, auth_token, Some(patch), Some(headers)).await
    }

    /// Delete all rows matching `query`, returning the removed rows.
    pub async fn delete(&self, collection: &str, query: &str,
                        auth_token: Option<&str>) -> Result<Vec<Value>> {
        let path = format!("/rest/v1/{}?{}", collection, query);
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(Method::DELETE, &path, auth_token, None, Some(headers)).await
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
