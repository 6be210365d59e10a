use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::ApiError;

/// Thin JSON client for the customs REST backend.
///
/// Every request carries `Authorization: Token <token>` when a token is
/// configured. Non-2xx responses become `ApiError::Status` with the body.
#[derive(Clone)]
pub struct CustomsClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl CustomsClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        if self.token.is_empty() {
            builder
        } else {
            builder.header(AUTHORIZATION, format!("Token {}", self.token))
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        send(self.request(Method::GET, path).query(query)).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        send(self.request(Method::PUT, path).json(body)).await
    }
}

async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ApiError> {
    let resp = builder.send().await?;
    let status = resp.status();
    debug!(url = %resp.url(), status = status.as_u16(), "customs api response");
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
