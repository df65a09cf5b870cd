//! HTTP client implementation.
//!
//! Provides the REST client. Every request is signed when a credential is
//! configured; replies carrying an `error` object map to
//! [`ClientError::Api`]. Requests are never retried.

use std::collections::HashMap;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::config::ClientConfig;
use super::error::ClientError;
use crate::error::ExchangeError;
use crate::types::{Balance, OrderBook};

/// API error response format.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ExchangeError,
}

#[derive(Debug, Serialize)]
struct DepthQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    depth: Option<u32>,
}

/// HTTP client for the exchange REST API.
#[derive(Debug, Clone)]
pub struct HttpClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl HttpClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .user_agent(&config.user_agent)
            .build()
            .map_err(ClientError::Request)?;

        Ok(Self { config, http })
    }

    /// Creates a new client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self, ClientError> {
        Self::new(ClientConfig::default())
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Makes a GET request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server replies with an
    /// error.
    pub async fn get<T, Q>(&self, path: &str, query: &Q) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.send(Method::GET, path, encode_query(query)?, None).await
    }

    /// Makes a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server replies with an
    /// error.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::POST, path, String::new(), Some(encode_body(body)?))
            .await
    }

    /// Makes a PUT request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server replies with an
    /// error.
    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::PUT, path, String::new(), Some(encode_body(body)?))
            .await
    }

    /// Makes a PATCH request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server replies with an
    /// error.
    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::PATCH, path, String::new(), Some(encode_body(body)?))
            .await
    }

    /// Makes a DELETE request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server replies with an
    /// error.
    pub async fn delete<T, Q>(&self, path: &str, query: &Q) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.send(Method::DELETE, path, encode_query(query)?, None).await
    }

    /// Returns the `Authorization` header for a request, or `None` when no
    /// credential is configured.
    fn authorization(
        &self,
        method: &Method,
        url: &str,
        query: &str,
        body: Option<&str>,
        timestamp: i64,
    ) -> Result<Option<String>, ClientError> {
        let Some(credential) = self.config.credential.as_ref() else {
            return Ok(None);
        };

        let url = Url::parse(url).map_err(|e| ClientError::InvalidConfig(e.to_string()))?;
        let header = credential.http_authorization(
            method.as_str(),
            timestamp,
            url.path(),
            Some(query),
            body,
            self.config.window_ms,
        );
        Ok(Some(header))
    }

    fn url(&self, path: &str, query: &str) -> String {
        let mut url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: String,
        body: Option<String>,
    ) -> Result<T, ClientError> {
        let url = self.url(path, &query);
        let timestamp = Utc::now().timestamp_millis();
        let authorization =
            self.authorization(&method, &url, &query, body.as_deref(), timestamp)?;

        debug!("{} {}", method, path);
        let mut request = self.http.request(method, &url);
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&text)
                .map_err(|e| ClientError::Deserialization(e.to_string()));
        }

        if let Ok(error_resp) = serde_json::from_str::<ApiErrorResponse>(&text) {
            return Err(ClientError::Api {
                status: status.as_u16(),
                error: error_resp.error,
            });
        }

        match status {
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(path.to_string())),
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
            _ => Err(ClientError::Api {
                status: status.as_u16(),
                error: ExchangeError::new(i64::from(status.as_u16()), text),
            }),
        }
    }

    fn require_credential(&self) -> Result<(), ClientError> {
        if self.config.credential.is_none() {
            return Err(ClientError::MissingCredentials);
        }
        Ok(())
    }

    /// Gets all trading symbols, keyed by symbol name.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_symbols(&self) -> Result<HashMap<String, Value>, ClientError> {
        self.get("/public/symbol", &[] as &[(&str, &str)]).await
    }

    /// Gets the order book of a symbol.
    ///
    /// # Arguments
    ///
    /// * `symbol` - The symbol, e.g. `ETHBTC`
    /// * `depth` - Optional number of levels per side (0 for the full book)
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_order_book(
        &self,
        symbol: &str,
        depth: Option<u32>,
    ) -> Result<OrderBook, ClientError> {
        let path = format!("/public/orderbook/{}", symbol);
        let mut book: OrderBook = self.get(&path, &DepthQuery { depth }).await?;
        book.symbol = symbol.to_string();
        Ok(book)
    }

    /// Gets the spot trading balances.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::MissingCredentials` without a credential, or
    /// an error if the request fails.
    pub async fn get_spot_balances(&self) -> Result<Vec<Balance>, ClientError> {
        self.require_credential()?;
        self.get("/spot/balance", &[] as &[(&str, &str)]).await
    }
}

fn encode_query<Q: Serialize + ?Sized>(query: &Q) -> Result<String, ClientError> {
    serde_urlencoded::to_string(query).map_err(|e| ClientError::InvalidArgument(e.to_string()))
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<String, ClientError> {
    serde_json::to_string(body).map_err(|e| ClientError::InvalidArgument(e.to_string()))
}
