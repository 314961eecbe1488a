//! REST implementation of [`ExchangeApi`]
//!
//! - Signed requests with `ACCESS-*` headers (see [`super::auth`])
//! - Responses decoded with [`SafeDecoder`] so long ids and quantities stay exact
//! - A parsable `{code, msg, data}` envelope wins over the HTTP status;
//!   success codes come from configuration (`"00000"` by default)
//! - Reads retry with exponential backoff; order writes are sent exactly once
//! - A circuit breaker refuses requests after repeated transient failures

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::auth::Credentials;
use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::{ApiEnvelope, ExchangeApi, TransportError};
use crate::config::ExchangeConfig;
use crate::decoder::SafeDecoder;
use crate::now_millis;

pub const PLACE_ORDER_PATH: &str = "/api/v2/mix/order/place-order";
pub const CANCEL_ALL_PATH: &str = "/api/v2/mix/order/cancel-all-orders";
pub const POSITIONS_PATH: &str = "/api/v2/mix/position/all-position";
pub const OPEN_ORDERS_PATH: &str = "/api/v2/mix/order/orders-pending";

const ERROR_BODY_LIMIT: usize = 256;

/// Signed REST client for a futures venue
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    credentials: Option<Credentials>,
    product_type: String,
    success_codes: Vec<String>,
    max_retries: u32,
    retry_backoff: Duration,
    breaker: Arc<Mutex<CircuitBreaker>>,
}

impl RestClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to build HTTP client")?;

        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.failure_threshold,
            reset_timeout: Duration::from_secs(config.reset_timeout_secs),
        });

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials: Credentials::from_config(config),
            product_type: config.product_type.clone(),
            success_codes: config.success_codes.clone(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            breaker: Arc::new(Mutex::new(breaker)),
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Attach `productType` to object bodies that do not carry one
    fn with_product_type(&self, mut body: Value) -> Value {
        if let Value::Object(fields) = &mut body {
            fields
                .entry("productType")
                .or_insert_with(|| Value::String(self.product_type.clone()));
        }
        body
    }

    /// One signed request, no retry
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        body: Option<&Value>,
    ) -> Result<ApiEnvelope, TransportError> {
        if !self.breaker.lock().allow_request() {
            warn!(path, "Circuit breaker open, request refused");
            return Err(TransportError::CircuitOpen);
        }
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(TransportError::MissingCredentials)?;

        let request_path = match query {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        };
        let body_text = body.map(Value::to_string).unwrap_or_default();
        let timestamp = now_millis();
        let signature =
            credentials.sign_request(timestamp, method.as_str(), &request_path, &body_text);

        let mut request = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, request_path))
            .header("ACCESS-KEY", credentials.api_key())
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", timestamp.to_string())
            .header("ACCESS-PASSPHRASE", credentials.passphrase())
            .header("locale", "en-US")
            .header(CONTENT_TYPE, "application/json");
        if body.is_some() {
            request = request.body(body_text);
        }

        debug!(%method, path = %request_path, "Exchange request");
        let result = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(text) => classify_response(status, &text, &self.success_codes),
                    Err(e) => Err(TransportError::Network(e.to_string())),
                }
            }
            Err(e) => Err(TransportError::Network(e.to_string())),
        };

        let mut breaker = self.breaker.lock();
        match &result {
            Err(e) if e.is_transient() => breaker.on_transient_failure(),
            _ => breaker.on_success(),
        }
        result
    }

    /// Read request with retry on transient failure
    async fn get_with_retry(&self, path: &str, query: &str) -> Result<ApiEnvelope, TransportError> {
        let mut attempt = 0;
        loop {
            match self.send(Method::GET, path, Some(query), None).await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.retry_backoff * 2u32.saturating_pow(attempt);
                    warn!(
                        path,
                        attempt = attempt + 1,
                        max_attempts = self.max_retries + 1,
                        error = %e,
                        "Read failed, retrying in {}ms",
                        delay.as_millis()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Turn an HTTP status and body into an envelope or transport error
pub fn classify_response(
    status: u16,
    text: &str,
    success_codes: &[String],
) -> Result<ApiEnvelope, TransportError> {
    if let Some(envelope) = SafeDecoder::parse(text)
        .ok()
        .and_then(|value| ApiEnvelope::from_value_with(value, success_codes))
    {
        return Ok(envelope);
    }
    let body: String = text.chars().take(ERROR_BODY_LIMIT).collect();
    if status >= 500 {
        Err(TransportError::Server { status, body })
    } else if status >= 400 {
        Err(TransportError::Rejected { status, body })
    } else {
        Err(TransportError::Decode(body))
    }
}

#[async_trait]
impl ExchangeApi for RestClient {
    async fn place_order(&self, body: Value) -> Result<ApiEnvelope, TransportError> {
        let body = self.with_product_type(body);
        self.send(Method::POST, PLACE_ORDER_PATH, None, Some(&body)).await
    }

    async fn cancel_all_orders(&self, body: Value) -> Result<ApiEnvelope, TransportError> {
        let body = self.with_product_type(body);
        self.send(Method::POST, CANCEL_ALL_PATH, None, Some(&body)).await
    }

    async fn fetch_positions(&self) -> Result<ApiEnvelope, TransportError> {
        let query = format!("productType={}", self.product_type);
        self.get_with_retry(POSITIONS_PATH, &query).await
    }

    async fn fetch_open_orders(&self) -> Result<ApiEnvelope, TransportError> {
        let query = format!("productType={}", self.product_type);
        self.get_with_retry(OPEN_ORDERS_PATH, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn config(base_url: &str) -> ExchangeConfig {
        ExchangeConfig {
            base_url: base_url.to_string(),
            api_key: Some("key".into()),
            api_secret: Some("secret".into()),
            api_passphrase: Some("phrase".into()),
            max_retries: 2,
            retry_backoff_ms: 1,
            failure_threshold: 100,
            ..ExchangeConfig::default()
        }
    }

    fn venue_codes() -> Vec<String> {
        ExchangeConfig::default().success_codes
    }

    #[test]
    fn test_classify_envelope_wins_over_status() {
        let codes = venue_codes();
        let envelope =
            classify_response(400, r#"{"code":"40762","msg":"size too large"}"#, &codes).unwrap();
        assert!(!envelope.is_success());
        assert_eq!(envelope.code_text(), "40762");

        let envelope = classify_response(500, r#"{"code":"0","data":null}"#, &codes).unwrap();
        assert!(envelope.is_success());
    }

    #[test]
    fn test_classify_venue_success_code() {
        let body = r#"{"code":"00000","msg":"success","requestTime":1700000000000,"data":[]}"#;
        assert!(classify_response(200, body, &venue_codes()).unwrap().is_success());
        assert!(!classify_response(200, body, &[]).unwrap().is_success());
    }

    #[test]
    fn test_classify_without_envelope() {
        assert!(matches!(
            classify_response(502, "<html>bad gateway</html>", &[]),
            Err(TransportError::Server { status: 502, .. })
        ));
        assert!(matches!(
            classify_response(403, "forbidden", &[]),
            Err(TransportError::Rejected { status: 403, .. })
        ));
        assert!(matches!(classify_response(200, "not json", &[]), Err(TransportError::Decode(_))));
        assert!(matches!(
            classify_response(200, r#"{"ok":true}"#, &[]),
            Err(TransportError::Decode(_))
        ));
    }

    #[test]
    fn test_classify_keeps_long_ids_exact() {
        let envelope =
            classify_response(200, r#"{"code":"0","data":{"orderId":1234567890123456789}}"#, &[])
                .unwrap();
        assert_eq!(envelope.data["orderId"], "1234567890123456789");
    }

    #[tokio::test]
    async fn test_place_order_signed_and_sent_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PLACE_ORDER_PATH)
            .match_header("access-key", "key")
            .match_header("access-passphrase", "phrase")
            .match_header("access-timestamp", Matcher::Regex("^[0-9]{13}$".into()))
            .match_header("access-sign", Matcher::Regex("^[A-Za-z0-9+/]{43}=$".into()))
            .match_body(Matcher::PartialJson(json!({
                "size": "12.345",
                "productType": "USDT-FUTURES"
            })))
            .with_status(500)
            .with_body("upstream timeout")
            .expect(1)
            .create_async()
            .await;

        let client = RestClient::new(&config(&server.url())).unwrap();
        let result = client.place_order(json!({"symbol": "BTCUSDT", "size": "12.345"})).await;

        assert!(matches!(result, Err(TransportError::Server { status: 500, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reads_retry_transient_failures() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", POSITIONS_PATH)
            .match_query(Matcher::UrlEncoded("productType".into(), "USDT-FUTURES".into()))
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = RestClient::new(&config(&server.url())).unwrap();
        assert!(client.fetch_positions().await.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reads_return_envelope() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", OPEN_ORDERS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .match_header("access-key", "key")
            .with_body(r#"{"code":"00000","msg":"success","data":[{"orderId":"1","size":"2"}]}"#)
            .create_async()
            .await;

        let client = RestClient::new(&config(&server.url())).unwrap();
        let envelope = client.fetch_open_orders().await.unwrap();
        assert!(envelope.is_success());
        assert_eq!(envelope.records().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_credentials_not_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", CANCEL_ALL_PATH).expect(0).create_async().await;

        let mut cfg = config(&server.url());
        cfg.api_secret = None;
        let client = RestClient::new(&cfg).unwrap();
        assert!(!client.has_credentials());

        let result = client.cancel_all_orders(json!({"symbol": "BTCUSDT"})).await;
        assert_eq!(result, Err(TransportError::MissingCredentials));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_circuit_opens_after_transient_failures() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PLACE_ORDER_PATH)
            .with_status(502)
            .expect(2)
            .create_async()
            .await;

        let mut cfg = config(&server.url());
        cfg.failure_threshold = 2;
        let client = RestClient::new(&cfg).unwrap();

        for _ in 0..2 {
            assert!(client.place_order(json!({})).await.is_err());
        }
        assert_eq!(client.place_order(json!({})).await, Err(TransportError::CircuitOpen));
        mock.assert_async().await;
    }
}
