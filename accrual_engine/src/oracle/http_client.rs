use std::time::Duration;

use chrono::{DateTime, Utc};
use log::*;
use reqwest::{
    header::{HeaderMap, RETRY_AFTER},
    Client,
    StatusCode,
};
use serde::Deserialize;
use thiserror::Error;

use super::{AccrualOracle, OracleOutcome, OracleStatus, OracleVerdict};
use crate::db_types::{OrderNumber, Points};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);
const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum OracleClientError {
    #[error("Could not initialize oracle client: {0}")]
    Initialization(String),
}

#[derive(Debug, Clone)]
pub struct OracleClientConfig {
    /// The base address of the accrual oracle, e.g. `http://localhost:8082`
    pub base_url: String,
    /// Requests that take longer than this are abandoned and reported as transient failures.
    pub timeout: Duration,
    /// The pause to apply when a 429 response does not carry a usable `Retry-After` header.
    pub default_retry_after: Duration,
    /// The longest pause the oracle may ask for. Longer `Retry-After` values are cut down to this.
    pub max_retry_after: Duration,
}

impl OracleClientConfig {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            default_retry_after: DEFAULT_RETRY_AFTER,
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_retry_after(mut self, retry_after: Duration) -> Self {
        self.default_retry_after = retry_after;
        self
    }

    pub fn with_max_retry_after(mut self, max_retry_after: Duration) -> Self {
        self.max_retry_after = max_retry_after;
        self
    }
}

/// The body of a `200 OK` from `GET /api/orders/{number}`
#[derive(Debug, Clone, Deserialize)]
struct OracleOrderResponse {
    order: String,
    status: OracleStatus,
    accrual: Option<f64>,
}

/// Talks to the accrual oracle over HTTP.
#[derive(Clone)]
pub struct HttpOracleClient {
    config: OracleClientConfig,
    client: Client,
}

impl HttpOracleClient {
    pub fn new(config: OracleClientConfig) -> Result<Self, OracleClientError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OracleClientError::Initialization(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn url(&self, number: &OrderNumber) -> String {
        format!("{}/api/orders/{}", self.config.base_url.trim_end_matches('/'), number.as_str())
    }

    fn retry_after(&self, headers: &HeaderMap) -> Duration {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()))
            .unwrap_or(self.config.default_retry_after)
            .min(self.config.max_retry_after)
    }
}

impl AccrualOracle for HttpOracleClient {
    async fn check_order(&self, number: &OrderNumber) -> OracleOutcome {
        let url = self.url(number);
        trace!("🔮️ GET {url}");
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("🔮️ Could not reach the accrual oracle for order {number}. {e}");
                return OracleOutcome::TransientFailure(e.to_string());
            },
        };
        let status = response.status();
        match status {
            StatusCode::OK => {
                let body = match response.bytes().await {
                    Ok(b) => b,
                    Err(e) => {
                        warn!("🔮️ Could not read the oracle response for order {number}. {e}");
                        return OracleOutcome::TransientFailure(e.to_string());
                    },
                };
                let outcome = decode_verdict(number, &body);
                trace!("🔮️ Oracle says {number} is {outcome}");
                outcome
            },
            StatusCode::NO_CONTENT => {
                trace!("🔮️ Oracle has no record of {number} yet");
                OracleOutcome::unknown()
            },
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = self.retry_after(response.headers());
                info!("🔮️ Oracle is rate limiting us. Asked to back off for {}s", retry_after.as_secs_f32());
                OracleOutcome::RateLimited { retry_after }
            },
            s if s.is_server_error() => {
                warn!("🔮️ Oracle returned {s} for order {number}");
                OracleOutcome::TransientFailure(format!("Oracle returned {s}"))
            },
            s => {
                let message = response.text().await.unwrap_or_default();
                error!("🔮️ Oracle returned {s} for order {number}. {message}");
                OracleOutcome::PermanentFailure(format!("Oracle returned {s}. {message}"))
            },
        }
    }
}

fn decode_verdict(number: &OrderNumber, body: &[u8]) -> OracleOutcome {
    let response = match serde_json::from_slice::<OracleOrderResponse>(body) {
        Ok(r) => r,
        Err(e) => {
            error!("🔮️ Malformed oracle response for order {number}. {e}");
            return OracleOutcome::PermanentFailure(format!("Malformed response: {e}"));
        },
    };
    if response.order != number.as_str() {
        error!("🔮️ Asked the oracle about order {number}, but it answered for [{}]", response.order);
        return OracleOutcome::PermanentFailure(format!("Response is for a different order ({})", response.order));
    }
    let accrual = match response.accrual.map(Points::try_from_decimal).transpose() {
        Ok(Some(a)) if a.is_negative() => {
            return OracleOutcome::PermanentFailure(format!("Negative accrual of {a}"));
        },
        Ok(a) => a,
        Err(e) => return OracleOutcome::PermanentFailure(e.to_string()),
    };
    OracleOutcome::Verdict(OracleVerdict::new(response.status, accrual))
}

/// Parses a `Retry-After` header value, which is either a number of seconds or an HTTP date.
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((when - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod test {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn client_for(server: &MockServer) -> HttpOracleClient {
        let config = OracleClientConfig::new(server.base_url())
            .with_timeout(Duration::from_millis(500))
            .with_default_retry_after(Duration::from_secs(7));
        HttpOracleClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn processing_verdict() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/orders/24619735244");
                then.status(200).json_body(json!({"order": "24619735244", "status": "PROCESSING"}));
            })
            .await;
        let outcome = client_for(&server).check_order(&"24619735244".into()).await;
        assert_eq!(outcome, OracleOutcome::Verdict(OracleVerdict::processing()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn processed_verdict_carries_accrual() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/orders/61508349208");
                then.status(200).json_body(json!({"order": "61508349208", "status": "PROCESSED", "accrual": 123.45}));
            })
            .await;
        let outcome = client_for(&server).check_order(&"61508349208".into()).await;
        assert_eq!(outcome, OracleOutcome::Verdict(OracleVerdict::processed(Points::from_cents(12_345))));
    }

    #[tokio::test]
    async fn no_content_is_reported_as_processing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/orders/62794305672");
                then.status(204);
            })
            .await;
        let outcome = client_for(&server).check_order(&"62794305672".into()).await;
        assert_eq!(outcome, OracleOutcome::Verdict(OracleVerdict::processing()));
        assert_eq!(outcome, OracleOutcome::unknown());
    }

    #[tokio::test]
    async fn rate_limit_uses_retry_after_header() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/orders/24619735244");
                then.status(429).header("Retry-After", "42").body("No more than 10 requests per minute allowed");
            })
            .await;
        let outcome = client_for(&server).check_order(&"24619735244".into()).await;
        assert_eq!(outcome, OracleOutcome::RateLimited { retry_after: Duration::from_secs(42) });
    }

    #[tokio::test]
    async fn rate_limit_without_header_uses_default() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/orders/24619735244");
                then.status(429);
            })
            .await;
        let outcome = client_for(&server).check_order(&"24619735244".into()).await;
        assert_eq!(outcome, OracleOutcome::RateLimited { retry_after: Duration::from_secs(7) });
    }

    #[tokio::test]
    async fn huge_retry_after_is_capped() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/orders/24619735244");
                then.status(429).header("Retry-After", "18446744073709551615");
            })
            .await;
        let config = OracleClientConfig::new(server.base_url()).with_max_retry_after(Duration::from_secs(300));
        let outcome = HttpOracleClient::new(config).unwrap().check_order(&"24619735244".into()).await;
        assert_eq!(outcome, OracleOutcome::RateLimited { retry_after: Duration::from_secs(300) });
        // The default ceiling applies when none is configured
        let outcome = client_for(&server).check_order(&"24619735244".into()).await;
        assert_eq!(outcome, OracleOutcome::RateLimited { retry_after: Duration::from_secs(60 * 60) });
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/orders/24619735244");
                then.status(503);
            })
            .await;
        let outcome = client_for(&server).check_order(&"24619735244".into()).await;
        assert!(matches!(outcome, OracleOutcome::TransientFailure(_)), "{outcome}");
    }

    #[tokio::test]
    async fn timeouts_are_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/orders/24619735244");
                then.status(200)
                    .delay(Duration::from_secs(2))
                    .json_body(json!({"order": "24619735244", "status": "PROCESSING"}));
            })
            .await;
        let outcome = client_for(&server).check_order(&"24619735244".into()).await;
        assert!(matches!(outcome, OracleOutcome::TransientFailure(_)), "{outcome}");
    }

    #[tokio::test]
    async fn unreachable_oracle_is_transient() {
        let client = HttpOracleClient::new(
            OracleClientConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_millis(500)),
        )
        .unwrap();
        let outcome = client.check_order(&"24619735244".into()).await;
        assert!(matches!(outcome, OracleOutcome::TransientFailure(_)), "{outcome}");
    }

    #[tokio::test]
    async fn malformed_and_client_errors_are_permanent() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/orders/24619735244");
                then.status(200).body("{\"order\": \"24619735244\", \"status\": \"WAT\"}");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/orders/61508349208");
                then.status(200).json_body(json!({"order": "79927398713", "status": "PROCESSED", "accrual": 5}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/orders/62794305672");
                then.status(404);
            })
            .await;
        let client = client_for(&server);
        for number in ["24619735244", "61508349208", "62794305672"] {
            let outcome = client.check_order(&number.into()).await;
            assert!(matches!(outcome, OracleOutcome::PermanentFailure(_)), "{number}: {outcome}");
        }
    }

    #[test]
    fn retry_after_values() {
        let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2015 07:28:00 GMT").unwrap().with_timezone(&Utc);
        assert_eq!(parse_retry_after("120", now), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:29:30 GMT", now), Some(Duration::from_secs(90)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:27:00 GMT", now), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn urls() {
        let client = HttpOracleClient::new(OracleClientConfig::new("http://localhost:8082/")).unwrap();
        assert_eq!(client.url(&"18".into()), "http://localhost:8082/api/orders/18");
    }
}
