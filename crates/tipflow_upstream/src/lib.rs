//! D. UpstreamClient.

mod client;
mod error;

pub use client::{UpstreamClient, UpstreamError, UpstreamResponse};
pub use error::{classify_status, ClassifiedError, TransportError};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tipflow_breaker::{CircuitBreaker, CircuitBreakerConfig};
    use tipflow_config::UpstreamConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            window_size: 20,
            failure_threshold: 0.5,
            recovery_threshold: 0.3,
            open_duration: std::time::Duration::from_secs(60),
        }))
    }

    fn test_config(base_url: &str) -> UpstreamConfig {
        UpstreamConfig {
            base_url: base_url.to_string(),
            media_service_url: base_url.to_string(),
            namespace: "test-ns".to_string(),
            token: "secret-token".to_string(),
            request_timeout_secs: 5,
            attachment_timeout_secs: 5,
            max_retries: 2,
            backoff_factor: 0.01,
            max_backoff_secs: 0.05,
            too_many_requests_sleep_secs: 1,
        }
    }

    #[tokio::test]
    async fn successful_get_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tips/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&test_config(&server.uri()), test_breaker()).unwrap();
        let response = client.get_json("/tips/1", "TIP-1").await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "{\"ok\":true}");
        assert_eq!(response.attempts, 1);
    }

    #[tokio::test]
    async fn server_error_is_returned_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tips/1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&test_config(&server.uri()), test_breaker()).unwrap();
        let response = client.get_json("/tips/1", "TIP-1").await.unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(response.attempts, 1);
        assert!(matches!(
            classify_status(response.status, &response.body),
            Some(ClassifiedError::ServerError { .. })
        ));
    }

    #[tokio::test]
    async fn open_circuit_denies_before_any_request() {
        let breaker = test_breaker();
        for _ in 0..11 {
            breaker.record_failure();
        }
        for _ in 0..9 {
            breaker.record_success();
        }

        let client = UpstreamClient::new(&test_config("http://127.0.0.1:0"), breaker).unwrap();
        let err = client.get_json("/tips/1", "TIP-1").await.unwrap_err();
        assert!(matches!(err, UpstreamError::CircuitOpen));
    }
}
