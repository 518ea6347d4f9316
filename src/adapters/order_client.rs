use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::OrderPaymentStatus;
use crate::ports::{OrderGateway, OrderGatewayError};

/// Body of `PUT /orders/{id}/payment-status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusBody {
    pub payment_status: OrderPaymentStatus,
}

/// HTTP client for the order service's payment-status callback
#[derive(Clone)]
pub struct HttpOrderGateway {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HttpOrderGateway {
    /// Creates a new HttpOrderGateway with the specified base URL
    pub fn new(base_url: String) -> Self {
        Self::with_circuit_breaker(base_url, 3, 60)
    }

    /// Creates a new HttpOrderGateway with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        HttpOrderGateway {
            client,
            base_url,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn payment_status_url(&self, order_id: Uuid) -> String {
        format!(
            "{}/orders/{}/payment-status",
            self.base_url.trim_end_matches('/'),
            order_id
        )
    }
}

#[async_trait]
impl OrderGateway for HttpOrderGateway {
    async fn set_order_payment_status(
        &self,
        order_id: Uuid,
        status: OrderPaymentStatus,
    ) -> Result<(), OrderGatewayError> {
        let url = self.payment_status_url(order_id);
        let client = self.client.clone();
        let body = PaymentStatusBody {
            payment_status: status,
        };

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.put(&url).json(&body).send().await?;

                match response.status() {
                    StatusCode::NOT_FOUND => Err(OrderGatewayError::OrderNotFound(order_id)),
                    s if s.is_success() => Ok(()),
                    s => Err(OrderGatewayError::UnexpectedStatus(s.as_u16())),
                }
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(FailsafeError::Rejected) => Err(OrderGatewayError::CircuitBreakerOpen(
                "order service circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_url_trims_trailing_slash() {
        let gateway = HttpOrderGateway::new("http://orders.internal/".to_string());
        let id = Uuid::nil();
        assert_eq!(
            gateway.payment_status_url(id),
            format!("http://orders.internal/orders/{}/payment-status", id)
        );
    }

    #[test]
    fn test_new_gateway_starts_closed() {
        let gateway = HttpOrderGateway::new("http://orders.internal".to_string());
        assert_eq!(gateway.circuit_state(), "closed");
    }

    #[test]
    fn test_body_serializes_screaming_case() {
        let body = PaymentStatusBody {
            payment_status: OrderPaymentStatus::Paid,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "payment_status": "PAID" })
        );
    }
}
