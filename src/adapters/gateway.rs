use {
    crate::domain::{
        error::ReconcileError,
        oracle::{OracleReport, OracleStatus, PaymentOracle, VerifyKey},
        order::NewOrder,
    },
    serde::{Deserialize, Serialize},
    std::{future::Future, pin::Pin, time::Duration},
};

/// Client for the hosted payment gateway: session initiation for checkout
/// and the status-check API the reconciliation core treats as its oracle.
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// What checkout gets back from session initiation.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub payment_url: String,
    pub invoice_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendPaymentRequest<'a> {
    customer_reference: &'a str,
    invoice_value: f64,
    display_currency_iso: String,
    call_back_url: &'a str,
    error_url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GatewayEnvelope<T> {
    is_success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendPaymentData {
    #[serde(rename = "InvoiceURL")]
    invoice_url: String,
    invoice_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StatusRequest<'a> {
    key: &'a str,
    key_type: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusData {
    #[serde(default)]
    invoice_status: Option<String>,
    #[serde(default)]
    invoice_transactions: Vec<StatusTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusTransaction {
    #[serde(default)]
    transaction_status: Option<String>,
    #[serde(default)]
    transaction_id: Option<String>,
}

impl GatewayClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReconcileError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReconcileError::Oracle(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Create a hosted payment session for a pending order and return the
    /// redirect URL plus the gateway's invoice id.
    pub async fn create_session(
        &self,
        order: &NewOrder,
        callback_url: &str,
        error_url: &str,
    ) -> Result<PaymentSession, ReconcileError> {
        let body = SendPaymentRequest {
            customer_reference: order.id().as_str(),
            invoice_value: order.money().amount().cents() as f64 / 100.0,
            display_currency_iso: order.money().currency().as_str().to_uppercase(),
            call_back_url: callback_url,
            error_url,
        };

        let resp = self
            .http
            .post(format!("{}/v2/SendPayment", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let envelope: GatewayEnvelope<SendPaymentData> = resp
            .error_for_status()
            .map_err(|e| ReconcileError::Oracle(format!("session initiation: {e}")))?
            .json()
            .await
            .map_err(|e| ReconcileError::Oracle(format!("session initiation body: {e}")))?;

        if !envelope.is_success {
            return Err(ReconcileError::Oracle(format!(
                "session initiation rejected: {}",
                envelope.message.as_deref().unwrap_or("no message")
            )));
        }

        let data = envelope.data.ok_or_else(|| {
            ReconcileError::Oracle("session initiation: success without data".into())
        })?;

        Ok(PaymentSession {
            payment_url: data.invoice_url,
            invoice_id: data.invoice_id.to_string(),
        })
    }

    async fn check_status_inner(&self, key: &VerifyKey) -> Result<OracleReport, ReconcileError> {
        let body = StatusRequest {
            key: key.value(),
            key_type: key.kind(),
        };

        let resp = self
            .http
            .post(format!("{}/v2/GetPaymentStatus", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let envelope: GatewayEnvelope<StatusData> = resp
            .error_for_status()
            .map_err(|e| ReconcileError::Oracle(format!("status check: {e}")))?
            .json()
            .await
            .map_err(|e| ReconcileError::Oracle(format!("status check body: {e}")))?;

        if !envelope.is_success {
            return Err(ReconcileError::Oracle(format!(
                "status check rejected: {}",
                envelope.message.as_deref().unwrap_or("no message")
            )));
        }

        let data = envelope
            .data
            .ok_or_else(|| ReconcileError::Oracle("status check: success without data".into()))?;

        // The transaction entry is more specific than the invoice-level
        // status when both are present.
        let transaction = data.invoice_transactions.into_iter().next();
        let raw_status = transaction
            .as_ref()
            .and_then(|t| t.transaction_status.as_deref())
            .or(data.invoice_status.as_deref())
            .unwrap_or("");

        Ok(OracleReport {
            status: normalize_status(raw_status),
            transaction_id: transaction.and_then(|t| t.transaction_id),
        })
    }
}

impl PaymentOracle for GatewayClient {
    fn check_status(
        &self,
        key: &VerifyKey,
    ) -> Pin<Box<dyn Future<Output = Result<OracleReport, ReconcileError>> + Send + '_>> {
        let key = key.clone();
        Box::pin(async move { self.check_status_inner(&key).await })
    }
}

fn map_transport_error(e: reqwest::Error) -> ReconcileError {
    if e.is_timeout() {
        ReconcileError::Oracle("gateway timed out".into())
    } else {
        ReconcileError::Oracle(format!("gateway transport: {e}"))
    }
}

/// Map the gateway's free-form status vocabulary onto the oracle tri-state.
/// Matching is by family, case-insensitive; anything unrecognized is
/// `Pending`, never a guess of success or failure.
pub fn normalize_status(raw: &str) -> OracleStatus {
    let s = raw.to_lowercase();

    if ["paid", "succ", "captur"].iter().any(|n| s.contains(n)) {
        OracleStatus::Paid
    } else if s.contains("cancel") {
        OracleStatus::Cancelled
    } else if ["fail", "declin", "reject", "expir"]
        .iter()
        .any(|n| s.contains(n))
    {
        OracleStatus::Failed
    } else {
        if !s.is_empty() && !s.contains("pend") && !s.contains("init") && !s.contains("progress") {
            tracing::warn!(status = raw, "unknown gateway status, treating as pending");
        }
        OracleStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paid_family() {
        for s in ["Paid", "PAID", "Succss", "succeeded", "Captured", "CAPTURD"] {
            assert_eq!(normalize_status(s), OracleStatus::Paid, "{s}");
        }
    }

    #[test]
    fn failed_family() {
        for s in ["Failed", "DECLINED", "Rejected", "Expired", "AuthorizationFailed"] {
            assert_eq!(normalize_status(s), OracleStatus::Failed, "{s}");
        }
    }

    #[test]
    fn cancelled_is_distinct() {
        for s in ["Canceled", "CANCELLED", "UserCanceled"] {
            assert_eq!(normalize_status(s), OracleStatus::Cancelled, "{s}");
        }
    }

    #[test]
    fn everything_else_is_pending() {
        for s in ["Pending", "InProgress", "Initiated", "", "Fnord"] {
            assert_eq!(normalize_status(s), OracleStatus::Pending, "{s}");
        }
    }
}
