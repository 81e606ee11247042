use {
    super::error::ReconcileError,
    serde::{Deserialize, Serialize},
    std::{fmt, future::Future, pin::Pin},
};

/// Key the oracle is queried with. The gateway exposes two lookup routes
/// and they are not interchangeable on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyKey {
    PaymentId(String),
    InvoiceId(String),
}

impl VerifyKey {
    pub fn value(&self) -> &str {
        match self {
            Self::PaymentId(id) | Self::InvoiceId(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PaymentId(_) => "PaymentId",
            Self::InvoiceId(_) => "InvoiceId",
        }
    }
}

impl fmt::Display for VerifyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

/// Normalized provider status. `Cancelled` is kept distinct at this layer;
/// the reconciliation core collapses it into a failed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleStatus {
    Paid,
    Pending,
    Failed,
    Cancelled,
}

impl OracleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OracleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the core gets back from a status check.
#[derive(Debug, Clone)]
pub struct OracleReport {
    pub status: OracleStatus,
    pub transaction_id: Option<String>,
}

/// The provider's status-check API. Untrusted input: callers must treat
/// errors and `Pending` as "undetermined", never as success or failure.
pub trait PaymentOracle: Send + Sync {
    fn check_status(
        &self,
        key: &VerifyKey,
    ) -> Pin<Box<dyn Future<Output = Result<OracleReport, ReconcileError>> + Send + '_>>;
}
