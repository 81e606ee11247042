use {
    super::error::ReconcileError,
    super::id::{OrderId, UserId},
    super::money::Money,
    super::oracle::VerifyKey,
    super::package::Package,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    /// Paid and Failed are both terminal. An order that reached Failed is
    /// never resurrected, even by a later call with stronger evidence.
    pub fn can_transition_to(&self, new: &OrderStatus) -> bool {
        matches!(
            (self, new),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Pending, OrderStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = ReconcileError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(ReconcileError::Validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

/// Payment identifiers an adapter managed to extract from its entry point.
/// Both absent is legal: the provider redirected the user back with nothing
/// attached. What that means is the redirect policy's call, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentEvidence {
    pub payment_id: Option<String>,
    pub invoice_id: Option<String>,
}

impl PaymentEvidence {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn payment(id: impl Into<String>) -> Self {
        Self {
            payment_id: Some(id.into()),
            invoice_id: None,
        }
    }

    pub fn invoice(id: impl Into<String>) -> Self {
        Self {
            payment_id: None,
            invoice_id: Some(id.into()),
        }
    }

    /// Sandbox bypass: the gateway's test package flow hands back a
    /// `mock_` payment id that never existed on the provider side.
    pub fn is_mock(&self) -> bool {
        self.payment_id
            .as_deref()
            .is_some_and(|id| id.starts_with("mock_"))
    }

    /// Strongest available verification key, explicit evidence first.
    pub fn verify_key(&self) -> Option<VerifyKey> {
        if let Some(id) = &self.payment_id {
            return Some(VerifyKey::PaymentId(id.clone()));
        }
        self.invoice_id.as_ref().map(|id| VerifyKey::InvoiceId(id.clone()))
    }
}

/// Full order record from the store.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    id: OrderId,
    order_number: String,
    user_id: UserId,
    package_id: String,
    money: Money,
    credits_purchased: i64,
    status: OrderStatus,
    payment_ref: Option<String>,
    transaction_id: Option<String>,
    credits_added: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OrderParams {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub package_id: String,
    pub money: Money,
    pub credits_purchased: i64,
    pub status: OrderStatus,
    pub payment_ref: Option<String>,
    pub transaction_id: Option<String>,
    pub credits_added: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(rec: OrderParams) -> Self {
        Self {
            id: rec.id,
            order_number: rec.order_number,
            user_id: rec.user_id,
            package_id: rec.package_id,
            money: rec.money,
            credits_purchased: rec.credits_purchased,
            status: rec.status,
            payment_ref: rec.payment_ref,
            transaction_id: rec.transaction_id,
            credits_added: rec.credits_added,
            created_at: rec.created_at,
            updated_at: rec.updated_at,
        }
    }

    pub fn id(&self) -> &OrderId {
        &self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    pub fn money(&self) -> Money {
        self.money
    }

    pub fn credits_purchased(&self) -> i64 {
        self.credits_purchased
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_ref(&self) -> Option<&str> {
        self.payment_ref.as_deref()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn credits_added(&self) -> bool {
        self.credits_added
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Verification key recorded at creation or first callback, used when
    /// the adapter brought no evidence of its own. Gateway invoice ids are
    /// numeric on the wire; payment ids are not.
    pub fn stored_key(&self) -> Option<VerifyKey> {
        self.payment_ref.as_ref().map(|id| {
            if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
                VerifyKey::InvoiceId(id.clone())
            } else {
                VerifyKey::PaymentId(id.clone())
            }
        })
    }
}

/// Insert shape; id and order number are generated here, not by the store.
#[derive(Debug, Clone)]
pub struct NewOrder {
    id: OrderId,
    order_number: String,
    user_id: UserId,
    package_id: String,
    money: Money,
    credits_purchased: i64,
    payment_ref: Option<String>,
}

impl NewOrder {
    /// Price and credit grant come from the catalog entry only. The caller
    /// picks a package; it never supplies amounts.
    pub fn from_package(user_id: UserId, package: &Package) -> Self {
        let id = OrderId::generate();
        let order_number = generate_order_number();
        Self {
            id,
            order_number,
            user_id,
            package_id: package.id().to_string(),
            money: package.price(),
            credits_purchased: package.credits(),
            payment_ref: None,
        }
    }

    pub fn with_payment_ref(mut self, payment_ref: impl Into<String>) -> Self {
        self.payment_ref = Some(payment_ref.into());
        self
    }

    pub fn id(&self) -> &OrderId {
        &self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    pub fn money(&self) -> Money {
        self.money
    }

    pub fn credits_purchased(&self) -> i64 {
        self.credits_purchased
    }

    pub fn payment_ref(&self) -> Option<&str> {
        self.payment_ref.as_deref()
    }
}

fn generate_order_number() -> String {
    // Informational only; uniqueness is enforced by the store.
    let raw = Uuid::now_v7().simple().to_string();
    format!("TLW-{}", &raw[..12].to_uppercase())
}
