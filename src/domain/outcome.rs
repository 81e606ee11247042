use {super::money::Money, serde::Serialize};

/// Result of one reconcile call. Granted, AlreadyProcessed and
/// PartialFailure all surface to the user as a success experience;
/// only Failed routes to the error page.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Order marked paid and credits granted by this call.
    Granted { money: Money, credits: i64 },
    /// Order was already paid and credited. Repeat delivery, no side effects.
    AlreadyProcessed { money: Money, credits: i64 },
    /// Provider reported the payment declined or cancelled. Terminal.
    Failed,
    /// Order is durably paid but the credit grant did not land. The payment
    /// itself succeeded; the sweep retries the grant.
    PartialFailure { money: Money, credits: i64 },
    /// Undetermined under a non-trusting redirect policy. Order left
    /// pending, caller should poll again.
    Pending,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Granted { .. } => "granted",
            Self::AlreadyProcessed { .. } => "already_processed",
            Self::Failed => "failed",
            Self::PartialFailure { .. } => "partial_failure",
            Self::Pending => "pending",
        }
    }

    /// Whether the caller should route the user to a success experience.
    pub fn is_soft_success(&self) -> bool {
        matches!(
            self,
            Self::Granted { .. } | Self::AlreadyProcessed { .. } | Self::PartialFailure { .. }
        )
    }
}
