use {super::error::ReconcileError, std::fmt};

/// What to do when a reconcile call cannot get a definitive answer from the
/// oracle: no verification key at all, oracle unreachable, or provider
/// status still pending.
///
/// The storefront runs `TrustAsPaid`: being redirected to a success-shaped
/// endpoint is itself taken as evidence the provider finished the flow.
/// That deliberately trades strictness for checkout UX, and it is why the
/// grant sweep exists. The other two modes are for deployments that would
/// rather make the user poll than ever over-grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnverifiedRedirectPolicy {
    #[default]
    TrustAsPaid,
    TreatAsPending,
    RequireOracle,
}

impl UnverifiedRedirectPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrustAsPaid => "trust",
            Self::TreatAsPending => "pending",
            Self::RequireOracle => "require",
        }
    }
}

impl fmt::Display for UnverifiedRedirectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for UnverifiedRedirectPolicy {
    type Error = ReconcileError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "trust" => Ok(Self::TrustAsPaid),
            "pending" => Ok(Self::TreatAsPending),
            "require" => Ok(Self::RequireOracle),
            other => Err(ReconcileError::Validation(format!(
                "unknown redirect policy: {other}"
            ))),
        }
    }
}
