use {
    crate::domain::policy::UnverifiedRedirectPolicy,
    std::{env, time::Duration},
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address to listen on.
    pub listen_addr: String,

    /// Authoritative store connection string.
    pub database_url: String,

    /// Base URL the success/error/pending redirects and the gateway
    /// callback URL are built from.
    pub public_base_url: String,

    /// Payment gateway API base URL.
    pub gateway_base_url: String,

    /// Payment gateway API key.
    pub gateway_api_key: String,

    /// Bound on every outbound gateway call. A status check that exceeds
    /// this is an oracle failure, handled by the redirect policy.
    pub gateway_timeout: Duration,

    /// Shared secret expected in X-Webhook-Token. Unset means dev mode:
    /// webhooks are accepted unauthenticated.
    pub webhook_token: Option<String>,

    /// Optional URL of the secondary best-effort mirror. Unset disables
    /// mirroring entirely.
    pub mirror_url: Option<String>,

    /// What to do when payment status cannot be verified.
    pub redirect_policy: UnverifiedRedirectPolicy,

    /// How often the grant sweeper looks for paid-but-ungranted orders.
    pub sweep_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let redirect_policy = match env::var("REDIRECT_POLICY") {
            Ok(raw) => match UnverifiedRedirectPolicy::try_from(raw.as_str()) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(error = %e, "invalid REDIRECT_POLICY, using trust");
                    UnverifiedRedirectPolicy::default()
                }
            },
            Err(_) => UnverifiedRedirectPolicy::default(),
        };

        Self {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://credit_sync.db".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            gateway_base_url: env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://apitest.gateway.example".to_string()),
            gateway_api_key: env::var("GATEWAY_API_KEY").unwrap_or_default(),
            gateway_timeout: Duration::from_secs(
                env::var("GATEWAY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8),
            ),
            webhook_token: env::var("WEBHOOK_TOKEN").ok().filter(|t| !t.is_empty()),
            mirror_url: env::var("MIRROR_URL").ok().filter(|u| !u.is_empty()),
            redirect_policy,
            sweep_interval: Duration::from_secs(
                env::var("SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }
}
