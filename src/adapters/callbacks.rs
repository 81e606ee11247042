use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{error::ReconcileError, id::OrderId, order::PaymentEvidence, outcome::Outcome},
    },
    axum::{
        Json,
        extract::{Query, State},
        http::HeaderMap,
        response::Redirect,
    },
    serde::Deserialize,
};

/// Query string the gateway appends when it redirects the user back.
/// `paymentId`/`Id` are the provider's names; both are frequently missing.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    order_id: Option<String>,
    #[serde(rename = "paymentId")]
    payment_id: Option<String>,
    #[serde(rename = "Id")]
    invoice_id: Option<String>,
}

/// Synchronous GET redirect from the provider. Always answers with a
/// redirect: soft successes (including a grant that still needs the sweep)
/// land on the success page, only a genuine decline or an unknown order
/// lands on the error page.
pub async fn gateway_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let base = state.config.public_base_url.clone();

    let Some(order_id) = params.order_id else {
        tracing::warn!("gateway callback without order_id");
        return error_redirect(&base, None, "missing_order");
    };

    let order_id = match OrderId::new(order_id) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "gateway callback with malformed order_id");
            return error_redirect(&base, None, "missing_order");
        }
    };

    let evidence = PaymentEvidence {
        payment_id: params.payment_id,
        invoice_id: params.invoice_id,
    };

    match state
        .reconciler
        .reconcile(&order_id, &evidence, "callback:gateway")
        .await
    {
        Ok(outcome) => outcome_redirect(&base, &order_id, &outcome),
        Err(ReconcileError::OrderNotFound(_)) => {
            error_redirect(&base, Some(&order_id), "not_found")
        }
        Err(e) => {
            tracing::error!(order_id = %order_id, error = %e, "callback reconcile error");
            error_redirect(&base, Some(&order_id), "retry")
        }
    }
}

fn outcome_redirect(base: &str, order_id: &OrderId, outcome: &Outcome) -> Redirect {
    match outcome {
        Outcome::Granted { money, credits }
        | Outcome::AlreadyProcessed { money, credits }
        | Outcome::PartialFailure { money, credits } => {
            let cents = money.amount().cents();
            Redirect::to(&format!(
                "{base}/payment/success?order_id={order_id}&amount={}.{:02}&currency={}&credits={credits}",
                cents / 100,
                cents % 100,
                money.currency(),
            ))
        }
        Outcome::Pending => Redirect::to(&format!(
            "{base}/payment/pending?order_id={order_id}"
        )),
        Outcome::Failed => error_redirect(base, Some(order_id), "declined"),
    }
}

fn error_redirect(base: &str, order_id: Option<&OrderId>, reason: &str) -> Redirect {
    match order_id {
        Some(id) => Redirect::to(&format!("{base}/payment/error?order_id={id}&reason={reason}")),
        None => Redirect::to(&format!("{base}/payment/error?reason={reason}")),
    }
}

/// Asynchronous POST notification from the provider. Field names are the
/// provider's. The payload's claimed status is logged but not trusted; the
/// core re-derives the outcome through the oracle.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GatewayWebhook {
    #[serde(default)]
    customer_reference: Option<String>,
    #[serde(default)]
    invoice_id: Option<serde_json::Value>,
    #[serde(default)]
    payment_id: Option<String>,
    #[serde(default)]
    transaction_status: Option<String>,
}

#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(order_id = tracing::field::Empty, claimed_status = tracing::field::Empty)
)]
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GatewayWebhook>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize_webhook(&state, &headers)?;

    let order_id = payload
        .customer_reference
        .as_deref()
        .ok_or_else(|| ReconcileError::Validation("webhook without CustomerReference".into()))?;
    let order_id = OrderId::new(order_id)?;

    tracing::Span::current()
        .record("order_id", tracing::field::display(&order_id))
        .record(
            "claimed_status",
            payload.transaction_status.as_deref().unwrap_or("none"),
        );

    let evidence = PaymentEvidence {
        payment_id: payload.payment_id,
        invoice_id: payload.invoice_id.as_ref().and_then(json_id_to_string),
    };

    let outcome = state
        .reconciler
        .reconcile(&order_id, &evidence, "webhook:gateway")
        .await?;

    tracing::info!(outcome = outcome.label(), "webhook reconciled");
    Ok(Json(serde_json::json!({ "status": outcome.label() })))
}

/// Client-initiated poll after the redirect. Same semantics as the other
/// adapters, synchronous JSON instead of a redirect.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    order_id: String,
    #[serde(default)]
    payment_id: Option<String>,
    #[serde(default)]
    invoice_id: Option<String>,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<Outcome>, ApiError> {
    let order_id = OrderId::new(req.order_id)?;
    let evidence = PaymentEvidence {
        payment_id: req.payment_id,
        invoice_id: req.invoice_id,
    };

    let outcome = state
        .reconciler
        .reconcile(&order_id, &evidence, "client:verify")
        .await?;

    Ok(Json(outcome))
}

fn authorize_webhook(state: &AppState, headers: &HeaderMap) -> Result<(), ReconcileError> {
    let Some(expected) = &state.config.webhook_token else {
        // No token configured: dev mode, accept everything.
        return Ok(());
    };

    let presented = headers
        .get("X-Webhook-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ReconcileError::WebhookAuth("missing X-Webhook-Token header".into()))?;

    if presented != expected {
        return Err(ReconcileError::WebhookAuth("token mismatch".into()));
    }
    Ok(())
}

// InvoiceId arrives as a JSON number in webhook payloads and as a string in
// some sandbox deliveries.
fn json_id_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
