use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{error::ReconcileError, id::UserId, order::NewOrder, package},
    },
    axum::{Json, extract::State},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    user_id: String,
    package_id: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    order_id: String,
    order_number: String,
    payment_url: String,
    amount_cents: i64,
    currency: String,
    credits: i64,
}

/// Session initiation: durably create the pending order, then ask the
/// gateway for a hosted payment URL. The order is written first so a
/// gateway hiccup leaves a harmless pending row, never an untracked
/// payment session.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let user_id = UserId::new(req.user_id)?;
    let package = package::find(&req.package_id).ok_or_else(|| {
        ReconcileError::Validation(format!("unknown package: {}", req.package_id))
    })?;

    let order = NewOrder::from_package(user_id, package);
    crate::infra::sqlite::order_repo::create(&state.pool, &order).await?;

    let base = &state.config.public_base_url;
    let callback_url = format!("{base}/payments/callback?order_id={}", order.id());
    let error_url = format!("{base}/payment/error?order_id={}&reason=declined", order.id());

    // Sandbox tier skips the provider entirely: the "payment URL" is our
    // own callback carrying a mock payment id.
    let (payment_url, payment_ref) = if package.is_sandbox() {
        let mock_id = format!("mock_{}", Uuid::now_v7().simple());
        (format!("{callback_url}&paymentId={mock_id}"), None)
    } else {
        let session = state
            .gateway
            .create_session(&order, &callback_url, &error_url)
            .await?;
        (session.payment_url, Some(session.invoice_id))
    };

    if let Some(invoice_id) = payment_ref {
        crate::infra::sqlite::order_repo::record_payment_ref(&state.pool, order.id(), &invoice_id)
            .await?;
    }

    tracing::info!(
        order_id = %order.id(),
        user_id = %order.user_id(),
        package = order.package_id(),
        "checkout session created"
    );

    Ok(Json(CheckoutResponse {
        order_id: order.id().as_str().to_string(),
        order_number: order.order_number().to_string(),
        payment_url,
        amount_cents: order.money().amount().cents(),
        currency: order.money().currency().to_string(),
        credits: order.credits_purchased(),
    }))
}

/// Static catalog, as the storefront renders it.
pub async fn list_packages() -> Json<serde_json::Value> {
    let packages: Vec<_> = package::all()
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id(),
                "name": p.name(),
                "amount_cents": p.price().amount().cents(),
                "currency": p.price().currency().as_str(),
                "credits": p.credits(),
                "sandbox": p.is_sandbox(),
            })
        })
        .collect();

    Json(serde_json::json!({ "packages": packages }))
}
