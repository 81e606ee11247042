use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::id::UserId,
        infra::sqlite::ledger_repo,
    },
    axum::{
        Json,
        extract::{Path, State},
    },
    serde::Deserialize,
};

const HISTORY_LIMIT: i64 = 50;

pub async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = UserId::new(user_id)?;
    let balance = ledger_repo::get_balance(&state.pool, &user_id).await?;

    Ok(Json(serde_json::json!({
        "user_id": user_id.as_str(),
        "balance": balance,
    })))
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = UserId::new(user_id)?;
    let events = ledger_repo::history(&state.pool, &user_id, HISTORY_LIMIT).await?;

    let events: Vec<_> = events
        .into_iter()
        .map(|e| {
            serde_json::json!({
                "order_id": e.order_id,
                "delta": e.delta,
                "balance_after": e.balance_after,
                "reason": e.reason,
                "actor": e.actor,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "user_id": user_id.as_str(),
        "events": events,
    })))
}

#[derive(Debug, Deserialize)]
pub struct DeductRequest {
    user_id: String,
    amount: i64,
    #[serde(default)]
    reason: Option<String>,
}

/// Spend credits ahead of a generation request. The deduct is conditional
/// at the store layer; a shortfall comes back as 409 and no balance change.
pub async fn deduct_credits(
    State(state): State<AppState>,
    Json(req): Json<DeductRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = UserId::new(req.user_id)?;
    let reason = req.reason.as_deref().unwrap_or("generation");

    let balance =
        ledger_repo::deduct(&state.pool, &user_id, req.amount, reason, "api:deduct").await?;

    tracing::info!(user_id = %user_id, amount = req.amount, balance, reason, "credits deducted");

    Ok(Json(serde_json::json!({
        "user_id": user_id.as_str(),
        "balance": balance,
    })))
}
