use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    adapters::http::{app_state::AppState, auth::current_user},
    app_error::AppResult,
    use_cases::{seats::SeatPurchaseInput, subscription::PlanChangeRequest},
};

#[derive(Deserialize)]
struct ChangeSeatsPayload {
    quantity: i32,
}

#[derive(Deserialize)]
struct PreviewQuery {
    seats: i32,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/billing", get(billing_overview))
        .route("/{id}/seats", post(change_seats))
        .route("/{id}/seats/preview", get(preview_seats))
        .route("/{id}/seats/purchase", post(purchase_seats))
        .route("/{id}/plan", post(change_plan))
        .route("/{id}/cancel", post(cancel_subscription))
}

/// POST /api/cabinets/{id}/seats
async fn change_seats(
    State(app_state): State<AppState>,
    Path(cabinet_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ChangeSeatsPayload>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;
    let result = app_state
        .seat_use_cases
        .change_seats(cabinet_id, user_id, payload.quantity)
        .await?;
    Ok(Json(result))
}

/// GET /api/cabinets/{id}/seats/preview?seats=N
async fn preview_seats(
    State(app_state): State<AppState>,
    Path(cabinet_id): Path<Uuid>,
    Query(query): Query<PreviewQuery>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;
    let estimate = app_state
        .seat_use_cases
        .preview(cabinet_id, user_id, query.seats)
        .await?;
    Ok(Json(estimate))
}

/// POST /api/cabinets/{id}/seats/purchase
async fn purchase_seats(
    State(app_state): State<AppState>,
    Path(cabinet_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<SeatPurchaseInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;
    let session = app_state
        .seat_use_cases
        .purchase_seats(cabinet_id, user_id, payload)
        .await?;
    Ok(Json(session))
}

/// POST /api/cabinets/{id}/plan
async fn change_plan(
    State(app_state): State<AppState>,
    Path(cabinet_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<PlanChangeRequest>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;
    let result = app_state
        .subscription_use_cases
        .change_plan(cabinet_id, user_id, payload)
        .await?;
    Ok(Json(json!({ "success": true, "plan": result })))
}

/// POST /api/cabinets/{id}/cancel
async fn cancel_subscription(
    State(app_state): State<AppState>,
    Path(cabinet_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;
    let cancellation = app_state
        .subscription_use_cases
        .cancel(cabinet_id, user_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Votre abonnement sera annulé à la fin de la période en cours",
        "cancelAt": cancellation.cancel_at,
    })))
}

/// GET /api/cabinets/{id}/billing
async fn billing_overview(
    State(app_state): State<AppState>,
    Path(cabinet_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;
    let overview = app_state
        .cabinet_use_cases
        .billing_overview(cabinet_id, user_id)
        .await?;
    Ok(Json(overview))
}
