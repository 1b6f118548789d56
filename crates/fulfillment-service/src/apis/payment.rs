use super::{ApiError, ApiResult};
use crate::server::AppState;
use axum::{
	extract::{Path, State},
	http::StatusCode,
	Json,
};
use fulfillment_types::{NewPayment, Payment};

/// POST /api/payments
pub async fn record_payment(
	State(state): State<AppState>,
	Json(request): Json<NewPayment>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
	let payment = state.engine.record_payment(request).await?;
	Ok((StatusCode::CREATED, Json(payment)))
}

/// GET /api/payments/{id}
pub async fn get_payment(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> ApiResult<Payment> {
	Ok(Json(state.engine.get_payment(&id).await?))
}
