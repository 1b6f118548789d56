//! Order endpoints: checkout intake, lifecycle transitions, courier assignment
//! and deadline reports.

use super::{ApiError, ApiResult};
use crate::server::AppState;
use axum::{
	extract::{Path, State},
	http::StatusCode,
	Json,
};
use fulfillment_types::{
	AssignCourierRequest, NewOrder, Order, Payment, Role, SlaReport, TransitionRequest,
};

/// POST /api/orders
pub async fn place_order(
	State(state): State<AppState>,
	Json(request): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
	let order = state.engine.place_order(request).await?;
	Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/orders/{id}
pub async fn get_order(Path(id): Path<String>, State(state): State<AppState>) -> ApiResult<Order> {
	Ok(Json(state.engine.get_order(&id).await?))
}

/// POST /api/orders/{id}/transition
///
/// The system role is reserved for engine-initiated cascades and is refused
/// here.
pub async fn transition_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<TransitionRequest>,
) -> ApiResult<Order> {
	if request.role == Role::System {
		return Err(ApiError::ForbiddenRole(request.role.to_string()));
	}
	let order = state
		.engine
		.transition_order(
			&id,
			request.from,
			request.target,
			request.role,
			request.expected_version,
		)
		.await?;
	Ok(Json(order))
}

/// POST /api/orders/{id}/courier
pub async fn assign_courier(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<AssignCourierRequest>,
) -> ApiResult<Order> {
	let order = state
		.engine
		.assign_courier(&id, &request.courier_id, request.distance_km)
		.await?;
	Ok(Json(order))
}

/// GET /api/orders/{id}/sla
pub async fn get_order_sla(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> ApiResult<SlaReport> {
	let now = state.engine.now();
	Ok(Json(state.engine.get_order_sla(&id, now).await?))
}

/// GET /api/orders/{id}/payment
pub async fn get_order_payment(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> ApiResult<Payment> {
	Ok(Json(state.engine.get_order_payment(&id).await?))
}
