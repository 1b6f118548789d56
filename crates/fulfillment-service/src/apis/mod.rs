//! HTTP handlers for the fulfillment API.
//!
//! Handlers translate requests into engine calls and engine errors into
//! status codes with an [`ErrorResponse`] body.

pub mod order;
pub mod payment;
pub mod store;

use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use fulfillment_core::{EngineError, OrderStateError, PaymentStateError, ReconcileError};
use fulfillment_types::ErrorResponse;
use thiserror::Error;

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum ApiError {
	#[error("{0}")]
	BadRequest(String),
	#[error("Role {0} cannot be used through the API")]
	ForbiddenRole(String),
	#[error(transparent)]
	Engine(#[from] EngineError),
}

impl ApiError {
	fn status_and_code(&self) -> (StatusCode, &'static str) {
		match self {
			ApiError::BadRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_REQUEST"),
			ApiError::ForbiddenRole(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_ROLE"),
			ApiError::Engine(e) => engine_status(e),
		}
	}
}

fn engine_status(error: &EngineError) -> (StatusCode, &'static str) {
	match error {
		EngineError::UnknownStore(_) => (StatusCode::NOT_FOUND, "UNKNOWN_STORE"),
		EngineError::InvalidRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_REQUEST"),
		EngineError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
		EngineError::OrderState(e) => order_status(e),
		EngineError::PaymentState(e) => payment_status(e),
		EngineError::Reconcile(ReconcileError::OrderState(e)) => order_status(e),
		EngineError::Reconcile(ReconcileError::PaymentState(e)) => payment_status(e),
		EngineError::Reconcile(ReconcileError::Storage(_)) => {
			(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
		},
	}
}

fn order_status(error: &OrderStateError) -> (StatusCode, &'static str) {
	match error {
		OrderStateError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
		OrderStateError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
		OrderStateError::StaleState { .. } | OrderStateError::StatusChanged { .. } => {
			(StatusCode::CONFLICT, "STALE_STATE")
		},
		OrderStateError::CourierRequired(_) => (StatusCode::CONFLICT, "COURIER_REQUIRED"),
		OrderStateError::NotAssignable { .. } => (StatusCode::CONFLICT, "NOT_ASSIGNABLE"),
		OrderStateError::InvalidOrder(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_ORDER"),
		OrderStateError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
	}
}

fn payment_status(error: &PaymentStateError) -> (StatusCode, &'static str) {
	match error {
		PaymentStateError::PaymentNotFound(_) => (StatusCode::NOT_FOUND, "PAYMENT_NOT_FOUND"),
		PaymentStateError::InvalidTransition { .. } => {
			(StatusCode::CONFLICT, "INVALID_PAYMENT_TRANSITION")
		},
		PaymentStateError::DuplicatePayment(_) => (StatusCode::CONFLICT, "DUPLICATE_PAYMENT"),
		PaymentStateError::InvalidPayment(_) => {
			(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_PAYMENT")
		},
		PaymentStateError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, code) = self.status_and_code();
		if status.is_server_error() {
			tracing::error!(error = %self, "Request failed");
		} else {
			tracing::debug!(error = %self, code, "Request rejected");
		}
		let body = ErrorResponse {
			error: code.to_string(),
			message: self.to_string(),
		};
		(status, Json(body)).into_response()
	}
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
