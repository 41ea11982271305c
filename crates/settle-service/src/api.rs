//! HTTP API over the settlement engine.
//!
//! Authentication is an upstream concern; handlers trust the resolved
//! actor identity in the `x-actor-role` / `x-actor-ref` headers and pass
//! it to the engine, which enforces per-transition authorization.

use axum::{
	extract::{Path, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Json, Response},
	routing::{get, post, put},
	Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use settle_core::{CreateOrderRequest, SettlementEngine};
use settle_ledger::{BalanceProvider, InMemoryBalances};
use settle_types::{Actor, OrderId, Role, SettleError};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<SettlementEngine>,
	/// Only present when the service runs on the in-memory balance
	/// provider; enables the dev-only deposit endpoint.
	pub balances: Option<Arc<InMemoryBalances>>,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/orders", post(create_order))
		.route("/orders/{id}", get(get_order))
		.route("/orders/{id}/complete", post(complete_order))
		.route("/orders/{id}/fail", post(fail_order))
		.route("/orders/{id}/reopen", post(reopen_order))
		.route("/orders/{id}/refund", post(refund_order))
		.route("/vendors/{vendor_ref}/accrual", get(vendor_accrual))
		.route("/vendors/{vendor_ref}/orders", get(vendor_orders))
		.route("/buyers/{buyer_ref}/orders", get(buyer_orders))
		.route("/policy/fee", put(update_fee))
		.route("/accounts/{account_ref}/deposit", post(deposit))
		.with_state(state)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
	let app = router(state);
	let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
	info!("API server listening on port {}", port);
	axum::serve(listener, app).await?;
	Ok(())
}

/// Error wrapper mapping the engine taxonomy onto HTTP status codes.
#[derive(Debug)]
enum ApiError {
	Engine(SettleError),
	BadRequest(String),
	Forbidden(String),
}

impl From<SettleError> for ApiError {
	fn from(err: SettleError) -> Self {
		Self::Engine(err)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, message) = match self {
			ApiError::Engine(err) => {
				let status = match &err {
					SettleError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
					SettleError::Permission { .. } => StatusCode::FORBIDDEN,
					SettleError::InvalidTransition { .. } => StatusCode::CONFLICT,
					SettleError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
					SettleError::RateUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
					SettleError::OrderNotFound { .. } => StatusCode::NOT_FOUND,
					SettleError::Mirror { .. } => StatusCode::INTERNAL_SERVER_ERROR,
				};
				(status, err.to_string())
			}
			ApiError::BadRequest(reason) => (StatusCode::UNPROCESSABLE_ENTITY, reason),
			ApiError::Forbidden(reason) => (StatusCode::FORBIDDEN, reason),
		};
		let body = Json(serde_json::json!({ "error": message }));
		(status, body).into_response()
	}
}

fn bad_request(reason: impl Into<String>) -> ApiError {
	ApiError::BadRequest(reason.into())
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
	let role = headers
		.get("x-actor-role")
		.and_then(|v| v.to_str().ok())
		.ok_or_else(|| bad_request("missing x-actor-role header"))?;
	let actor_ref = headers
		.get("x-actor-ref")
		.and_then(|v| v.to_str().ok())
		.ok_or_else(|| bad_request("missing x-actor-ref header"))?;

	let role = match role {
		"buyer" => Role::Buyer,
		"vendor" => Role::Vendor,
		"admin" => Role::Admin,
		other => return Err(bad_request(format!("unknown actor role: {}", other))),
	};

	Ok(Actor {
		role,
		actor_ref: actor_ref.to_string(),
	})
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
	Uuid::parse_str(id)
		.map(OrderId)
		.map_err(|_| bad_request(format!("invalid order id: {}", id)))
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn create_order(
	State(state): State<AppState>,
	Json(request): Json<CreateOrderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let order = state.engine.create_order(request).await?;
	Ok(Json(serde_json::json!(order)))
}

async fn get_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let order_id = parse_order_id(&id)?;
	let view = state.engine.get_order(&order_id).await?;
	Ok(Json(serde_json::json!(view)))
}

async fn complete_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
	let order_id = parse_order_id(&id)?;
	let actor = actor_from_headers(&headers)?;
	let order = state.engine.complete_order(&order_id, &actor).await?;
	Ok(Json(serde_json::json!(order)))
}

#[derive(Deserialize)]
struct FailRequest {
	reason: String,
}

async fn fail_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
	Json(request): Json<FailRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let order_id = parse_order_id(&id)?;
	let actor = actor_from_headers(&headers)?;
	let order = state
		.engine
		.fail_order(&order_id, &actor, &request.reason)
		.await?;
	Ok(Json(serde_json::json!(order)))
}

async fn reopen_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
	let order_id = parse_order_id(&id)?;
	let actor = actor_from_headers(&headers)?;
	let order = state.engine.reopen_order(&order_id, &actor).await?;
	Ok(Json(serde_json::json!(order)))
}

async fn refund_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
	let order_id = parse_order_id(&id)?;
	let actor = actor_from_headers(&headers)?;
	let order = state.engine.refund_order(&order_id, &actor).await?;
	Ok(Json(serde_json::json!(order)))
}

async fn vendor_accrual(
	State(state): State<AppState>,
	Path(vendor_ref): Path<String>,
) -> Json<serde_json::Value> {
	let accrual = state.engine.vendor_accrual(&vendor_ref);
	Json(serde_json::json!({
		"vendor_ref": vendor_ref,
		"total_completed_orders": accrual.total_completed_orders,
		"total_vendor_amount": accrual.total_vendor_amount,
	}))
}

async fn vendor_orders(
	State(state): State<AppState>,
	Path(vendor_ref): Path<String>,
) -> Json<serde_json::Value> {
	Json(serde_json::json!(state.engine.orders_for_vendor(&vendor_ref)))
}

async fn buyer_orders(
	State(state): State<AppState>,
	Path(buyer_ref): Path<String>,
) -> Json<serde_json::Value> {
	Json(serde_json::json!(state.engine.orders_for_buyer(&buyer_ref)))
}

#[derive(Deserialize)]
struct FeeUpdateRequest {
	fee_bps: u32,
}

async fn update_fee(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<FeeUpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let actor = actor_from_headers(&headers)?;
	if actor.role != Role::Admin {
		return Err(ApiError::Forbidden(
			"fee updates require the admin role".to_string(),
		));
	}

	state.engine.set_fee_bps(request.fee_bps).await?;
	Ok(Json(serde_json::json!({ "fee_bps": request.fee_bps })))
}

#[derive(Deserialize)]
struct DepositRequest {
	amount: Decimal,
}

/// Dev-only: credit an account on the in-memory balance provider.
async fn deposit(
	State(state): State<AppState>,
	Path(account_ref): Path<String>,
	headers: HeaderMap,
	Json(request): Json<DepositRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let actor = actor_from_headers(&headers)?;
	if actor.role != Role::Admin {
		return Err(ApiError::Forbidden(
			"deposits require the admin role".to_string(),
		));
	}

	let balances = state
		.balances
		.as_ref()
		.ok_or_else(|| bad_request("deposits are only available on the in-memory provider"))?;
	balances.deposit(&account_ref, request.amount).await;
	let balance = balances.balance(&account_ref).await;
	Ok(Json(serde_json::json!({
		"account_ref": account_ref,
		"balance": balance,
	})))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn actor_header_parsing() {
		let mut headers = HeaderMap::new();
		headers.insert("x-actor-role", "buyer".parse().unwrap());
		headers.insert("x-actor-ref", "buyer-1".parse().unwrap());

		let actor = actor_from_headers(&headers).unwrap();
		assert_eq!(actor.role, Role::Buyer);
		assert_eq!(actor.actor_ref, "buyer-1");

		headers.insert("x-actor-role", "superuser".parse().unwrap());
		assert!(actor_from_headers(&headers).is_err());
	}

	#[test]
	fn invalid_order_id_is_a_validation_error() {
		assert!(parse_order_id("not-a-uuid").is_err());
		assert!(parse_order_id("4a9b1f60-7c8e-4b61-9a3d-111111111111").is_ok());
	}
}
