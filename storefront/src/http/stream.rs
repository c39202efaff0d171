use super::AppState;
use crate::bus::StatusChanged;
use crate::error::DomainError;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use storefront_db::Order;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Serialize)]
struct StatusResponse {
    status: String,
}

async fn order_by_payment_hash(state: &AppState, payment_hash: &str) -> Result<Order, DomainError> {
    state
        .db
        .by_payment_hash(payment_hash)
        .await
        .map_err(crate::error::internal)?
        .ok_or(DomainError::NotFound)
}

async fn order_by_swap_id(state: &AppState, swap_id: &str) -> Result<Order, DomainError> {
    state
        .db
        .by_swap_id(swap_id)
        .await
        .map_err(crate::error::internal)?
        .ok_or(DomainError::NotFound)
}

pub async fn invoice_status(
    State(state): State<AppState>,
    Path(payment_hash): Path<String>,
) -> Result<Json<StatusResponse>, DomainError> {
    let order = order_by_payment_hash(&state, &payment_hash).await?;
    Ok(Json(StatusResponse { status: order.status.to_string() }))
}

pub async fn onchain_status(
    State(state): State<AppState>,
    Path(swap_id): Path<String>,
) -> Result<Json<StatusResponse>, DomainError> {
    let order = order_by_swap_id(&state, &swap_id).await?;
    Ok(Json(StatusResponse { status: order.status.to_string() }))
}

async fn sse_stream(state: &AppState, order_id: &str) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let (history, rx) = state.bus.subscribe(order_id).await;
    let replay = stream::iter(history.into_iter().map(status_event));
    let live = BroadcastStream::new(rx).filter_map(|r| async move {
        match r {
            Ok(e) => Some(status_event(e)),
            Err(_lagged) => None,
        }
    });
    replay.chain(live)
}

fn status_event(event: StatusChanged) -> Result<Event, Infallible> {
    Ok(Event::default().json_data(event).unwrap_or_else(|_| Event::default().data("{}")))
}

pub async fn invoice_stream(
    State(state): State<AppState>,
    Path(payment_hash): Path<String>,
) -> Result<impl IntoResponse, DomainError> {
    let order = order_by_payment_hash(&state, &payment_hash).await?;
    let stream = sse_stream(&state, &order.id).await;
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn onchain_stream(
    State(state): State<AppState>,
    Path(swap_id): Path<String>,
) -> Result<impl IntoResponse, DomainError> {
    let order = order_by_swap_id(&state, &swap_id).await?;
    let stream = sse_stream(&state, &order.id).await;
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
