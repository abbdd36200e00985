//! HTTP query surface over the published snapshots.
//!
//! Requests never touch the upstream feed or the tracking state; every
//! handler reads whatever the poller last published, so response time is
//! independent of feed health.

use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use crate::geo::{self, Point, ROUTE_CORRIDOR_KM};
use crate::poller::PollerHandle;
use crate::snapshot::{ConnectionStatus, Published, VehicleRecord};

#[derive(Clone)]
pub struct AppState {
    pub published: watch::Receiver<Published>,
    pub poller: PollerHandle,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/vehicles", get(vehicles))
        .route("/api/health", get(health))
        .route("/api/polling/pause", post(pause_polling))
        .route("/api/polling/resume", post(resume_polling))
        .with_state(state)
}

/// Binds `addr` and serves the API until the process exits.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct VehiclesQuery {
    /// `lat1,lng1,lat2,lng2` segment to filter against.
    corridor: Option<String>,
    /// Corridor width override in kilometers; validated in the handler.
    #[serde(rename = "radiusKm")]
    radius_km: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VehiclesResponse {
    success: bool,
    vehicles: Vec<VehicleRecord>,
    last_update: Option<DateTime<Utc>>,
    count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: ConnectionStatus,
    last_update: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct PollingResponse {
    success: bool,
    polling: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

fn bad_request(error: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            success: false,
            error,
        }),
    )
        .into_response()
}

async fn vehicles(State(state): State<AppState>, Query(query): Query<VehiclesQuery>) -> Response {
    let published = state.published.borrow().clone();
    let snapshot = &published.snapshot;

    let radius_km = match &query.radius_km {
        Some(raw) => match raw.parse::<f64>() {
            Ok(radius) => radius,
            Err(_) => return bad_request(format!("radiusKm must be a number, got {raw:?}")),
        },
        None => ROUTE_CORRIDOR_KM,
    };

    let vehicles = match &query.corridor {
        Some(raw) => {
            let (start, end) = match parse_corridor(raw) {
                Ok(segment) => segment,
                Err(error) => return bad_request(error),
            };
            geo::filter_corridor(&snapshot.vehicles, start, end, radius_km)
        }
        None => snapshot.vehicles.clone(),
    };

    let count = vehicles.len();
    Json(VehiclesResponse {
        success: true,
        vehicles,
        last_update: snapshot.last_update,
        count,
    })
    .into_response()
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let published = state.published.borrow().clone();

    Json(HealthResponse {
        status: published.connection,
        last_update: published.snapshot.last_update,
    })
}

async fn pause_polling(State(state): State<AppState>) -> Response {
    match state.poller.pause().await {
        Ok(()) => Json(PollingResponse {
            success: true,
            polling: false,
        })
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                success: false,
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

async fn resume_polling(State(state): State<AppState>) -> Response {
    match state.poller.resume().await {
        Ok(()) => Json(PollingResponse {
            success: true,
            polling: true,
        })
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                success: false,
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

/// Parses a `lat1,lng1,lat2,lng2` corridor string.
fn parse_corridor(raw: &str) -> Result<(Point, Point), String> {
    let coords = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|_| format!("corridor must be four numbers, got {raw:?}"))?;

    match coords[..] {
        [lat1, lng1, lat2, lng2] => Ok((Point::new(lat1, lng1), Point::new(lat2, lng2))),
        _ => Err(format!(
            "corridor must be lat1,lng1,lat2,lng2, got {} values",
            coords.len()
        )),
    }
}
