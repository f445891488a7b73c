/// Open pixel and click redirect endpoints
///
/// Recipients' mail clients hit these. A failed lookup never breaks the pixel, it only
/// goes unrecorded; the click redirect only follows links of messages we sent.

use crate::api::{reject, AppState};
use crate::store::EventKind;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use reqwest::Url;
use serde::Deserialize;

/// Transparent 1x1 GIF
static PIXEL_GIF: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

#[derive(Debug, Deserialize)]
pub struct ClickQuery {
    pub url: Option<String>,
}

pub fn create_tracking_routes() -> Router<AppState> {
    Router::new()
        .route("/track/open/{tracking_id}", get(track_open))
        .route("/track/click/{tracking_id}", get(track_click))
}

/// GET /track/open/:tracking_id
async fn track_open(State(state): State<AppState>, Path(tracking_id): Path<String>) -> Response {
    if let Err(e) = state.events.process_tracking(EventKind::Open, &tracking_id).await {
        tracing::debug!("Open pixel not recorded for {}: {}", tracking_id, e);
    }

    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, max-age=0"),
        ],
        PIXEL_GIF.as_slice(),
    )
        .into_response()
}

/// GET /track/click/:tracking_id?url=...
async fn track_click(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
    Query(query): Query<ClickQuery>,
) -> Result<Redirect, StatusCode> {
    let target = match query.url.as_deref().map(Url::parse) {
        Some(Ok(url)) if matches!(url.scheme(), "http" | "https") => url,
        _ => {
            tracing::warn!("⚠️ Click redirect without a usable target: {}", tracking_id);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    state
        .events
        .process_tracking(EventKind::Click, &tracking_id)
        .await
        .map_err(|e| reject("Click tracking", e))?;

    Ok(Redirect::temporary(target.as_str()))
}
