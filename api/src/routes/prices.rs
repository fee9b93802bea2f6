use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use domain::{normalize_symbol, PriceQuote};
use tokio::time::timeout;

use crate::{error::ApiError, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/prices/:symbol", get(get_price))
}

async fn get_price(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<PriceQuote>, ApiError> {
    let symbol = normalize_symbol(&symbol).ok_or(alert_engine::AlertError::InvalidSymbol)?;
    let limit = state.config.price_fetch_timeout;
    let price = match timeout(limit, state.prices.fetch(&symbol)).await {
        Ok(Ok(price)) => price,
        Ok(Err(err)) => {
            return Err(ApiError::PriceUnavailable {
                symbol,
                reason: format!("{err:#}"),
            })
        }
        Err(_) => {
            return Err(ApiError::PriceUnavailable {
                symbol,
                reason: format!("timed out after {limit:?}"),
            })
        }
    };
    Ok(Json(PriceQuote {
        symbol,
        price,
        fetched_at: Utc::now(),
    }))
}
