use actix_web::{get, web, HttpResponse};
use chrono::{Duration, Utc};

use super::types::{CallbackQuery, DEFAULT_DAYS};
use crate::{
    errors::{AppError, AppResult},
    models::callback::Callback,
    RqDbPool,
};

/// Every callback logged in the last `days` days, newest first.
#[get("")]
pub async fn recent_callbacks(
    pool: RqDbPool,
    query: web::Query<CallbackQuery>,
) -> AppResult<HttpResponse> {
    let days = query.days.unwrap_or(DEFAULT_DAYS);
    if !(0..=365).contains(&days) {
        return Err(AppError::invalid_input("days", "Must be between 0 and 365"));
    }
    let since = (Utc::now() - Duration::days(days)).timestamp();

    let mut conn = pool.get().map_err(|_| AppError::ConnectionPoolError)?;
    let callbacks = Callback::get_since(&mut conn, since)?;
    Ok(HttpResponse::Ok().json(callbacks))
}
