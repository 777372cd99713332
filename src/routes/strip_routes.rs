use actix_web::{get, http::header, web, HttpResponse};
use chrono::{Local, Utc};
use tracing::info;

use crate::compositor::{download_file_name, footer_date, StripCompositor};
use crate::config::Config;
use crate::errors::AppError;
use crate::session::SessionStore;

/// Composite the session's photos and encode the strip as PNG.
///
/// The session stays locked until the strip is composited, so its photos
/// cannot change mid-composite and a second request waits its turn. PNG
/// encoding happens after the lock is released.
async fn render_strip(
    id: &str,
    sessions: &SessionStore,
    compositor: &StripCompositor,
    config: &Config,
) -> Result<web::Bytes, AppError> {
    let shared = sessions.get(id).await?;
    let session = shared.lock().await;

    let footer = footer_date(Local::now().date_naive());
    let strip = session
        .compose(compositor, &config.strip.title_text, &footer)
        .await?;
    drop(session);

    info!(
        "Rendered strip for session {} ({}x{})",
        id,
        strip.image().width(),
        strip.image().height()
    );
    Ok(strip.into_png().await?)
}

#[get("/session/{id}/strip/preview")]
pub async fn preview_strip(
    path: web::Path<String>,
    sessions: web::Data<SessionStore>,
    compositor: web::Data<StripCompositor>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let png = render_strip(&path.into_inner(), &sessions, &compositor, &config).await?;

    Ok(HttpResponse::Ok()
        .content_type("image/png")
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .body(png))
}

#[get("/session/{id}/strip/download")]
pub async fn download_strip(
    path: web::Path<String>,
    sessions: web::Data<SessionStore>,
    compositor: web::Data<StripCompositor>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let png = render_strip(&path.into_inner(), &sessions, &compositor, &config).await?;
    let file_name = download_file_name(&config.strip.product_name, Utc::now().timestamp_millis());

    Ok(HttpResponse::Ok()
        .content_type("image/png")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        ))
        .body(png))
}
