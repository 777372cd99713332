use actix_web::{delete, get, post, web, HttpResponse};
use tracing::info;

use crate::camera::FrameSource;
use crate::errors::{AppError, SessionError};
use crate::session::{PhotoSession, SessionStore};

fn added(session: &PhotoSession, index: usize) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "index": index,
        "session": session.summary()
    }))
}

fn require_body(body: &web::Bytes) -> Result<(), AppError> {
    if body.is_empty() {
        return Err(SessionError::InvalidRequest("empty image upload".to_string()).into());
    }
    Ok(())
}

/// Raw image from an upload dialog; cover-fit into a tile.
#[post("/session/{id}/photos/upload")]
pub async fn upload_photo(
    path: web::Path<String>,
    body: web::Bytes,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, AppError> {
    require_body(&body)?;
    let session = sessions.get(&path.into_inner()).await?;
    let mut session = session.lock().await;

    let uploaded = body.len();
    let index = session.add_upload(body).await?;
    info!("Uploaded photo {} ({} bytes)", index, uploaded);
    Ok(added(&session, index))
}

/// Raster already cropped by the client to the tile aspect; stored as PNG.
#[post("/session/{id}/photos/cropped")]
pub async fn add_cropped_photo(
    path: web::Path<String>,
    body: web::Bytes,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, AppError> {
    require_body(&body)?;
    let session = sessions.get(&path.into_inner()).await?;
    let mut session = session.lock().await;

    let index = session.add_cropped(body).await?;
    info!("Added cropped photo {}", index);
    Ok(added(&session, index))
}

#[post("/session/{id}/photos/capture")]
pub async fn capture_photo(
    path: web::Path<String>,
    sessions: web::Data<SessionStore>,
    camera: web::Data<dyn FrameSource>,
) -> Result<HttpResponse, AppError> {
    let session = sessions.get(&path.into_inner()).await?;
    let mut session = session.lock().await;

    // Don't fire the camera for a photo that would be rejected
    session.ensure_room()?;
    let frame = camera.capture_still().await?;
    let index = session.add_capture(frame).await?;
    info!("Captured photo {} from {}", index, camera.describe());
    Ok(added(&session, index))
}

#[get("/session/{id}/photos/{index}")]
pub async fn get_photo(
    path: web::Path<(String, usize)>,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, AppError> {
    let (id, index) = path.into_inner();
    let session = sessions.get(&id).await?;
    let session = session.lock().await;
    let tile = session.photo(index)?;

    Ok(HttpResponse::Ok()
        .content_type("image/png")
        .body(tile.data().clone()))
}

#[delete("/session/{id}/photos/{index}")]
pub async fn delete_photo(
    path: web::Path<(String, usize)>,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, AppError> {
    let (id, index) = path.into_inner();
    let session = sessions.get(&id).await?;
    let mut session = session.lock().await;
    session.remove_photo(index)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "removed": index,
        "session": session.summary()
    })))
}
