use actix_web::{get, web, HttpResponse, Responder};

use crate::camera::FrameSource;
use crate::session::SessionStore;

#[get("/health")]
pub async fn health(
    sessions: web::Data<SessionStore>,
    camera: web::Data<dyn FrameSource>,
) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "sessions": sessions.len().await,
        "camera": camera.describe()
    }))
}
