use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;
use tracing::info;

use crate::background::{parse_hex_color, Background, BackgroundPreset, GradientStop};
use crate::errors::{AppError, SessionError};
use crate::session::SessionStore;
use crate::templates::TemplateKind;

#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    pub template: String,
    #[serde(default)]
    pub confirm_reset: bool,
}

#[derive(Debug, Deserialize)]
pub struct StopRequest {
    pub offset: f32,
    pub color: String,
}

/// Exactly one of the fields selects the new background.
#[derive(Debug, Deserialize)]
pub struct BackgroundRequest {
    pub preset: Option<BackgroundPreset>,
    pub color: Option<String>,
    pub stops: Option<Vec<StopRequest>>,
}

impl BackgroundRequest {
    fn into_background(self) -> Result<Background, AppError> {
        match (self.preset, self.color, self.stops) {
            (Some(preset), None, None) => Ok(preset.background()),
            (None, Some(color), None) => Ok(Background::solid(&color)?),
            (None, None, Some(stops)) => {
                let stops = stops
                    .into_iter()
                    .map(|s| parse_hex_color(&s.color).map(|c| GradientStop::new(s.offset, c)))
                    .collect::<Result<Vec<GradientStop>, _>>()?;
                Ok(Background::gradient(stops)?)
            }
            _ => Err(SessionError::InvalidRequest(
                "expected exactly one of preset, color or stops".to_string(),
            )
            .into()),
        }
    }
}

#[post("/session")]
pub async fn create_session(sessions: web::Data<SessionStore>) -> HttpResponse {
    let session = sessions.create().await;
    let summary = session.lock().await.summary();

    HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "session_id": summary.id,
        "session": summary
    }))
}

#[get("/session/{id}")]
pub async fn get_session(
    path: web::Path<String>,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, AppError> {
    let session = sessions.get(&path.into_inner()).await?;
    let summary = session.lock().await.summary();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "session": summary
    })))
}

#[delete("/session/{id}")]
pub async fn delete_session(
    path: web::Path<String>,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    sessions.remove(&id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "deleted": id
    })))
}

#[post("/session/{id}/template")]
pub async fn set_template(
    path: web::Path<String>,
    body: web::Json<TemplateRequest>,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, AppError> {
    let template: TemplateKind = body.template.parse()?;
    let session = sessions.get(&path.into_inner()).await?;
    let mut session = session.lock().await;

    let capacity = session.set_template(template, body.confirm_reset)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "capacity": capacity,
        "session": session.summary()
    })))
}

#[post("/session/{id}/reset")]
pub async fn reset_session(
    path: web::Path<String>,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, AppError> {
    let session = sessions.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    session.reset();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "session": session.summary()
    })))
}

#[post("/session/{id}/facing")]
pub async fn toggle_facing(
    path: web::Path<String>,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, AppError> {
    let session = sessions.get(&path.into_inner()).await?;
    let facing_mode = session.lock().await.toggle_facing();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "facing_mode": facing_mode
    })))
}

#[post("/session/{id}/background")]
pub async fn set_background(
    path: web::Path<String>,
    body: web::Json<BackgroundRequest>,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, AppError> {
    let background = body.into_inner().into_background()?;
    let session = sessions.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    session.set_background(background);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "background": session.background().kind()
    })))
}

/// Body is the cropped background raster from the client.
#[post("/session/{id}/background/custom")]
pub async fn set_custom_background(
    path: web::Path<String>,
    body: web::Bytes,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, AppError> {
    if body.is_empty() {
        return Err(SessionError::InvalidRequest("empty background upload".to_string()).into());
    }
    let session = sessions.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    let uploaded = body.len();
    session.set_custom_background(body).await?;
    info!("Custom background set ({} bytes uploaded)", uploaded);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "background": session.background().kind()
    })))
}
