// Route modules organization

pub mod base_routes;
pub mod photo_routes;
pub mod session_routes;
pub mod strip_routes;

use actix_web::web;

pub use base_routes::*;
pub use photo_routes::*;
pub use session_routes::*;
pub use strip_routes::*;

/// Upper bound for raw photo and background uploads.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Register every API route on an app or scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES))
        // Health
        .service(health)
        // Session management
        .service(create_session)
        .service(get_session)
        .service(delete_session)
        .service(set_template)
        .service(reset_session)
        .service(toggle_facing)
        .service(set_background)
        .service(set_custom_background)
        // Photos
        .service(upload_photo)
        .service(add_cropped_photo)
        .service(capture_photo)
        .service(get_photo)
        .service(delete_photo)
        // Strip output
        .service(preview_strip)
        .service(download_strip);
}
