// Library module organization

pub mod background;
pub mod camera;
pub mod collection;
pub mod compositor;
pub mod config;
pub mod errors;
pub mod normalizer;
pub mod routes;
pub mod session;
pub mod templates;
pub mod tile;

// Re-export commonly used types for convenience
pub use background::{Background, BackgroundPreset, GradientStop, PaintProcedure};
pub use camera::{FacingMode, FfmpegCamera, FrameSource, NoCamera};
pub use collection::{CollectionChange, PhotoCollection};
pub use compositor::{Strip, StripCompositor, StripFonts, StripGeometry, StripLayout};
pub use errors::{AppError, AppResult};
pub use session::{PhotoSession, SessionStore};
pub use templates::TemplateKind;
pub use tile::PhotoTile;
