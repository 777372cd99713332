use bytes::Bytes;
use chrono::Utc;
use image::DynamicImage;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;
use uuid::Uuid;

use crate::background::Background;
use crate::camera::FacingMode;
use crate::collection::{CollectionChange, PhotoCollection};
use crate::compositor::{Strip, StripCompositor};
use crate::errors::{AppResult, CollectionError, SessionError, StripError};
use crate::normalizer;
use crate::templates::TemplateKind;
use crate::tile::{self, PhotoTile};

/// Largest accepted side of a client-cropped photo.
pub const MAX_CROPPED_SIDE: u32 = 4096;
/// Relative slack allowed between a crop's aspect ratio and the tile's.
const CROP_ASPECT_TOLERANCE: f64 = 0.02;
/// Upper bound on how often the idle sweep runs.
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// One user's strip in progress: the photos, the template limiting them, the
/// chosen background and the camera facing mode.
pub struct PhotoSession {
    id: Uuid,
    created_at: String,
    template: TemplateKind,
    collection: PhotoCollection,
    background: Background,
    facing_mode: FacingMode,
    tile_width: u32,
    tile_height: u32,
    revision: Arc<AtomicU64>,
}

/// Snapshot of a session for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub created_at: String,
    pub template: TemplateKind,
    pub capacity: usize,
    pub photo_count: usize,
    pub is_full: bool,
    pub would_reset_on_change: bool,
    pub background: &'static str,
    pub facing_mode: FacingMode,
    /// Bumped on every photo collection change so clients know to refresh.
    pub revision: u64,
}

impl PhotoSession {
    /// Create a new session with a unique ID and current timestamp
    pub fn new(tile_width: u32, tile_height: u32) -> Self {
        let template = TemplateKind::default();
        let revision = Arc::new(AtomicU64::new(0));
        let counter = revision.clone();
        let collection = PhotoCollection::new(template.capacity()).with_observer(Box::new(
            move |_change: CollectionChange, _len: usize| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));

        PhotoSession {
            id: Uuid::new_v4(),
            created_at: Utc::now().to_rfc3339(),
            template,
            collection,
            background: Background::default(),
            facing_mode: FacingMode::default(),
            tile_width,
            tile_height,
            revision,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn template(&self) -> TemplateKind {
        self.template
    }

    pub fn background(&self) -> &Background {
        &self.background
    }

    pub fn facing_mode(&self) -> FacingMode {
        self.facing_mode
    }

    pub fn photo_count(&self) -> usize {
        self.collection.len()
    }

    pub fn photo(&self, index: usize) -> Result<&PhotoTile, CollectionError> {
        self.collection
            .get(index)
            .ok_or(CollectionError::IndexOutOfRange {
                index,
                len: self.collection.len(),
            })
    }

    pub fn tiles(&self) -> &[PhotoTile] {
        self.collection.tiles()
    }

    /// Fails fast when another photo would not fit, before any decoding or
    /// camera work is done.
    pub fn ensure_room(&self) -> Result<(), CollectionError> {
        if self.collection.is_full() {
            return Err(CollectionError::CapacityExceeded {
                capacity: self.collection.capacity(),
            });
        }
        Ok(())
    }

    /// Decode a raw upload and cover-fit it into a tile.
    pub async fn add_upload(&mut self, data: Bytes) -> AppResult<usize> {
        self.ensure_room()?;
        let (width, height) = (self.tile_width, self.tile_height);
        let tile = tile::run_blocking(move || {
            let source = tile::decode(&data)?;
            normalize_source(&source, width, height)
        })
        .await?;
        Ok(self.collection.append(tile)?)
    }

    /// Orient a camera frame for the current facing mode, then cover-fit it.
    pub async fn add_capture(&mut self, frame: DynamicImage) -> AppResult<usize> {
        self.ensure_room()?;
        let (width, height) = (self.tile_width, self.tile_height);
        let facing_mode = self.facing_mode;
        let tile = tile::run_blocking(move || {
            normalize_source(&facing_mode.orient(frame), width, height)
        })
        .await?;
        Ok(self.collection.append(tile)?)
    }

    /// Append a raster that was already cropped by the client.
    ///
    /// The crop must match the tile aspect ratio and stay within
    /// `MAX_CROPPED_SIDE`; only the header is read for that check. PNG crops
    /// are stored untouched, anything else is re-encoded as PNG.
    pub async fn add_cropped(&mut self, data: Bytes) -> AppResult<usize> {
        self.ensure_room()?;
        let (width, height) = tile::probe_dimensions(&data)?;
        self.check_cropped_dimensions(width, height)?;

        let tile = if tile::is_png(&data) {
            PhotoTile::from_encoded(data)?
        } else {
            tile::run_blocking(move || PhotoTile::from_image(&tile::decode(&data)?.to_rgba8()))
                .await?
        };
        Ok(self.collection.append(tile)?)
    }

    fn check_cropped_dimensions(&self, width: u32, height: u32) -> Result<(), StripError> {
        if width == 0 || height == 0 || width > MAX_CROPPED_SIDE || height > MAX_CROPPED_SIDE {
            return Err(StripError::InvalidDimensions(format!(
                "{}x{} cropped photo",
                width, height
            )));
        }
        let expected = self.tile_width as f64 / self.tile_height as f64;
        let actual = width as f64 / height as f64;
        if (actual / expected - 1.0).abs() > CROP_ASPECT_TOLERANCE {
            return Err(StripError::InvalidDimensions(format!(
                "cropped photo is {}x{}, expected a {}:{} crop",
                width, height, self.tile_width, self.tile_height
            )));
        }
        Ok(())
    }

    pub fn remove_photo(&mut self, index: usize) -> Result<PhotoTile, CollectionError> {
        self.collection.remove_at(index)
    }

    pub fn reset(&mut self) {
        info!("Resetting photos for session {}", self.id);
        self.collection.clear();
    }

    /// True when changing the template would discard photos.
    pub fn would_reset_on_change(&self) -> bool {
        !self.collection.is_empty()
    }

    /// Switch templates and return the new capacity.
    ///
    /// A non-empty collection is only cleared when `confirm_reset` is set;
    /// otherwise nothing changes and `ConfirmationRequired` is returned.
    /// Selecting the current template is a no-op.
    pub fn set_template(
        &mut self,
        template: TemplateKind,
        confirm_reset: bool,
    ) -> Result<usize, SessionError> {
        if template == self.template {
            return Ok(template.capacity());
        }
        if self.would_reset_on_change() {
            if !confirm_reset {
                return Err(SessionError::ConfirmationRequired {
                    photos: self.collection.len(),
                });
            }
            self.collection.clear();
        }

        info!(
            "Session {} template {} -> {}",
            self.id, self.template, template
        );
        self.template = template;
        self.collection.set_capacity(template.capacity());
        Ok(template.capacity())
    }

    /// Only affects later composites; existing tiles are untouched.
    pub fn set_background(&mut self, background: Background) {
        info!("Session {} background set to {}", self.id, background.kind());
        self.background = background;
    }

    /// The cropped background is stored as JPEG and decoded back before it
    /// becomes selectable, so a bad upload leaves the current background.
    pub async fn set_custom_background(&mut self, data: Bytes) -> AppResult<()> {
        let background = tile::run_blocking(move || {
            let cropped = tile::decode(&data)?;
            let jpeg = tile::encode_jpeg(&cropped)?;
            Background::custom_from_encoded(&jpeg)
        })
        .await?;
        self.set_background(background);
        Ok(())
    }

    pub fn toggle_facing(&mut self) -> FacingMode {
        self.facing_mode = self.facing_mode.toggle();
        self.facing_mode
    }

    /// Composite the current photos over the current background.
    pub async fn compose(
        &self,
        compositor: &StripCompositor,
        title_text: &str,
        footer_text: &str,
    ) -> Result<Strip, StripError> {
        let paint = self.background.resolve();
        compositor
            .composite(self.collection.tiles(), &paint, title_text, footer_text)
            .await
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            created_at: self.created_at.clone(),
            template: self.template,
            capacity: self.collection.capacity(),
            photo_count: self.collection.len(),
            is_full: self.collection.is_full(),
            would_reset_on_change: self.would_reset_on_change(),
            background: self.background.kind(),
            facing_mode: self.facing_mode,
            revision: self.revision.load(Ordering::SeqCst),
        }
    }
}

/// Cover-fit a decoded source into a `width` x `height` tile.
fn normalize_source(
    source: &DynamicImage,
    width: u32,
    height: u32,
) -> Result<PhotoTile, StripError> {
    if source.width() == 0 || source.height() == 0 {
        return Err(StripError::InvalidDimensions(
            "source image has no pixels".to_string(),
        ));
    }
    normalizer::normalize(source, width, height)
}

pub type SharedSession = Arc<Mutex<PhotoSession>>;

struct StoredSession {
    session: SharedSession,
    /// Milliseconds since the store was created.
    last_touched: AtomicU64,
}

/// In-memory sessions keyed by id. Nothing is persisted.
///
/// Each session sits behind its own async mutex; handlers hold it across a
/// composite so photos cannot change while a strip is being drawn. Every
/// lookup refreshes the session's idle clock for `evict_idle`.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, StoredSession>>,
    tile_width: u32,
    tile_height: u32,
    started: Instant,
}

impl SessionStore {
    pub fn new(tile_width: u32, tile_height: u32) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            tile_width,
            tile_height,
            started: Instant::now(),
        }
    }

    fn now_millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub async fn create(&self) -> SharedSession {
        let session = PhotoSession::new(self.tile_width, self.tile_height);
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));
        let stored = StoredSession {
            session: shared.clone(),
            last_touched: AtomicU64::new(self.now_millis()),
        };
        self.sessions.write().await.insert(id, stored);
        info!("Created session {}", id);
        shared
    }

    pub async fn get(&self, id: &str) -> Result<SharedSession, SessionError> {
        let not_found = || SessionError::NotFound { id: id.to_string() };
        let uuid = Uuid::parse_str(id).map_err(|_| not_found())?;
        let sessions = self.sessions.read().await;
        let stored = sessions.get(&uuid).ok_or_else(not_found)?;
        stored
            .last_touched
            .store(self.now_millis(), Ordering::SeqCst);
        Ok(stored.session.clone())
    }

    /// Drop a session. Requests already holding it finish normally.
    pub async fn remove(&self, id: &str) -> Result<(), SessionError> {
        let not_found = || SessionError::NotFound { id: id.to_string() };
        let uuid = Uuid::parse_str(id).map_err(|_| not_found())?;
        self.sessions
            .write()
            .await
            .remove(&uuid)
            .ok_or_else(not_found)?;
        info!("Deleted session {}", uuid);
        Ok(())
    }

    /// Drop every session not looked up within `ttl`; returns how many went.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let now = self.now_millis();
        let ttl = ttl.as_millis() as u64;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, stored| {
            now.saturating_sub(stored.last_touched.load(Ordering::SeqCst)) <= ttl
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Periodically evict sessions idle for longer than `ttl`.
pub fn spawn_idle_sweep(store: Arc<SessionStore>, ttl: Duration) -> JoinHandle<()> {
    let period = ttl.clamp(Duration::from_secs(1), MAX_SWEEP_PERIOD);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = store.evict_idle(ttl).await;
            if evicted > 0 {
                info!(
                    "Evicted {} idle session(s), {} remaining",
                    evicted,
                    store.len().await
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::StripFonts;
    use crate::errors::AppError;
    use image::{Rgba, RgbaImage};

    fn png(width: u32, height: u32, color: Rgba<u8>) -> Bytes {
        tile::encode_png(&RgbaImage::from_pixel(width, height, color)).unwrap()
    }

    fn session_with_template(template: TemplateKind) -> PhotoSession {
        let mut session = PhotoSession::new(800, 600);
        session.set_template(template, false).unwrap();
        session
    }

    #[test]
    fn test_new_session_defaults() {
        let session = PhotoSession::new(800, 600);
        let summary = session.summary();
        assert_eq!(summary.template, TemplateKind::Single);
        assert_eq!(summary.capacity, 1);
        assert_eq!(summary.photo_count, 0);
        assert_eq!(summary.background, "solid-color");
        assert_eq!(summary.facing_mode, FacingMode::User);
        assert!(!summary.would_reset_on_change);
    }

    #[tokio::test]
    async fn test_upload_is_normalized() {
        let mut session = session_with_template(TemplateKind::ThreeVertical);
        let index = session
            .add_upload(png(1920, 1080, Rgba([9, 9, 9, 255])))
            .await
            .unwrap();
        assert_eq!(index, 0);
        let tile = session.photo(0).unwrap();
        assert_eq!((tile.width(), tile.height()), (800, 600));
    }

    #[tokio::test]
    async fn test_full_session_rejects_before_decoding() {
        let mut session = PhotoSession::new(800, 600);
        session
            .add_upload(png(40, 30, Rgba([1, 1, 1, 255])))
            .await
            .unwrap();

        let err = session
            .add_upload(Bytes::from_static(b"not an image"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Collection(CollectionError::CapacityExceeded { capacity: 1 })
        ));
        assert_eq!(session.photo_count(), 1);
    }

    #[tokio::test]
    async fn test_cropped_png_kept_as_is() {
        let mut session = session_with_template(TemplateKind::FourVertical);
        let data = png(400, 300, Rgba([3, 3, 3, 255]));
        session.add_cropped(data.clone()).await.unwrap();
        let tile = session.photo(0).unwrap();
        assert_eq!((tile.width(), tile.height()), (400, 300));
        assert_eq!(tile.data(), &data);
    }

    #[tokio::test]
    async fn test_cropped_jpeg_is_stored_as_png() {
        let mut session = session_with_template(TemplateKind::FourVertical);
        let source = RgbaImage::from_pixel(400, 300, Rgba([0, 0, 200, 255]));
        let jpeg = tile::encode_jpeg(&DynamicImage::ImageRgba8(source)).unwrap();

        session.add_cropped(jpeg).await.unwrap();
        let tile = session.photo(0).unwrap();
        assert!(tile::is_png(tile.data()));
        assert_eq!((tile.width(), tile.height()), (400, 300));
        assert!(tile.decode().unwrap().get_pixel(200, 150)[2] > 190);
    }

    #[tokio::test]
    async fn test_cropped_photo_must_match_tile_aspect() {
        let mut session = session_with_template(TemplateKind::FourVertical);

        for (width, height) in [(1, 600), (1, 60_000), (400, 400), (300, 400)] {
            let err = session
                .add_cropped(png(width, height, Rgba([5, 5, 5, 255])))
                .await
                .unwrap_err();
            assert!(
                matches!(err, AppError::Strip(StripError::InvalidDimensions(_))),
                "{}x{} gave {:?}",
                width,
                height,
                err
            );
        }
        assert_eq!(session.photo_count(), 0);

        // Off-by-one-pixel crops are within tolerance
        session
            .add_cropped(png(401, 300, Rgba([5, 5, 5, 255])))
            .await
            .unwrap();
        assert_eq!(session.photo_count(), 1);
    }

    #[tokio::test]
    async fn test_cropped_photo_side_is_capped() {
        // Aspect matches the tile exactly, only the size is out of range
        let side = MAX_CROPPED_SIDE + 1;
        let mut session = PhotoSession::new(side, 1);
        let err = session
            .add_cropped(png(side, 1, Rgba([5, 5, 5, 255])))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Strip(StripError::InvalidDimensions(_))));
    }

    #[tokio::test]
    async fn test_capture_mirrors_user_facing_frames() {
        let mut frame = RgbaImage::from_pixel(800, 600, Rgba([0, 0, 0, 255]));
        for y in 0..600 {
            for x in 0..100 {
                frame.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }

        let mut session = session_with_template(TemplateKind::ThreeVertical);
        session
            .add_capture(DynamicImage::ImageRgba8(frame.clone()))
            .await
            .unwrap();
        session.toggle_facing();
        session
            .add_capture(DynamicImage::ImageRgba8(frame))
            .await
            .unwrap();

        let mirrored = session.photo(0).unwrap().decode().unwrap();
        assert_eq!(mirrored.get_pixel(795, 300)[0], 255);
        assert_eq!(mirrored.get_pixel(5, 300)[0], 0);

        let straight = session.photo(1).unwrap().decode().unwrap();
        assert_eq!(straight.get_pixel(5, 300)[0], 255);
    }

    #[tokio::test]
    async fn test_template_change_requires_confirmation() {
        let mut session = session_with_template(TemplateKind::ThreeVertical);
        session
            .add_upload(png(80, 60, Rgba([1, 2, 3, 255])))
            .await
            .unwrap();
        assert!(session.would_reset_on_change());

        let err = session.set_template(TemplateKind::FourVertical, false).unwrap_err();
        assert!(matches!(err, SessionError::ConfirmationRequired { photos: 1 }));
        assert_eq!(session.template(), TemplateKind::ThreeVertical);
        assert_eq!(session.photo_count(), 1);

        let capacity = session.set_template(TemplateKind::FourVertical, true).unwrap();
        assert_eq!(capacity, 4);
        assert_eq!(session.photo_count(), 0);
        assert!(!session.would_reset_on_change());
    }

    #[tokio::test]
    async fn test_same_template_keeps_photos() {
        let mut session = session_with_template(TemplateKind::ThreeVertical);
        session
            .add_upload(png(80, 60, Rgba([1, 2, 3, 255])))
            .await
            .unwrap();
        assert_eq!(session.set_template(TemplateKind::ThreeVertical, false).unwrap(), 3);
        assert_eq!(session.photo_count(), 1);
    }

    #[tokio::test]
    async fn test_revision_tracks_collection_changes() {
        let mut session = session_with_template(TemplateKind::ThreeVertical);
        let start = session.summary().revision;
        session
            .add_upload(png(80, 60, Rgba([1, 2, 3, 255])))
            .await
            .unwrap();
        session.remove_photo(0).unwrap();
        let _ = session.remove_photo(0);
        assert_eq!(session.summary().revision, start + 2);
    }

    #[tokio::test]
    async fn test_custom_background_rejects_garbage() {
        let mut session = PhotoSession::new(800, 600);
        let result = session
            .set_custom_background(Bytes::from_static(b"garbage"))
            .await;
        assert!(result.is_err());
        assert_eq!(session.background().kind(), "solid-color");

        session
            .set_custom_background(png(300, 200, Rgba([0, 200, 0, 255])))
            .await
            .unwrap();
        assert_eq!(session.background().kind(), "custom-image");
    }

    #[tokio::test]
    async fn test_background_switch_leaves_tiles_alone() {
        let compositor = StripCompositor::new(StripFonts::default());
        let mut session = session_with_template(TemplateKind::ThreeVertical);
        for shade in [40u8, 80] {
            session
                .add_upload(png(800, 600, Rgba([shade, 0, 0, 255])))
                .await
                .unwrap();
        }
        let tiles_before = session.tiles().to_vec();

        let solid = session.compose(&compositor, "", "").await.unwrap();
        session
            .set_custom_background(png(64, 64, Rgba([0, 255, 0, 255])))
            .await
            .unwrap();
        let custom = session.compose(&compositor, "", "").await.unwrap();

        assert_eq!(session.tiles(), tiles_before.as_slice());
        assert_eq!(solid.image().dimensions(), custom.image().dimensions());
        // Margins change with the background, photo pixels do not
        assert_eq!(solid.image().get_pixel(5, 5), &Rgba([0x6c, 0x5c, 0xe7, 0xff]));
        let margin = custom.image().get_pixel(5, 5);
        assert!(margin[0] < 30 && margin[1] > 220, "margin is {:?}", margin);
        assert_eq!(solid.image().get_pixel(300, 350), custom.image().get_pixel(300, 350));
    }

    #[tokio::test]
    async fn test_compose_empty_session() {
        let compositor = StripCompositor::new(StripFonts::default());
        let session = PhotoSession::new(800, 600);
        let result = session.compose(&compositor, "t", "f").await;
        assert!(matches!(result, Err(StripError::EmptyInput)));
    }

    #[tokio::test]
    async fn test_store_create_and_get() {
        let store = SessionStore::new(800, 600);
        assert!(store.is_empty().await);

        let created = store.create().await;
        let id = created.lock().await.id();
        let fetched = store.get(&id.to_string()).await.unwrap();
        assert!(Arc::ptr_eq(&created, &fetched));
        assert_eq!(store.len().await, 1);

        assert!(matches!(
            store.get("not-a-uuid").await,
            Err(SessionError::NotFound { .. })
        ));
        assert!(matches!(
            store.get(&Uuid::new_v4().to_string()).await,
            Err(SessionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_remove() {
        let store = SessionStore::new(800, 600);
        let id = store.create().await.lock().await.id().to_string();

        store.remove(&id).await.unwrap();
        assert!(store.is_empty().await);
        assert!(matches!(store.get(&id).await, Err(SessionError::NotFound { .. })));
        assert!(matches!(
            store.remove(&id).await,
            Err(SessionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_evict_idle_keeps_recently_used_sessions() {
        let store = SessionStore::new(800, 600);
        let stale = store.create().await.lock().await.id().to_string();
        let busy = store.create().await.lock().await.id().to_string();

        tokio::time::sleep(Duration::from_millis(300)).await;
        store.get(&busy).await.unwrap();

        assert_eq!(store.evict_idle(Duration::from_secs(60)).await, 0);
        assert_eq!(store.evict_idle(Duration::from_millis(150)).await, 1);
        assert!(store.get(&busy).await.is_ok());
        assert!(store.get(&stale).await.is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.evict_idle(Duration::ZERO).await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_idle_sweep_runs_in_background() {
        let store = Arc::new(SessionStore::new(800, 600));
        store.create().await;

        let sweep = spawn_idle_sweep(store.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        sweep.abort();
        assert!(store.is_empty().await);
    }
}
