// Still capture from a V4L2 webcam through the ffmpeg CLI

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{CameraConfig, CameraDeviceType};
use crate::errors::CameraError;
use crate::tile;

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Which way the camera faces. Front-facing frames are mirrored so the
/// capture matches what the subject saw in the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

impl FacingMode {
    pub fn toggle(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    pub fn orient(self, frame: DynamicImage) -> DynamicImage {
        match self {
            FacingMode::User => frame.fliph(),
            FacingMode::Environment => frame,
        }
    }
}

/// Anything that can hand over a single still frame.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture_still(&self) -> Result<DynamicImage, CameraError>;

    fn describe(&self) -> String;
}

/// Grabs one MJPEG frame per capture with `ffmpeg -f v4l2`.
pub struct FfmpegCamera {
    device: String,
}

impl FfmpegCamera {
    pub fn new(device: impl Into<String>) -> Self {
        FfmpegCamera {
            device: device.into(),
        }
    }

    fn capture_args(&self) -> Vec<&str> {
        vec![
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "v4l2",
            "-i",
            self.device.as_str(),
            "-frames:v",
            "1",
            "-f",
            "image2pipe",
            "-vcodec",
            "mjpeg",
            "-",
        ]
    }
}

#[async_trait]
impl FrameSource for FfmpegCamera {
    async fn capture_still(&self) -> Result<DynamicImage, CameraError> {
        if !Path::new(&self.device).exists() {
            return Err(CameraError::DeviceNotFound {
                device: self.device.clone(),
            });
        }

        info!("Capturing still from {}", self.device);
        let output = tokio::time::timeout(
            CAPTURE_TIMEOUT,
            tokio::process::Command::new("ffmpeg")
                .args(self.capture_args())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| CameraError::CaptureError("ffmpeg timed out".to_string()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CameraError::CaptureError(stderr.trim().to_string()));
        }
        if output.stdout.is_empty() {
            return Err(CameraError::NoFrameAvailable);
        }

        tile::decode(&output.stdout).map_err(|e| CameraError::CaptureError(e.to_string()))
    }

    fn describe(&self) -> String {
        format!("ffmpeg v4l2 capture on {}", self.device)
    }
}

/// Used when no camera is configured; every capture fails.
pub struct NoCamera;

#[async_trait]
impl FrameSource for NoCamera {
    async fn capture_still(&self) -> Result<DynamicImage, CameraError> {
        Err(CameraError::Unavailable)
    }

    fn describe(&self) -> String {
        "no camera".to_string()
    }
}

/// Pick the frame source for the configured device type. A missing webcam
/// device is not fatal: uploads keep working without capture.
pub fn camera_from_config(config: &CameraConfig) -> Arc<dyn FrameSource> {
    match config.device_type {
        CameraDeviceType::None => {
            info!("No camera configured, capture disabled");
            Arc::new(NoCamera)
        }
        CameraDeviceType::Webcam => {
            if !Path::new(&config.device).exists() {
                warn!(
                    "Camera device {} not present yet; captures will fail until it appears",
                    config.device
                );
            }
            Arc::new(FfmpegCamera::new(config.device.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn asymmetric_frame() -> DynamicImage {
        let mut img = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_toggle_facing_mode() {
        assert_eq!(FacingMode::User.toggle(), FacingMode::Environment);
        assert_eq!(FacingMode::Environment.toggle(), FacingMode::User);
        assert_eq!(FacingMode::default(), FacingMode::User);
    }

    #[test]
    fn test_user_facing_frames_are_mirrored() {
        let mirrored = FacingMode::User.orient(asymmetric_frame()).to_rgba8();
        assert_eq!(mirrored.get_pixel(3, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(mirrored.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));

        let untouched = FacingMode::Environment.orient(asymmetric_frame()).to_rgba8();
        assert_eq!(untouched.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_facing_mode_serde() {
        assert_eq!(serde_json::to_value(FacingMode::User).unwrap(), "user");
        let mode: FacingMode = serde_json::from_str("\"environment\"").unwrap();
        assert_eq!(mode, FacingMode::Environment);
    }

    #[test]
    fn test_ffmpeg_reads_one_frame_from_device() {
        let camera = FfmpegCamera::new("/dev/video7");
        let args = camera.capture_args();
        let input = args.iter().position(|a| *a == "-i").unwrap();
        assert_eq!(args[input + 1], "/dev/video7");
        assert!(args.windows(2).any(|w| w == ["-frames:v", "1"]));
        assert_eq!(args.last(), Some(&"-"));
    }

    #[tokio::test]
    async fn test_no_camera_is_unavailable() {
        let result = NoCamera.capture_still().await;
        assert!(matches!(result, Err(CameraError::Unavailable)));
    }

    #[tokio::test]
    async fn test_missing_device_reported() {
        let camera = FfmpegCamera::new("/dev/definitely-not-a-camera");
        let result = camera.capture_still().await;
        assert!(matches!(result, Err(CameraError::DeviceNotFound { .. })));
    }

    #[test]
    fn test_camera_from_config() {
        let none = camera_from_config(&CameraConfig {
            device: "/dev/video0".to_string(),
            device_type: CameraDeviceType::None,
        });
        assert_eq!(none.describe(), "no camera");

        let webcam = camera_from_config(&CameraConfig {
            device: "/dev/video3".to_string(),
            device_type: CameraDeviceType::Webcam,
        });
        assert!(webcam.describe().contains("/dev/video3"));
    }
}
