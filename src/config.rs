use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub camera: CameraConfig,
    pub strip: StripConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub static_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraDeviceType {
    None,
    Webcam,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub device: String,
    pub device_type: CameraDeviceType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripConfig {
    pub title_text: String,
    pub product_name: String,
    pub title_font_path: PathBuf,
    pub footer_font_path: PathBuf,
    pub tile_width: u32,
    pub tile_height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Sessions untouched for this long are dropped by the idle sweep.
    pub idle_ttl_secs: u64,
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            idle_ttl_secs: 3600,
        }
    }
}

impl Default for StripConfig {
    fn default() -> Self {
        StripConfig {
            title_text: "diarytime".to_string(),
            product_name: "diarytime".to_string(),
            title_font_path: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
            footer_font_path: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
            tile_width: 800,
            tile_height: 600,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            storage: StorageConfig {
                static_path: PathBuf::from("./static"),
            },
            camera: CameraConfig {
                device: "/dev/video0".to_string(),
                device_type: CameraDeviceType::None,
            },
            strip: StripConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let server = ServerConfig {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
        };

        let storage = StorageConfig {
            static_path: std::env::var("STATIC_PATH")
                .unwrap_or_else(|_| "./static".to_string())
                .into(),
        };

        let device_type =
            std::env::var("CAMERA_DEVICE_TYPE").unwrap_or_else(|_| "none".to_string());
        let camera = CameraConfig {
            device: std::env::var("CAMERA_DEVICE").unwrap_or_else(|_| "/dev/video0".to_string()),
            device_type: match device_type.as_str() {
                "none" => CameraDeviceType::None,
                "webcam" => CameraDeviceType::Webcam,
                other => {
                    return Err(ConfigError::UnsupportedCameraType {
                        device_type: other.to_string(),
                    })
                }
            },
        };

        let defaults = StripConfig::default();
        let strip = StripConfig {
            title_text: std::env::var("STRIP_TITLE").unwrap_or(defaults.title_text),
            product_name: std::env::var("PRODUCT_NAME").unwrap_or(defaults.product_name),
            title_font_path: std::env::var("TITLE_FONT")
                .map(PathBuf::from)
                .unwrap_or(defaults.title_font_path),
            footer_font_path: std::env::var("FOOTER_FONT")
                .map(PathBuf::from)
                .unwrap_or(defaults.footer_font_path),
            tile_width: parse_dimension("TILE_WIDTH", defaults.tile_width)?,
            tile_height: parse_dimension("TILE_HEIGHT", defaults.tile_height)?,
        };

        let session = SessionConfig {
            idle_ttl_secs: match std::env::var("SESSION_TTL_SECS") {
                Ok(value) => value
                    .parse()
                    .map_err(|_| ConfigError::InvalidSessionTtl(value))?,
                Err(_) => SessionConfig::default().idle_ttl_secs,
            },
        };

        let config = Config {
            server,
            storage,
            camera,
            strip,
            session,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        if self.strip.tile_width == 0 || self.strip.tile_height == 0 {
            return Err(ConfigError::InvalidTileDimensions);
        }

        if self.session.idle_ttl_secs == 0 {
            return Err(ConfigError::InvalidSessionTtl("0".to_string()));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| ConfigError::InvalidPort)
    }
}

fn parse_dimension(var: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidTileDimensions),
        Err(_) => Ok(default),
    }
}
