//! TOML configuration for the zone display.
//!
//! Every section is optional; an empty document yields the same settings as
//! a missing file. Durations accept a plain number of seconds or a
//! `humantime` string such as `"2500ms"` or `"3s"`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Order in which a directory's items are played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistMode {
    Continuous,
    Shuffle,
}

impl Default for PlaylistMode {
    fn default() -> Self {
        Self::Shuffle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CurveSetting {
    Linear,
    Smoothstep,
    EaseInOut,
}

impl Default for CurveSetting {
    fn default() -> Self {
        Self::Linear
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    Low,
    High,
}

impl Default for PowerSetting {
    fn default() -> Self {
        Self::Low
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DisplayConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub surface: SurfaceSection,
    #[serde(default)]
    pub images: ImageSection,
    #[serde(default)]
    pub ticker: TickerSection,
    #[serde(default)]
    pub video: VideoSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SurfaceSection {
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub power: PowerSetting,
    pub clear_color: [f32; 4],
    pub show_fps: bool,
}

impl Default for SurfaceSection {
    fn default() -> Self {
        Self {
            width: 1600,
            height: 900,
            vsync: true,
            power: PowerSetting::default(),
            clear_color: [0.2, 0.2, 0.2, 1.0],
            show_fps: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImageSection {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub order: PlaylistMode,
    #[serde(
        default = "default_rotation",
        deserialize_with = "deserialize_duration"
    )]
    pub rotation: Duration,
    #[serde(
        default = "default_crossfade",
        deserialize_with = "deserialize_duration"
    )]
    pub crossfade: Duration,
    #[serde(default)]
    pub curve: CurveSetting,
}

impl Default for ImageSection {
    fn default() -> Self {
        Self {
            dir: None,
            order: PlaylistMode::default(),
            rotation: default_rotation(),
            crossfade: default_crossfade(),
            curve: CurveSetting::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TickerSection {
    pub text: String,
    pub speed: f64,
    pub smoothing: f32,
    pub texture_height: u32,
    pub font: Option<PathBuf>,
    pub dump_dir: Option<PathBuf>,
}

impl Default for TickerSection {
    fn default() -> Self {
        Self {
            text: "Welcome! Fresh arrivals every week. Ask our staff about today's specials."
                .to_string(),
            speed: 0.2,
            smoothing: 0.3,
            texture_height: 256,
            font: None,
            dump_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VideoSection {
    pub dir: Option<PathBuf>,
    pub order: PlaylistMode,
    pub cache_dir: Option<PathBuf>,
    pub max_cache_bytes: u64,
    pub min_free_bytes: u64,
    pub muted: bool,
}

impl Default for VideoSection {
    fn default() -> Self {
        Self {
            dir: None,
            order: PlaylistMode::default(),
            cache_dir: None,
            max_cache_bytes: 100 * 1024 * 1024,
            min_free_bytes: 50 * 1024 * 1024,
            muted: false,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            surface: SurfaceSection::default(),
            images: ImageSection::default(),
            ticker: TickerSection::default(),
            video: VideoSection::default(),
        }
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_rotation() -> Duration {
    Duration::from_secs(3)
}

fn default_crossfade() -> Duration {
    Duration::from_secs(2)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() || v.is_infinite() {
                return Err(E::custom("duration must be a finite non-negative number"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl DisplayConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: DisplayConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        if self.surface.width == 0 || self.surface.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "surface size {}x{} must be non-zero",
                self.surface.width, self.surface.height
            )));
        }

        if self
            .surface
            .clear_color
            .iter()
            .any(|channel| !(0.0..=1.0).contains(channel))
        {
            return Err(ConfigError::Invalid(
                "surface.clear_color channels must lie in [0, 1]".into(),
            ));
        }

        if self.images.rotation.is_zero() {
            return Err(ConfigError::Invalid(
                "images.rotation must be greater than zero".into(),
            ));
        }

        let smoothing = self.ticker.smoothing;
        if !(smoothing > 0.0 && smoothing <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "ticker.smoothing {smoothing} must lie in (0, 1]"
            )));
        }

        if !self.ticker.speed.is_finite() || self.ticker.speed < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "ticker.speed {} must be a non-negative number",
                self.ticker.speed
            )));
        }

        if self.ticker.texture_height == 0 {
            return Err(ConfigError::Invalid(
                "ticker.texture_height must be greater than zero".into(),
            ));
        }

        if self.video.min_free_bytes > self.video.max_cache_bytes {
            return Err(ConfigError::Invalid(format!(
                "video.min_free_bytes ({}) exceeds video.max_cache_bytes ({})",
                self.video.min_free_bytes, self.video.max_cache_bytes
            )));
        }

        Ok(())
    }
}
