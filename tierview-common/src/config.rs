//! Configuration loading and validation limits
//!
//! Configuration is resolved once at startup into an immutable [`AppConfig`]
//! and shared read-only with every component. Priority order:
//! 1. Command-line argument / environment variable (via [`ConfigOverrides`])
//! 2. TOML config file
//! 3. Built-in defaults

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default TOML file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "tierview.toml";

/// Size, shape and encoding rules for one kind of stored image
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageProfile {
    /// Longest edge after resizing, in pixels
    pub max_edge: u32,
    /// Expected width/height ratio; `None` disables the aspect check
    #[serde(default)]
    pub aspect_ratio: Option<f32>,
    /// JPEG quality (1-100)
    pub quality: u8,
    /// Largest accepted decoded payload, in KiB
    pub max_payload_kib: usize,
    /// Stored file name prefix
    pub name_prefix: String,
}

impl ImageProfile {
    /// Largest accepted base64 payload length for this profile
    pub fn max_base64_len(&self) -> usize {
        self.max_payload_kib * 1024 * 8 / 6
    }
}

/// Tier validation limits
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TierLimits {
    pub name_len_max: usize,
    pub params_len_max: usize,
    pub param_name_len_max: usize,
    pub weight_max: i64,
    pub pulling_max: i64,
    pub icon: ImageProfile,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            name_len_max: 100,
            params_len_max: 16,
            param_name_len_max: 16,
            weight_max: 100,
            pulling_max: 100,
            icon: ImageProfile {
                max_edge: 1080,
                aspect_ratio: Some(10.0 / 3.0),
                quality: 80,
                max_payload_kib: 5000,
                name_prefix: "icon_".to_string(),
            },
        }
    }
}

/// Review validation limits
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReviewLimits {
    pub name_len_max: usize,
    pub title_len_max: usize,
    pub sections_len_max: usize,
    pub factor_info_len_max: usize,
    pub point_max: f64,
    pub reviews_per_tier_max: usize,
    pub icon: ImageProfile,
}

impl Default for ReviewLimits {
    fn default() -> Self {
        Self {
            name_len_max: 50,
            title_len_max: 100,
            sections_len_max: 8,
            factor_info_len_max: 16,
            point_max: 100.0,
            reviews_per_tier_max: 255,
            icon: ImageProfile {
                max_edge: 256,
                aspect_ratio: Some(1.0),
                quality: 92,
                max_payload_kib: 5000,
                name_prefix: "icon_".to_string(),
            },
        }
    }
}

/// User profile limits
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UserLimits {
    pub name_len_max: usize,
    pub profile_len_max: usize,
    pub icon: ImageProfile,
}

impl Default for UserLimits {
    fn default() -> Self {
        Self {
            name_len_max: 50,
            profile_len_max: 400,
            icon: ImageProfile {
                max_edge: 256,
                aspect_ratio: Some(1.0),
                quality: 92,
                max_payload_kib: 5000,
                name_prefix: "icon_".to_string(),
            },
        }
    }
}

/// Section and paragraph limits, shared by tier descriptions and review sections
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SectionLimits {
    pub title_len_max: usize,
    pub paragraphs_len_max: usize,
    pub text_len_max: usize,
    pub link_len_max: usize,
    pub image: ImageProfile,
}

impl Default for SectionLimits {
    fn default() -> Self {
        Self {
            title_len_max: 100,
            paragraphs_len_max: 16,
            text_len_max: 2000,
            link_len_max: 400,
            image: ImageProfile {
                max_edge: 1080,
                aspect_ratio: None,
                quality: 60,
                max_payload_kib: 5000,
                name_prefix: "parag_".to_string(),
            },
        }
    }
}

/// All validation and storage limits
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub tier: TierLimits,
    pub review: ReviewLimits,
    pub user: UserLimits,
    pub section: SectionLimits,
    /// Allowed proportional deviation from an image profile's aspect ratio
    pub aspect_tolerance: f32,
    /// Attempts at finding an unused id or file name
    pub retry_count: usize,
    /// Length of generated ids and file name codes
    pub code_len: usize,
    /// Minimum seconds between two mutating requests of one session
    pub post_span_secs: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            tier: TierLimits::default(),
            review: ReviewLimits::default(),
            user: UserLimits::default(),
            section: SectionLimits::default(),
            aspect_tolerance: 0.1,
            retry_count: 3,
            code_len: 16,
            post_span_secs: 10,
        }
    }
}

/// Room for everything in a request body besides image payloads
const BODY_OVERHEAD: usize = 1024 * 1024;

impl Limits {
    /// Largest body a tier create/edit can carry: the icon plus a full
    /// paragraph list of images
    pub fn tier_body_max(&self) -> usize {
        self.tier.icon.max_base64_len()
            + self.section.paragraphs_len_max * self.section.image.max_base64_len()
            + BODY_OVERHEAD
    }

    /// Largest body a review create/edit can carry: the icon plus every
    /// paragraph slot of every section holding an image
    pub fn review_body_max(&self) -> usize {
        self.review.icon.max_base64_len()
            + self.review.sections_len_max
                * self.section.paragraphs_len_max
                * self.section.image.max_base64_len()
            + BODY_OVERHEAD
    }

    pub fn user_body_max(&self) -> usize {
        self.user.icon.max_base64_len() + BODY_OVERHEAD
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Raw TOML file contents; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub storage_root: Option<PathBuf>,
    #[serde(default)]
    pub bind_address: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: Limits,
}

impl TomlConfig {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Read a TOML file
    ///
    /// A missing file is an error only when `required` is set.
    pub fn read(path: &Path, required: bool) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                info!("Loaded TOML configuration from {}", path.display());
                Self::parse(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                info!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Command-line / environment overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub storage_root: Option<PathBuf>,
    pub port: Option<u16>,
}

/// Fully resolved, immutable application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub storage_root: PathBuf,
    pub bind_address: String,
    pub port: u16,
    pub logging: LoggingConfig,
    pub limits: Limits,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::resolve(TomlConfig::default(), ConfigOverrides::default())
    }
}

impl AppConfig {
    /// Load the TOML file named by the overrides (or the default file) and resolve
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = match &overrides.config_path {
            Some(path) => TomlConfig::read(path, true)?,
            None => TomlConfig::read(Path::new(DEFAULT_CONFIG_FILE), false)?,
        };
        let config = Self::resolve(toml_config, overrides);
        config.validate()?;
        Ok(config)
    }

    /// Merge TOML values with overrides and built-in defaults
    pub fn resolve(toml_config: TomlConfig, overrides: ConfigOverrides) -> Self {
        Self {
            database_path: overrides
                .database_path
                .or(toml_config.database_path)
                .unwrap_or_else(|| PathBuf::from("tierview.db")),
            storage_root: overrides
                .storage_root
                .or(toml_config.storage_root)
                .unwrap_or_else(|| PathBuf::from("userfiles")),
            bind_address: toml_config
                .bind_address
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: overrides.port.or(toml_config.port).unwrap_or(8080),
            logging: toml_config.logging,
            limits: toml_config.limits,
        }
    }

    /// Reject limits that would make every request fail
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if limits.retry_count == 0 {
            return Err(Error::Config("limits.retry_count must be at least 1".to_string()));
        }
        if limits.code_len < 8 {
            return Err(Error::Config("limits.code_len must be at least 8".to_string()));
        }
        if !(0.0..1.0).contains(&limits.aspect_tolerance) {
            return Err(Error::Config(
                "limits.aspect_tolerance must be in [0, 1)".to_string(),
            ));
        }
        for (name, profile) in [
            ("tier.icon", &limits.tier.icon),
            ("review.icon", &limits.review.icon),
            ("user.icon", &limits.user.icon),
            ("section.image", &limits.section.image),
        ] {
            if profile.max_edge == 0 || profile.quality == 0 || profile.quality > 100 {
                return Err(Error::Config(format!(
                    "limits.{} needs max_edge > 0 and quality in 1..=100",
                    name
                )));
            }
        }
        Ok(())
    }
}
