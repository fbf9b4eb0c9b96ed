use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::anchor::{DEFAULT_SCALE_FACTOR, MIN_SCALE_FACTOR};
use crate::client::ClientSettings;
use crate::frame::{CaptureSettings, DEFAULT_JPEG_QUALITY};
use crate::transport::LocatorConfig;

const DEFAULT_DIRECTORY_URL: &str = "http://127.0.0.1:8080/lookup";
const DEFAULT_SERVICE_NAME: &str = "colmap";
const DEFAULT_POSE_PATH: &str = "/";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_VARIANTS: &[&str] = &["present", "past"];

pub const CONFIG_ENV: &str = "POSE_ANCHOR_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    directory: Option<DirectoryConfigFile>,
    service: Option<ServiceConfigFile>,
    capture: Option<CaptureConfigFile>,
    placement: Option<PlacementConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DirectoryConfigFile {
    url: Option<String>,
    service_name: Option<String>,
    result_envelope: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    path: Option<String>,
    timeout_secs: Option<u64>,
    location_query: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    jpeg_quality: Option<u8>,
    mirror_y: Option<bool>,
    dump_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct PlacementConfigFile {
    scale_factor: Option<f64>,
    variants: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub directory: DirectorySettings,
    pub service: ServiceSettings,
    pub capture: CaptureSettings,
    pub placement: PlacementSettings,
}

#[derive(Debug, Clone)]
pub struct DirectorySettings {
    pub url: String,
    pub service_name: String,
    pub result_envelope: bool,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub path: String,
    pub timeout: Duration,
    pub location_query: bool,
}

#[derive(Debug, Clone)]
pub struct PlacementSettings {
    pub scale_factor: f64,
    pub variants: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // An empty file section set only carries defaults, which cannot fail.
        Self::from_file(PipelineConfigFile::default())
    }
}

impl PipelineConfig {
    /// Defaults, then `$POSE_ANCHOR_CONFIG` if set, then `POSE_ANCHOR_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a specific file, still honouring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let directory = file.directory.unwrap_or_default();
        let service = file.service.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let placement = file.placement.unwrap_or_default();

        Self {
            directory: DirectorySettings {
                url: directory
                    .url
                    .unwrap_or_else(|| DEFAULT_DIRECTORY_URL.to_string()),
                service_name: directory
                    .service_name
                    .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
                result_envelope: directory.result_envelope.unwrap_or(false),
            },
            service: ServiceSettings {
                path: service.path.unwrap_or_else(|| DEFAULT_POSE_PATH.to_string()),
                timeout: Duration::from_secs(service.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
                location_query: service.location_query.unwrap_or(false),
            },
            capture: CaptureSettings {
                jpeg_quality: capture.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
                mirror_y: capture.mirror_y.unwrap_or(false),
                dump_path: capture.dump_path,
            },
            placement: PlacementSettings {
                scale_factor: placement.scale_factor.unwrap_or(DEFAULT_SCALE_FACTOR),
                variants: placement
                    .variants
                    .unwrap_or_else(|| DEFAULT_VARIANTS.iter().map(|v| v.to_string()).collect()),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("POSE_ANCHOR_DIRECTORY_URL") {
            if !url.trim().is_empty() {
                self.directory.url = url;
            }
        }
        if let Ok(name) = std::env::var("POSE_ANCHOR_SERVICE_NAME") {
            if !name.trim().is_empty() {
                self.directory.service_name = name;
            }
        }
        if let Ok(path) = std::env::var("POSE_ANCHOR_POSE_PATH") {
            if !path.trim().is_empty() {
                self.service.path = path;
            }
        }
        if let Ok(scale) = std::env::var("POSE_ANCHOR_SCALE_FACTOR") {
            self.placement.scale_factor = scale
                .trim()
                .parse()
                .map_err(|_| anyhow!("POSE_ANCHOR_SCALE_FACTOR must be a number"))?;
        }
        if let Ok(timeout) = std::env::var("POSE_ANCHOR_TIMEOUT_SECS") {
            let seconds: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("POSE_ANCHOR_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.service.timeout = Duration::from_secs(seconds);
        }
        if let Ok(quality) = std::env::var("POSE_ANCHOR_JPEG_QUALITY") {
            self.capture.jpeg_quality = quality
                .trim()
                .parse()
                .map_err(|_| anyhow!("POSE_ANCHOR_JPEG_QUALITY must be an integer 1-100"))?;
        }
        if let Ok(variants) = std::env::var("POSE_ANCHOR_VARIANTS") {
            let parsed = split_csv(&variants);
            if !parsed.is_empty() {
                self.placement.variants = parsed;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let url = url::Url::parse(&self.directory.url)
            .with_context(|| format!("invalid directory url '{}'", self.directory.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "directory url must be http or https, got '{}'",
                url.scheme()
            ));
        }
        self.directory.service_name = self.directory.service_name.trim().to_string();
        if self.directory.service_name.is_empty() {
            return Err(anyhow!("directory service_name must not be empty"));
        }
        if !self.service.path.starts_with('/') {
            self.service.path.insert(0, '/');
        }
        if self.service.timeout.as_secs() == 0 {
            return Err(anyhow!("service timeout must be greater than zero"));
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(anyhow!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.capture.jpeg_quality
            ));
        }
        check_scale_factor(self.placement.scale_factor)?;
        let mut seen = std::collections::HashSet::new();
        for variant in &self.placement.variants {
            if !seen.insert(variant.as_str()) {
                return Err(anyhow!("duplicate variant '{}'", variant));
            }
        }
        Ok(())
    }

    /// Replace the placement scale factor, applying the same bound as the config file.
    pub fn with_scale_factor(mut self, scale: f64) -> Result<Self> {
        check_scale_factor(scale)?;
        self.placement.scale_factor = scale;
        Ok(self)
    }

    pub fn locator(&self) -> LocatorConfig {
        LocatorConfig {
            directory_url: self.directory.url.clone(),
            service_name: self.directory.service_name.clone(),
            result_envelope: self.directory.result_envelope,
        }
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            locator: self.locator(),
            pose_path: self.service.path.clone(),
            timeout: self.service.timeout,
            location_query: self.service.location_query,
            capture: self.capture.clone(),
        }
    }
}

fn check_scale_factor(scale: f64) -> Result<()> {
    if !scale.is_finite() || scale < MIN_SCALE_FACTOR {
        return Err(anyhow!(
            "scale_factor must be at least {}, got {}",
            MIN_SCALE_FACTOR,
            scale
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
