use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "labelcam_config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub labels: LabelConfig,
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Use the synthetic test pattern instead of a real camera
    pub simulate: bool,
    /// Preview stream size requested from the camera
    pub preview_width: u32,
    pub preview_height: u32,
    /// V4L2 device used by the frame-grab tier
    pub device: String,
    /// Program used for full-resolution stills
    pub still_command: String,
    /// Program used for frame grabs
    pub grab_command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    Single,
    Burst,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub crop_to_square: bool,
    /// Square output side in pixels, None keeps the cropped/native size
    pub target_size: Option<u32>,
    pub mode: CaptureMode,
    pub burst_count: u32,
    pub burst_interval_ms: u64,
    /// Wait before capturing so focus and exposure can settle
    pub settle_ms: u64,
    /// Encoder quality in (0, 1]; PNG output is lossless and ignores it
    pub quality: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    pub primary: Vec<String>,
    /// The primary label that requires a sub-label
    pub distinguished: String,
    pub sub_labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Base folder for labelled shots; None falls back to downloads
    pub base_dir: Option<PathBuf>,
    /// Where flattened fallback files go
    pub download_dir: PathBuf,
    pub config_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                simulate: false,
                preview_width: 1920,
                preview_height: 1080,
                device: "/dev/video0".to_string(),
                still_command: "rpicam-still".to_string(),
                grab_command: "ffmpeg".to_string(),
            },
            capture: CaptureConfig {
                crop_to_square: true,
                target_size: Some(512),
                mode: CaptureMode::Single,
                burst_count: 5,
                burst_interval_ms: 150,
                settle_ms: 0,
                quality: 0.92,
            },
            labels: LabelConfig {
                primary: vec![
                    "Snyders".to_string(),
                    "Big Lot".to_string(),
                    "C Press".to_string(),
                ],
                distinguished: "Snyders".to_string(),
                sub_labels: classic_sub_labels(),
            },
            paths: PathConfig {
                base_dir: None,
                download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from("downloads")),
                config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            },
        }
    }
}

pub fn classic_sub_labels() -> Vec<String> {
    ["C", "D", "E"].iter().map(|s| s.to_string()).collect()
}

pub fn expanded_sub_labels() -> Vec<String> {
    ["C", "D", "E", "F", "G", "H", "I"].iter().map(|s| s.to_string()).collect()
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            log::info!("Config file not found, creating default configuration");
            let default_config = Self::default();
            default_config.save()?;
            Ok(default_config)
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Self = toml::from_str(&contents)
            .with_context(|| "Failed to parse configuration file")?;
        config.paths.config_file = path.as_ref().to_path_buf();

        config.validate()?;
        log::info!("Configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to_file(&self.paths.config_file)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
            }
        }

        std::fs::write(path.as_ref(), contents)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        log::info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;

        if capture.target_size == Some(0) {
            return Err(anyhow::anyhow!("Invalid target size: 0"));
        }
        if capture.target_size.is_some() && !capture.crop_to_square {
            return Err(anyhow::anyhow!("target_size requires crop_to_square"));
        }
        if capture.burst_count == 0 {
            return Err(anyhow::anyhow!("Invalid burst count: 0"));
        }
        if !(capture.quality > 0.0 && capture.quality <= 1.0) {
            return Err(anyhow::anyhow!("Invalid quality: {}", capture.quality));
        }

        let labels = &self.labels;
        if labels.primary.is_empty() {
            return Err(anyhow::anyhow!("No primary labels configured"));
        }
        if labels.sub_labels.is_empty() {
            return Err(anyhow::anyhow!("No sub-labels configured"));
        }
        if !labels.primary.contains(&labels.distinguished) {
            return Err(anyhow::anyhow!(
                "Distinguished label '{}' is not a primary label",
                labels.distinguished
            ));
        }

        // Labels become folder names, so they must be single path components
        for set in [&labels.primary, &labels.sub_labels] {
            for (i, label) in set.iter().enumerate() {
                if !is_valid_component(label) {
                    return Err(anyhow::anyhow!("Invalid label name: '{}'", label));
                }
                if set.iter().skip(i + 1).any(|other| other == label) {
                    return Err(anyhow::anyhow!("Duplicate label: '{}'", label));
                }
            }
        }

        Ok(())
    }
}

fn is_valid_component(label: &str) -> bool {
    !label.trim().is_empty()
        && label != "."
        && label != ".."
        && !label.contains(['/', '\\', ':'])
}

// Configuration builder for easier setup
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn simulate(mut self, enabled: bool) -> Self {
        self.config.camera.simulate = enabled;
        self
    }

    pub fn square(mut self, target_size: Option<u32>) -> Self {
        self.config.capture.crop_to_square = true;
        self.config.capture.target_size = target_size;
        self
    }

    pub fn native(mut self) -> Self {
        self.config.capture.crop_to_square = false;
        self.config.capture.target_size = None;
        self
    }

    pub fn burst(mut self, count: u32, interval_ms: u64) -> Self {
        self.config.capture.mode = CaptureMode::Burst;
        self.config.capture.burst_count = count;
        self.config.capture.burst_interval_ms = interval_ms;
        self
    }

    pub fn settle_ms(mut self, ms: u64) -> Self {
        self.config.capture.settle_ms = ms;
        self
    }

    pub fn base_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config.paths.base_dir = dir;
        self
    }

    pub fn download_dir(mut self, dir: PathBuf) -> Self {
        self.config.paths.download_dir = dir;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// Presets matching the capture variants
impl Config {
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "native" => Some(Self::native()),
            "square_224" => Some(Self::square(224)),
            "square_512" => Some(Self::square(512)),
            "square_1024" => Some(Self::square(1024)),
            "burst" => Some(Self::burst()),
            _ => None,
        }
    }

    pub fn preset_names() -> &'static [&'static str] {
        &["native", "square_224", "square_512", "square_1024", "burst"]
    }

    pub fn native() -> Self {
        Config {
            capture: CaptureConfig {
                crop_to_square: false,
                target_size: None,
                ..Config::default().capture
            },
            ..Default::default()
        }
    }

    pub fn square(size: u32) -> Self {
        Config {
            capture: CaptureConfig {
                crop_to_square: true,
                target_size: Some(size),
                settle_ms: 220,
                ..Config::default().capture
            },
            ..Default::default()
        }
    }

    pub fn burst() -> Self {
        Config {
            capture: CaptureConfig {
                crop_to_square: false,
                target_size: None,
                mode: CaptureMode::Burst,
                burst_count: 5,
                burst_interval_ms: 150,
                settle_ms: 220,
                ..Config::default().capture
            },
            labels: LabelConfig {
                sub_labels: expanded_sub_labels(),
                ..Config::default().labels
            },
            ..Default::default()
        }
    }
}
