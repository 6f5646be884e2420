use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::analysis::AnalysisSettings;
use crate::audio::spectrum::SpectrumSettings;
use crate::pitch::estimator::{frame_layout_is_reliable, EstimatorConfig};
use crate::session::live::LiveSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub spectrum: SpectrumConfig,
    #[serde(default)]
    pub spectrogram: SpectrogramConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    #[serde(default = "default_fmin")]
    pub fmin: f32,
    #[serde(default = "default_fmax")]
    pub fmax: f32,
    #[serde(default = "default_silence_rms")]
    pub silence_rms: f32,
    #[serde(default = "default_min_correlation")]
    pub min_correlation: f32,
}

#[derive(Debug, Deserialize)]
pub struct LiveConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f32,
}

#[derive(Debug, Deserialize)]
pub struct SpectrumConfig {
    #[serde(default = "default_smoothing_time_constant")]
    pub smoothing_time_constant: f32,
    #[serde(default = "default_min_decibels")]
    pub min_decibels: f32,
    #[serde(default = "default_max_decibels")]
    pub max_decibels: f32,
}

#[derive(Debug, Deserialize)]
pub struct SpectrogramConfig {
    #[serde(default = "default_spectrogram_width")]
    pub width: usize,
    #[serde(default = "default_spectrogram_height")]
    pub height: usize,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_scale")]
    pub scale: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadConfig {
    pub url: Option<String>,
    pub user_id: Option<String>,
    pub module_id: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_size: default_frame_size(),
            fmin: default_fmin(),
            fmax: default_fmax(),
            silence_rms: default_silence_rms(),
            min_correlation: default_min_correlation(),
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            smoothing_alpha: default_smoothing_alpha(),
        }
    }
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            smoothing_time_constant: default_smoothing_time_constant(),
            min_decibels: default_min_decibels(),
            max_decibels: default_max_decibels(),
        }
    }
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            width: default_spectrogram_width(),
            height: default_spectrogram_height(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
            crf: default_crf(),
            scale: default_scale(),
        }
    }
}

fn default_frame_size() -> usize { 2048 }
fn default_fmin() -> f32 { 80.0 }
fn default_fmax() -> f32 { 350.0 }
fn default_silence_rms() -> f32 { 0.01 }
fn default_min_correlation() -> f32 { 0.02 }
fn default_fps() -> u32 { 60 }
fn default_smoothing_alpha() -> f32 { 0.2 }
fn default_smoothing_time_constant() -> f32 { 0.8 }
fn default_min_decibels() -> f32 { -100.0 }
fn default_max_decibels() -> f32 { -30.0 }
fn default_spectrogram_width() -> usize { 360 }
fn default_spectrogram_height() -> usize { 120 }
fn default_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }
fn default_crf() -> u32 { 18 }
fn default_scale() -> u32 { 3 }

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.analysis;
        if !(a.fmin > 0.0 && a.fmin < a.fmax) {
            return Err(ConfigError::Invalid(format!(
                "analysis.fmin ({}) must be positive and below analysis.fmax ({})",
                a.fmin, a.fmax
            )));
        }
        if a.frame_size < 2 {
            return Err(ConfigError::Invalid(format!(
                "analysis.frame_size must be at least 2, got {}",
                a.frame_size
            )));
        }
        if ![44_100, 48_000]
            .iter()
            .any(|&rate| frame_layout_is_reliable(a.frame_size, rate))
        {
            log::warn!(
                "analysis.frame_size {} is untested at 44.1/48kHz; 2048 is recommended",
                a.frame_size
            );
        }
        if self.live.fps == 0 {
            return Err(ConfigError::Invalid("live.fps must be greater than 0".into()));
        }
        if !(0.0..=1.0).contains(&self.live.smoothing_alpha) {
            return Err(ConfigError::Invalid(format!(
                "live.smoothing_alpha must be within [0, 1], got {}",
                self.live.smoothing_alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.spectrum.smoothing_time_constant) {
            return Err(ConfigError::Invalid(format!(
                "spectrum.smoothing_time_constant must be within [0, 1], got {}",
                self.spectrum.smoothing_time_constant
            )));
        }
        if self.spectrum.min_decibels >= self.spectrum.max_decibels {
            return Err(ConfigError::Invalid(format!(
                "spectrum.min_decibels ({}) must be below spectrum.max_decibels ({})",
                self.spectrum.min_decibels, self.spectrum.max_decibels
            )));
        }
        Ok(())
    }

    pub fn estimator(&self) -> EstimatorConfig {
        EstimatorConfig {
            fmin: self.analysis.fmin,
            fmax: self.analysis.fmax,
            silence_rms: self.analysis.silence_rms,
            min_correlation: self.analysis.min_correlation,
        }
    }

    pub fn spectrum_settings(&self) -> SpectrumSettings {
        SpectrumSettings {
            smoothing_time_constant: self.spectrum.smoothing_time_constant,
            min_decibels: self.spectrum.min_decibels,
            max_decibels: self.spectrum.max_decibels,
        }
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            frame_size: self.analysis.frame_size,
            fps: self.live.fps,
            estimator: self.estimator(),
            spectrum: self.spectrum_settings(),
        }
    }

    /// A zero-sized spectrogram disables the render target.
    pub fn live_settings(&self) -> LiveSettings {
        let SpectrogramConfig { width, height } = self.spectrogram;
        LiveSettings {
            estimator: self.estimator(),
            smoothing_alpha: self.live.smoothing_alpha,
            spectrogram: (width > 0 && height > 0).then_some((width, height)),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Explicit path, then `./voxpitch.toml`, then the user's config directories.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("voxpitch.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("voxpitch").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("voxpitch").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
