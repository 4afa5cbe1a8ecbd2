use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::InferenceParams;
use crate::ingest::CaptureConfig;
use crate::motion::{MogParams, MotionParams, MAX_KERNEL_SIZE};
use crate::render::RenderStyle;
use crate::snapshot::DEFAULT_SNAPSHOT_DIR;

const DEFAULT_MODEL: &str = "yolov8n.onnx";
const DEFAULT_CONF_THRESHOLD: f32 = 0.35;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_MOTION_HISTORY: u32 = 5;
const DEFAULT_MOTION_AREA_THRESHOLD: f64 = 500.0;
const DEFAULT_SOURCE: &str = "stub://moving";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 10;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_MODEL_HISTORY: u32 = 500;
const DEFAULT_VAR_THRESHOLD: f32 = 16.0;
const DEFAULT_KERNEL_SIZE: usize = 3;
const DEFAULT_DILATE_ITERATIONS: u32 = 2;
const DEFAULT_MOTION_THRESHOLD: f64 = 10.0;
const DEFAULT_OVERLAY_ALPHA: f32 = 0.9;
const DEFAULT_STATUS_ADDR: &str = "127.0.0.1:8000";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "FUSION_CONFIG";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FusionConfigFile {
    model: Option<String>,
    conf_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    motion_history: Option<u32>,
    motion_area_threshold: Option<f64>,
    capture: Option<CaptureConfigFile>,
    detector: Option<DetectorConfigFile>,
    motion: Option<MotionConfigFile>,
    render: Option<RenderConfigFile>,
    snapshot: Option<SnapshotConfigFile>,
    status: Option<StatusConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    input_size: Option<u32>,
    labels: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MotionConfigFile {
    model_history: Option<u32>,
    var_threshold: Option<f32>,
    kernel_size: Option<usize>,
    dilate_iterations: Option<u32>,
    detect_shadows: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RenderConfigFile {
    motion_threshold: Option<f64>,
    overlay_alpha: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SnapshotConfigFile {
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StatusConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DisplayConfigFile {
    preview_path: Option<PathBuf>,
}

/// Resolved configuration for `fusiond` and `status_api`.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    /// Model path, or `stub` for the built-in stub backend.
    pub model: String,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    /// Recognised for compatibility; the background model uses `motion.model_history`.
    pub motion_history: u32,
    pub motion_area_threshold: f64,
    pub capture: CaptureSettings,
    pub detector: DetectorSettings,
    pub motion: MotionSettings,
    pub render: RenderSettings,
    pub snapshot_dir: PathBuf,
    pub status_addr: String,
    pub preview_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorSettings {
    pub input_size: u32,
    pub labels: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionSettings {
    pub model_history: u32,
    pub var_threshold: f32,
    pub kernel_size: usize,
    pub dilate_iterations: u32,
    pub detect_shadows: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub motion_threshold: f64,
    pub overlay_alpha: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        // The empty file always resolves.
        Self::from_file(FusionConfigFile::default())
    }
}

impl FusionConfig {
    /// Load from `$FUSION_CONFIG` (if set), then apply env overrides and validate.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load from an explicit file (or defaults when `None`), then apply env
    /// overrides and validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => FusionConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        log::debug!("resolved config: {:?}", cfg);
        Ok(cfg)
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file_cfg: FusionConfigFile = toml::from_str(raw).context("invalid config")?;
        let cfg = Self::from_file(file_cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FusionConfigFile) -> Self {
        let capture = file.capture.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let motion = file.motion.unwrap_or_default();
        let render = file.render.unwrap_or_default();
        Self {
            model: file.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            conf_threshold: file.conf_threshold.unwrap_or(DEFAULT_CONF_THRESHOLD),
            iou_threshold: file.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            motion_history: file.motion_history.unwrap_or(DEFAULT_MOTION_HISTORY),
            motion_area_threshold: file
                .motion_area_threshold
                .unwrap_or(DEFAULT_MOTION_AREA_THRESHOLD),
            capture: CaptureSettings {
                source: capture.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
                width: capture.width.unwrap_or(DEFAULT_WIDTH),
                height: capture.height.unwrap_or(DEFAULT_HEIGHT),
                fps: capture.fps.unwrap_or(DEFAULT_FPS),
            },
            detector: DetectorSettings {
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                labels: detector.labels,
            },
            motion: MotionSettings {
                model_history: motion.model_history.unwrap_or(DEFAULT_MODEL_HISTORY),
                var_threshold: motion.var_threshold.unwrap_or(DEFAULT_VAR_THRESHOLD),
                kernel_size: motion.kernel_size.unwrap_or(DEFAULT_KERNEL_SIZE),
                dilate_iterations: motion.dilate_iterations.unwrap_or(DEFAULT_DILATE_ITERATIONS),
                detect_shadows: motion.detect_shadows.unwrap_or(true),
            },
            render: RenderSettings {
                motion_threshold: render.motion_threshold.unwrap_or(DEFAULT_MOTION_THRESHOLD),
                overlay_alpha: render.overlay_alpha.unwrap_or(DEFAULT_OVERLAY_ALPHA),
            },
            snapshot_dir: file
                .snapshot
                .and_then(|s| s.dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            status_addr: file
                .status
                .and_then(|s| s.addr)
                .unwrap_or_else(|| DEFAULT_STATUS_ADDR.to_string()),
            preview_path: file.display.and_then(|d| d.preview_path),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(model) = env_value("FUSION_MODEL") {
            self.model = model;
        }
        if let Some(source) = env_value("FUSION_SOURCE") {
            self.capture.source = source;
        }
        if let Some(dir) = env_value("FUSION_SNAPSHOT_DIR") {
            self.snapshot_dir = PathBuf::from(dir);
        }
        if let Some(addr) = env_value("FUSION_STATUS_ADDR") {
            self.status_addr = addr;
        }
        if let Some(conf) = env_value("FUSION_CONF_THRESHOLD") {
            self.conf_threshold = conf
                .parse()
                .map_err(|_| anyhow!("FUSION_CONF_THRESHOLD must be a number"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must not be empty"));
        }
        check_unit("conf_threshold", self.conf_threshold)?;
        check_unit("iou_threshold", self.iou_threshold)?;
        check_unit("render.overlay_alpha", self.render.overlay_alpha)?;
        if !(self.motion_area_threshold.is_finite() && self.motion_area_threshold > 0.0) {
            return Err(anyhow!("motion_area_threshold must be greater than zero"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector.input_size must be greater than zero"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture width and height must be greater than zero"));
        }
        if self.motion.kernel_size % 2 == 0 || self.motion.kernel_size > MAX_KERNEL_SIZE {
            return Err(anyhow!(
                "motion.kernel_size must be odd and at most {}",
                MAX_KERNEL_SIZE
            ));
        }
        if self.motion.model_history == 0 {
            return Err(anyhow!("motion.model_history must be greater than zero"));
        }
        if !(self.motion.var_threshold.is_finite() && self.motion.var_threshold > 0.0) {
            return Err(anyhow!("motion.var_threshold must be greater than zero"));
        }
        if !self.render.motion_threshold.is_finite() {
            return Err(anyhow!("render.motion_threshold must be a finite number"));
        }
        Ok(())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            source: self.capture.source.clone(),
            width: self.capture.width,
            height: self.capture.height,
            target_fps: self.capture.fps,
        }
    }

    pub fn inference_params(&self) -> InferenceParams {
        InferenceParams {
            conf_threshold: self.conf_threshold,
            iou_threshold: self.iou_threshold,
            input_size: self.detector.input_size,
        }
    }

    pub fn motion_params(&self) -> MotionParams {
        MotionParams {
            area_threshold: self.motion_area_threshold,
            kernel_size: self.motion.kernel_size,
            dilate_iterations: self.motion.dilate_iterations,
            background: MogParams {
                history: self.motion.model_history,
                var_threshold: self.motion.var_threshold,
                detect_shadows: self.motion.detect_shadows,
                ..MogParams::default()
            },
        }
    }

    pub fn render_style(&self) -> RenderStyle {
        RenderStyle {
            motion_threshold: self.render.motion_threshold,
            overlay_alpha: self.render.overlay_alpha,
            ..RenderStyle::default()
        }
    }
}

fn read_config_file(path: &Path) -> Result<FusionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() -> Result<()> {
        let cfg = FusionConfig::from_toml_str("")?;
        assert_eq!(cfg, FusionConfig::default());
        assert_eq!(cfg.model, "yolov8n.onnx");
        assert_eq!(cfg.conf_threshold, 0.35);
        assert_eq!(cfg.iou_threshold, 0.45);
        assert_eq!(cfg.motion_history, 5);
        assert_eq!(cfg.motion_area_threshold, 500.0);
        assert_eq!(cfg.snapshot_dir, PathBuf::from("snapshots"));
        assert_eq!(cfg.motion_params().background.history, 500);
        Ok(())
    }

    #[test]
    fn sections_map_onto_component_params() -> Result<()> {
        let cfg = FusionConfig::from_toml_str(
            r#"
            model = "stub"
            motion_area_threshold = 120
            [motion]
            kernel_size = 5
            dilate_iterations = 1
            detect_shadows = false
            [render]
            motion_threshold = 25.0
            overlay_alpha = 1.0
            [detector]
            input_size = 320
            "#,
        )?;
        let motion = cfg.motion_params();
        assert_eq!(motion.area_threshold, 120.0);
        assert_eq!(motion.kernel_size, 5);
        assert!(!motion.background.detect_shadows);
        assert_eq!(cfg.render_style().motion_threshold, 25.0);
        assert_eq!(cfg.inference_params().input_size, 320);
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(FusionConfig::from_toml_str("conf_threshold = 1.5").is_err());
        assert!(FusionConfig::from_toml_str("[motion]\nkernel_size = 4").is_err());
        assert!(FusionConfig::from_toml_str("[motion]\nkernel_size = 257").is_err());
        assert!(FusionConfig::from_toml_str("motion_area_threshold = 0").is_err());
        assert!(FusionConfig::from_toml_str("unknown_key = 1").is_err());
    }
}
