//! Configuration parsing and management for posepipe

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::recorder::RecorderPolicy;
use crate::error::{ConfigError, PosePipeError};
use crate::retarget::mapping::{BoneMapping, MarkerMapping};
use crate::retarget::transform::CoordinateTransform;
use crate::session::TimestampOrigin;
use crate::tracking::landmark::{pose_index, BodySchema};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub retarget: RetargetConfig,
    pub export: ExportConfig,
    pub sender: SenderConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PosePipeError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(s: &str) -> Result<Self, PosePipeError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from `$POSEPIPE_CONFIG` or the first file found
    /// on [`Config::search_paths`]
    pub fn load() -> Result<Self, PosePipeError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            let path = PathBuf::from(path);
            tracing::info!("Loading config from {}: {}", CONFIG_ENV, path.display());
            return Self::from_file(path);
        }

        match Self::search_paths().into_iter().find(|path| path.is_file()) {
            Some(path) => {
                tracing::info!("Loading config from: {}", path.display());
                Self::from_file(path)
            }
            None => {
                tracing::info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Candidate config files, highest priority first: the working
    /// directory, the project `config/` dir, then the user config dir
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("posepipe.toml"),
            PathBuf::from("config").join("default.toml"),
        ];
        paths.extend(user_config_dir().map(|dir| dir.join("config.toml")));
        paths
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), PosePipeError> {
        let policy = self.capture.policy();
        if let Some(threshold) = policy.visibility_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(invalid(
                    "capture.visibility_threshold",
                    "Threshold must be between 0.0 and 1.0",
                ));
            }
        }

        let body = self.capture.body_landmarks();
        if let Some(min) = policy.min_visible_body {
            if min > body.len() {
                return Err(invalid(
                    "capture.min_visible_body",
                    &format!("Cannot require {} of {} body landmarks", min, body.len()),
                ));
            }
        }

        if let Some(unknown) = body.iter().find(|name| pose_index(name).is_none()) {
            return Err(invalid(
                "capture.body_landmarks",
                &format!("Unknown pose landmark '{}'", unknown),
            ));
        }

        if self.capture.progress_interval == 0 {
            return Err(invalid(
                "capture.progress_interval",
                "Progress interval must be greater than 0",
            ));
        }

        if self.capture.extractor.command.trim().is_empty() {
            return Err(invalid(
                "capture.extractor.command",
                "Extractor command must not be empty",
            ));
        }

        for (field, transform) in [
            ("retarget.transform", &self.retarget.transform),
            ("retarget.marker_transform", &self.retarget.marker_transform),
            ("export.transform", &self.export.transform),
        ] {
            let scale = transform.scale();
            if !scale.is_finite() || scale == 0.0 {
                return Err(invalid(field, "Scale must be finite and non-zero"));
            }
        }

        if self.retarget.bones.is_empty() {
            return Err(invalid("retarget.bones", "Bone mapping must not be empty"));
        }

        if self.export.parts.is_empty() {
            return Err(invalid("export.parts", "At least one part must be exported"));
        }

        if self.export.precision > 6 {
            return Err(invalid(
                "export.precision",
                "Precision must be between 0 and 6 decimals",
            ));
        }

        if self.sender.port == 0 {
            return Err(invalid("sender.port", "Port must be greater than 0"));
        }

        if self.sender.address.trim().is_empty() {
            return Err(invalid("sender.address", "Address must not be empty"));
        }

        if self.retarget.armature_from_frame == Some(0) {
            return Err(invalid(
                "retarget.armature_from_frame",
                "Frame indices start at 1",
            ));
        }

        if let Some(path) = &self.retarget.armature {
            if self.retarget.armature_from_frame.is_some() {
                tracing::warn!(
                    "retarget.armature_from_frame is set, ignoring {}",
                    path.display()
                );
            } else if !path.exists() {
                tracing::warn!("Armature file not found at: {}", path.display());
            }
        }

        Ok(())
    }
}

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "POSEPIPE_CONFIG";

fn invalid(field: &str, message: &str) -> PosePipeError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Starting point for the recorder policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePreset {
    /// Record every frame and every point
    #[default]
    Raw,
    /// [`RecorderPolicy::filtered`]
    Filtered,
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Body landmark preset
    pub schema: BodySchema,
    /// Recorder policy preset; the explicit fields below override it
    pub preset: CapturePreset,
    /// Explicit body landmark list, overrides `schema`
    pub body_landmarks: Option<Vec<String>>,
    /// Body points at or below this visibility are recorded as absent
    pub visibility_threshold: Option<f32>,
    /// Minimum present body points for a frame to be kept
    pub min_visible_body: Option<usize>,
    pub timestamp_origin: TimestampOrigin,
    /// Log progress every N processed frames
    pub progress_interval: u32,
    pub extractor: ExtractorConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            schema: BodySchema::default(),
            preset: CapturePreset::default(),
            body_landmarks: None,
            visibility_threshold: None,
            min_visible_body: None,
            timestamp_origin: TimestampOrigin::default(),
            progress_interval: 30,
            extractor: ExtractorConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Ordered body landmark names to record
    pub fn body_landmarks(&self) -> Vec<String> {
        match &self.body_landmarks {
            Some(names) => names.clone(),
            None => self.schema.names().into_iter().map(String::from).collect(),
        }
    }

    pub fn policy(&self) -> RecorderPolicy {
        let base = match self.preset {
            CapturePreset::Raw => RecorderPolicy::default(),
            CapturePreset::Filtered => RecorderPolicy::filtered(),
        };
        RecorderPolicy {
            visibility_threshold: self.visibility_threshold.or(base.visibility_threshold),
            min_visible_body: self.min_visible_body.or(base.min_visible_body),
            timestamp_origin: self.timestamp_origin,
        }
    }
}

/// External landmark extractor process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Executable to launch
    pub command: String,
    /// Arguments passed before `--source <source>`
    pub args: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            command: "python3".to_string(),
            args: vec!["scripts/extract_landmarks.py".to_string()],
        }
    }
}

/// Retargeting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetargetConfig {
    /// Transform used for bone directions
    pub transform: CoordinateTransform,
    /// Transform used for position markers
    pub marker_transform: CoordinateTransform,
    pub bones: BoneMapping,
    pub markers: MarkerMapping,
    /// Rest armature TOML; the built-in T-pose is used when unset
    pub armature: Option<PathBuf>,
    /// Take the rest armature from this session frame instead of `armature`
    pub armature_from_frame: Option<u32>,
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            transform: CoordinateTransform::YUp { scale: 3.0 },
            marker_transform: CoordinateTransform::ZUp { scale: 1.5 },
            bones: BoneMapping::default(),
            markers: MarkerMapping::default(),
            armature: None,
            armature_from_frame: None,
        }
    }
}

/// CSV export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Ordered body landmark names, one X/Y/Z column triple each
    pub parts: Vec<String>,
    pub transform: CoordinateTransform,
    /// Add a `<part>_Valid` column per part
    pub include_presence: bool,
    /// Decimal places for coordinates
    pub precision: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            parts: BodySchema::Unreal
                .names()
                .into_iter()
                .map(String::from)
                .collect(),
            transform: CoordinateTransform::Unreal { scale: 200.0 },
            include_presence: false,
            precision: 2,
        }
    }
}

/// Live UDP landmark stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Stream during capture even without `--stream`
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1".to_string(),
            port: 5052,
        }
    }
}

/// Per-user posepipe directory, if the platform's base dir is known
fn user_config_dir() -> Option<PathBuf> {
    let env_dir = |var: &str| std::env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from);

    let base = if cfg!(target_os = "windows") {
        env_dir("APPDATA")
    } else if cfg!(target_os = "macos") {
        env_dir("HOME").map(|home| home.join("Library").join("Application Support"))
    } else {
        env_dir("XDG_CONFIG_HOME").or_else(|| env_dir("HOME").map(|home| home.join(".config")))
    };

    base.map(|dir| dir.join("posepipe"))
}
