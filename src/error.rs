//! Error types for posepipe

use thiserror::Error;

/// Main error type for posepipe
#[derive(Error, Debug)]
pub enum PosePipeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Retarget error: {0}")]
    Retarget(#[from] RetargetError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Capture-side errors (extractor process, detection stream)
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open video source: {0}")]
    SourceUnavailable(String),

    #[error("Extractor subprocess error: {0}")]
    Subprocess(String),

    #[error("Malformed extractor event on line {line}: {message}")]
    MalformedEvent { line: usize, message: String },
}

/// Session document errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to read session {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse session JSON: {0}")]
    Parse(String),

    #[error("Failed to write session: {0}")]
    Write(String),

    #[error("Session metadata mismatch: {0}")]
    Metadata(String),

    #[error("Frame {frame} has unknown {part} landmark '{name}'")]
    UnknownLandmark {
        frame: u32,
        part: &'static str,
        name: String,
    },

    #[error("Frame index {frame} does not follow {previous}")]
    FrameOrder { previous: u32, frame: u32 },
}

/// Retargeting errors
#[derive(Error, Debug)]
pub enum RetargetError {
    #[error("Bone '{0}' has a zero-length rest direction")]
    DegenerateRestBone(String),

    #[error("Bone '{0}' not found in armature")]
    UnknownBone(String),

    #[error("Failed to load armature: {0}")]
    Armature(String),

    #[error("Failed to write animation clip: {0}")]
    Write(String),
}

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(String),

    #[error("No parts configured for export")]
    NoParts,
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

/// Result type alias for posepipe operations
pub type Result<T> = std::result::Result<T, PosePipeError>;
