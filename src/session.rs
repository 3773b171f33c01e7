//! Session document: capture metadata plus the recorded frame sequence

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::SessionError;
use crate::tracking::landmark::LandmarkSet;

/// Frame rate used when the source reports none or an implausible one
pub const DEFAULT_FPS: u32 = 30;
/// Highest source frame rate taken at face value
pub const MAX_FPS: u32 = 120;

/// Clamp a reported source frame rate into `(0, MAX_FPS]`.
///
/// Fractional rates are truncated (29.97 becomes 29).
pub fn clamp_fps(reported: f64) -> u32 {
    if !reported.is_finite() {
        return DEFAULT_FPS;
    }
    let fps = reported.trunc();
    if fps <= 0.0 || fps > MAX_FPS as f64 {
        DEFAULT_FPS
    } else {
        fps as u32
    }
}

/// Where frame timestamps start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampOrigin {
    /// First frame at t = 0: `(frame - 1) / fps`
    ZeroBased,
    /// First frame at t = 1/fps: `frame / fps`
    OneBased,
}

impl Default for TimestampOrigin {
    fn default() -> Self {
        Self::ZeroBased
    }
}

impl TimestampOrigin {
    pub fn timestamp(&self, frame: u32, fps: u32) -> f64 {
        let fps = fps.max(1) as f64;
        match self {
            Self::ZeroBased => frame.saturating_sub(1) as f64 / fps,
            Self::OneBased => frame as f64 / fps,
        }
    }
}

/// One recorded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// 1-based source frame index
    pub frame: u32,
    /// Seconds since the start of the session
    pub timestamp: f64,
    #[serde(alias = "body_landmarks")]
    pub body: LandmarkSet,
    #[serde(default, alias = "left_hand_landmarks")]
    pub left_hand: LandmarkSet,
    #[serde(default, alias = "right_hand_landmarks")]
    pub right_hand: LandmarkSet,
}

/// Session-level capture properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Clamped integer frame rate
    pub fps: u32,
    /// Number of frames retained in the document
    pub total_frames: u32,
    /// Number of source frames read, including skipped and rejected ones
    #[serde(default)]
    pub processed_frames: u32,
    /// `total_frames / fps` in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Ordered body landmark schema
    #[serde(alias = "body_parts")]
    pub body_landmarks: Vec<String>,
    /// Ordered hand landmark schema (same for both hands)
    #[serde(default)]
    pub hand_landmarks: Vec<String>,
    #[serde(default)]
    pub body_count: usize,
    #[serde(default)]
    pub hand_count_per_hand: usize,
    #[serde(default)]
    pub timestamp_origin: TimestampOrigin,
}

impl SessionMetadata {
    /// Metadata for an empty session
    pub fn new(
        reported_fps: f64,
        width: u32,
        height: u32,
        body_landmarks: Vec<String>,
        hand_landmarks: Vec<String>,
        timestamp_origin: TimestampOrigin,
    ) -> Self {
        let fps = clamp_fps(reported_fps);
        if fps as f64 != reported_fps.trunc() {
            tracing::debug!("Source reported {} fps, using {}", reported_fps, fps);
        }

        Self {
            fps,
            total_frames: 0,
            processed_frames: 0,
            duration: 0.0,
            width,
            height,
            body_count: body_landmarks.len(),
            hand_count_per_hand: hand_landmarks.len(),
            body_landmarks,
            hand_landmarks,
            timestamp_origin,
        }
    }

    /// Set frame counts and the derived duration
    pub fn with_counts(mut self, retained: u32, processed: u32) -> Self {
        self.total_frames = retained;
        self.processed_frames = processed;
        self.duration = retained as f64 / self.fps as f64;
        self
    }
}

/// A complete capture session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub frames: Vec<FrameRecord>,
}

impl SessionDocument {
    /// Write pretty-printed JSON (2-space indent)
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), SessionError> {
        serde_json::to_writer_pretty(writer, self).map_err(|e| SessionError::Write(e.to_string()))
    }

    /// Write single-line JSON
    pub fn to_writer_compact<W: Write>(&self, writer: W) -> Result<(), SessionError> {
        serde_json::to_writer(writer, self).map_err(|e| SessionError::Write(e.to_string()))
    }

    /// Parse and validate a session
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SessionError> {
        let doc: Self =
            serde_json::from_reader(reader).map_err(|e| SessionError::Parse(e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn from_json(s: &str) -> Result<Self, SessionError> {
        Self::from_reader(s.as_bytes())
    }

    /// Write the session to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SessionError> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| SessionError::Write(format!("{}: {}", path.display(), e)))?;
        let mut writer = BufWriter::new(file);
        self.to_writer(&mut writer)?;
        writer
            .flush()
            .map_err(|e| SessionError::Write(format!("{}: {}", path.display(), e)))?;

        tracing::info!(
            "Saved {} frames ({:.2}s) to {}",
            self.metadata.total_frames,
            self.metadata.duration,
            path.display()
        );
        Ok(())
    }

    /// Read and validate a session from `path`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SessionError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let doc = Self::from_reader(BufReader::new(file))?;

        tracing::info!(
            "Loaded {} frames at {} fps ({:.2}s) from {}",
            doc.metadata.total_frames,
            doc.metadata.fps,
            doc.metadata.duration,
            path.display()
        );
        Ok(doc)
    }

    /// First and last frame index, `None` for an empty session
    pub fn frame_range(&self) -> Option<(u32, u32)> {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => Some((first.frame, last.frame)),
            _ => None,
        }
    }

    /// Check the document invariants
    pub fn validate(&self) -> Result<(), SessionError> {
        let meta = &self.metadata;

        if meta.fps == 0 || meta.fps > MAX_FPS {
            return Err(SessionError::Metadata(format!(
                "fps {} outside (0, {}]",
                meta.fps, MAX_FPS
            )));
        }

        if meta.total_frames as usize != self.frames.len() {
            return Err(SessionError::Metadata(format!(
                "total_frames is {} but document holds {} frames",
                meta.total_frames,
                self.frames.len()
            )));
        }

        let expected = meta.total_frames as f64 / meta.fps as f64;
        if (meta.duration - expected).abs() > 1e-6 {
            return Err(SessionError::Metadata(format!(
                "duration {} does not match {} frames at {} fps",
                meta.duration, meta.total_frames, meta.fps
            )));
        }

        let mut previous = 0;
        for frame in &self.frames {
            if frame.frame <= previous {
                return Err(SessionError::FrameOrder {
                    previous,
                    frame: frame.frame,
                });
            }
            previous = frame.frame;

            check_keys(frame.frame, "body", &frame.body, &meta.body_landmarks)?;
            check_keys(frame.frame, "left_hand", &frame.left_hand, &meta.hand_landmarks)?;
            check_keys(frame.frame, "right_hand", &frame.right_hand, &meta.hand_landmarks)?;
        }

        Ok(())
    }
}

fn check_keys(
    frame: u32,
    part: &'static str,
    set: &LandmarkSet,
    schema: &[String],
) -> Result<(), SessionError> {
    match set.names().find(|name| !schema.iter().any(|s| s == name)) {
        Some(name) => Err(SessionError::UnknownLandmark {
            frame,
            part,
            name: name.to_string(),
        }),
        None => Ok(()),
    }
}
