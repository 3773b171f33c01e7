//! Landmark extractor event stream
//!
//! The pose-estimation model runs out of process and writes one JSON object
//! per line:
//!
//! ```text
//! {"type":"source","fps":29.97,"width":1280,"height":720}
//! {"type":"frame","body":[{"x":0.5,"y":0.4,"z":-0.1,"visibility":0.98}, ...],"hands":[...]}
//! {"type":"error","message":"graph timeout"}
//! ```
//!
//! `body` is indexed by MediaPipe pose index and is `null` when no person was
//! found. Each hand carries an optional handedness label.

use serde::{Deserialize, Serialize};
use std::io::BufRead;

use crate::error::CaptureError;
use crate::tracking::landmark::LandmarkPoint;

/// Video source properties reported by the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Nominal frame rate as reported by the container/camera (may be 0)
    #[serde(default)]
    pub fps: f64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Total frames in the container, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u64>,
}

impl Default for SourceInfo {
    fn default() -> Self {
        Self {
            fps: 0.0,
            width: 0,
            height: 0,
            frame_count: None,
        }
    }
}

/// One detected hand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawHand {
    /// "Left" / "Right" as classified by the extractor
    #[serde(default)]
    pub handedness: Option<String>,
    /// Points indexed by hand landmark index
    #[serde(default)]
    pub landmarks: Vec<Option<LandmarkPoint>>,
}

/// Raw extractor output for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Points indexed by pose landmark index; `None` when no body detected
    #[serde(default)]
    pub body: Option<Vec<Option<LandmarkPoint>>>,
    #[serde(default)]
    pub hands: Vec<RawHand>,
}

/// Wire format of one extractor line
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ExtractorEvent {
    Source(SourceInfo),
    Frame(RawDetection),
    Error { message: String },
}

/// A frame read from the detection stream
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    /// Detection succeeded (possibly with nothing detected)
    Detected(RawDetection),
    /// Detection failed for this frame; the frame is skipped
    Failed(String),
}

/// Ordered per-frame detections from a video source
pub trait DetectionSource {
    /// Properties of the underlying video source
    fn source_info(&self) -> &SourceInfo;

    /// Next frame, or `None` once the source is exhausted
    fn next_event(&mut self) -> Result<Option<FrameEvent>, CaptureError>;
}

/// Newline-delimited JSON detection stream over any reader
pub struct NdjsonSource<R> {
    reader: R,
    info: SourceInfo,
    pending: Option<FrameEvent>,
    line_no: usize,
    buf: Vec<u8>,
    header: bool,
}

impl<R: BufRead> NdjsonSource<R> {
    /// Wrap a reader, consuming the leading `source` event if there is one.
    ///
    /// Without a `source` header the stream is still usable; the fps falls
    /// back to the session default later on.
    pub fn new(reader: R) -> Result<Self, CaptureError> {
        let mut source = Self {
            reader,
            info: SourceInfo::default(),
            pending: None,
            line_no: 0,
            buf: Vec::new(),
            header: false,
        };

        match source.read_event()? {
            Some(ParsedLine::Source(info)) => {
                source.info = info;
                source.header = true;
            }
            Some(ParsedLine::Frame(event)) => {
                tracing::warn!("Extractor stream has no source header, using defaults");
                source.pending = Some(event);
            }
            None => {}
        }

        Ok(source)
    }

    /// Whether the stream produced anything at all before ending
    pub fn opened(&self) -> bool {
        self.header || self.pending.is_some() || self.line_no > 0
    }

    fn read_event(&mut self) -> Result<Option<ParsedLine>, CaptureError> {
        loop {
            self.buf.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .map_err(|e| CaptureError::Subprocess(format!("Failed to read extractor output: {}", e)))?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    return Ok(Some(ParsedLine::Frame(FrameEvent::Failed(
                        CaptureError::MalformedEvent {
                            line: self.line_no,
                            message: e.to_string(),
                        }
                        .to_string(),
                    ))));
                }
            };
            if line.is_empty() {
                continue;
            }

            let parsed = match serde_json::from_str::<ExtractorEvent>(line) {
                Ok(ExtractorEvent::Source(info)) => ParsedLine::Source(info),
                Ok(ExtractorEvent::Frame(det)) => ParsedLine::Frame(FrameEvent::Detected(det)),
                Ok(ExtractorEvent::Error { message }) => {
                    ParsedLine::Frame(FrameEvent::Failed(message))
                }
                Err(e) => ParsedLine::Frame(FrameEvent::Failed(
                    CaptureError::MalformedEvent {
                        line: self.line_no,
                        message: e.to_string(),
                    }
                    .to_string(),
                )),
            };
            return Ok(Some(parsed));
        }
    }
}

enum ParsedLine {
    Source(SourceInfo),
    Frame(FrameEvent),
}

impl<R: BufRead> DetectionSource for NdjsonSource<R> {
    fn source_info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_event(&mut self) -> Result<Option<FrameEvent>, CaptureError> {
        if let Some(event) = self.pending.take() {
            return Ok(Some(event));
        }

        loop {
            match self.read_event()? {
                Some(ParsedLine::Frame(event)) => return Ok(Some(event)),
                Some(ParsedLine::Source(_)) => {
                    tracing::debug!("Ignoring repeated source header on line {}", self.line_no);
                }
                None => return Ok(None),
            }
        }
    }
}
