//! Capture module
//!
//! Records extractor detections into a session document.

pub mod pipeline;
pub mod recorder;

pub use pipeline::{run_capture, CaptureStats};
pub use recorder::{FrameRecorder, RecordOutcome, RecorderPolicy};
