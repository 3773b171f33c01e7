//! Tracking module
//!
//! Landmark acquisition and live streaming:
//! - Landmark schema and point types
//! - Extractor NDJSON event stream and subprocess manager
//! - UDP datagram sender

pub mod extractor;
pub mod landmark;
pub mod sender;
pub mod subprocess;

pub use extractor::{DetectionSource, FrameEvent, NdjsonSource, RawDetection, SourceInfo};
pub use landmark::{BodySchema, LandmarkPoint, LandmarkSet};
pub use sender::DatagramSender;
pub use subprocess::ExtractorProcess;
