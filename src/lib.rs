//! posepipe - Pose landmark capture and skeleton retargeting
//!
//! A small toolchain around an external pose-estimation model that:
//! - Records per-frame body and hand landmarks into a JSON session
//! - Streams live body landmarks as UDP datagrams while capturing
//! - Retargets a session onto a rig as shortest-arc bone rotations or
//!   marker positions
//! - Exports a flat per-frame CSV table for engine data-table import

pub mod capture;
pub mod config;
pub mod error;
pub mod output;
pub mod retarget;
pub mod session;
pub mod tracking;

pub use config::Config;
pub use error::{PosePipeError, Result};
pub use session::{FrameRecord, SessionDocument, SessionMetadata};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
