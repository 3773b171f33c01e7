//! Retargeting module
//!
//! Replays a recorded session onto a rig:
//! - Coordinate transforms from capture space to world space
//! - Bone and marker mapping tables
//! - Shortest-arc rotation and marker position solving
//! - The `Rig` seam and an in-memory keyframe clip

pub mod mapping;
pub mod rig;
pub mod solve;
pub mod transform;

pub use mapping::{BodyPart, BoneMapping, BoneSegment, Marker, MarkerMapping};
pub use rig::{AnimationClip, Armature, Channel, Rig, RigBone, Track};
pub use solve::{
    apply_positions, apply_rotations, solve_markers, solve_rotations, PositionKey, RestPose,
    RotationKey,
};
pub use transform::CoordinateTransform;

use crate::config::RetargetConfig;
use crate::error::RetargetError;
use crate::session::SessionDocument;

/// Which channel a retarget run keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetargetMode {
    /// Bone rotations from landmark pairs
    Rotations,
    /// Marker locations from single landmarks
    Markers,
}

/// Retarget a session into a keyframe clip.
///
/// The clip's frame range spans `1..=total_frames` of the session, or the
/// last keyed frame if that is later.
pub fn retarget_session(
    doc: &SessionDocument,
    config: &RetargetConfig,
    mode: RetargetMode,
) -> Result<AnimationClip, RetargetError> {
    let fps = doc.metadata.fps;

    let mut clip = match mode {
        RetargetMode::Rotations => {
            let armature = load_armature(doc, config)?;
            let mut clip = AnimationClip::new(fps, &armature);
            let rest = RestPose::from_bones(&clip.bones())?;
            let keys = solve_rotations(doc, &config.bones, &rest, &config.transform);

            clip.set_frame_range(1, doc.metadata.total_frames);
            let applied = apply_rotations(&mut clip, &keys)?;
            tracing::info!("Keyed {} bone rotations", applied);
            clip
        }
        RetargetMode::Markers => {
            let keys = solve_markers(doc, &config.markers, &config.marker_transform);

            let mut clip = AnimationClip::for_markers(fps, &config.markers);
            clip.set_frame_range(1, doc.metadata.total_frames);
            let applied = apply_positions(&mut clip, &keys)?;
            tracing::info!("Keyed {} marker locations", applied);
            clip
        }
    };

    if let Some((_, last)) = doc.frame_range() {
        clip.frame_end = clip.frame_end.max(last);
    }

    Ok(clip)
}

/// Rest armature for a rotation run: a session frame, a TOML file, or the
/// built-in T-pose, in that order of precedence
fn load_armature(
    doc: &SessionDocument,
    config: &RetargetConfig,
) -> Result<Armature, RetargetError> {
    if let Some(index) = config.armature_from_frame {
        let frame = doc
            .frames
            .iter()
            .find(|f| f.frame == index)
            .ok_or_else(|| RetargetError::Armature(format!("session has no frame {}", index)))?;
        return Armature::from_frame(frame, &config.bones, &config.transform);
    }

    match &config.armature {
        Some(path) => {
            tracing::info!("Loading armature from: {}", path.display());
            Armature::from_file(path)
        }
        None => Ok(Armature::default_body()),
    }
}
