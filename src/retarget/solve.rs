//! Rotation and position solvers
//!
//! Both solvers are pure functions of the session, the mapping tables, the
//! rest pose and the coordinate transform. Applying the result to a host is a
//! separate step through [`Rig`].

use glam::{Quat, Vec3};
use std::collections::{HashMap, HashSet};

use crate::error::RetargetError;
use crate::retarget::mapping::{BodyPart, BoneMapping, MarkerMapping};
use crate::retarget::rig::{Armature, Channel, Rig, RigBone};
use crate::retarget::transform::CoordinateTransform;
use crate::session::{FrameRecord, SessionDocument};
use crate::tracking::landmark::LandmarkSet;

/// Rest-pose direction per bone (unit vectors)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestPose {
    directions: HashMap<String, Vec3>,
}

impl RestPose {
    /// Rest directions from head/tail of each bone
    pub fn from_bones(bones: &[RigBone]) -> Result<Self, RetargetError> {
        let mut directions = HashMap::with_capacity(bones.len());
        for bone in bones {
            let dir = bone
                .rest_direction()
                .ok_or_else(|| RetargetError::DegenerateRestBone(bone.name.clone()))?;
            directions.insert(bone.name.clone(), dir);
        }
        Ok(Self { directions })
    }

    pub fn from_armature(armature: &Armature) -> Result<Self, RetargetError> {
        Self::from_bones(&armature.bones)
    }

    /// Insert a rest direction; it is normalized first
    pub fn insert(&mut self, bone: &str, direction: Vec3) -> Result<(), RetargetError> {
        let dir = direction
            .try_normalize()
            .ok_or_else(|| RetargetError::DegenerateRestBone(bone.to_string()))?;
        self.directions.insert(bone.to_string(), dir);
        Ok(())
    }

    pub fn direction(&self, bone: &str) -> Option<Vec3> {
        self.directions.get(bone).copied()
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }
}

/// One bone rotation at one frame
#[derive(Debug, Clone, PartialEq)]
pub struct RotationKey {
    pub bone: String,
    pub frame: u32,
    /// Shortest-arc rotation from the rest direction to the tracked direction
    pub rotation: Quat,
}

/// One marker position at one frame
#[derive(Debug, Clone, PartialEq)]
pub struct PositionKey {
    pub marker: String,
    pub frame: u32,
    pub location: Vec3,
}

/// Compute per-frame bone rotations.
///
/// A bone gets no key for a frame when either endpoint landmark is absent or
/// the endpoints coincide. Bones missing from `rest` are skipped entirely.
/// Keys are ordered by frame, then by mapping order.
pub fn solve_rotations(
    doc: &SessionDocument,
    mapping: &BoneMapping,
    rest: &RestPose,
    transform: &CoordinateTransform,
) -> Vec<RotationKey> {
    let segments: Vec<_> = mapping
        .segments()
        .iter()
        .filter_map(|seg| match rest.direction(&seg.bone) {
            Some(dir) => Some((seg, dir)),
            None => {
                tracing::warn!("Bone '{}' has no rest direction, skipping", seg.bone);
                None
            }
        })
        .collect();

    let mut keys = Vec::new();
    for frame in &doc.frames {
        for &(seg, rest_dir) in &segments {
            let (from, to) = match (frame.body.get(&seg.from), frame.body.get(&seg.to)) {
                (Some(a), Some(b)) => (transform.to_world(a), transform.to_world(b)),
                _ => continue,
            };

            let target_dir = match (to - from).try_normalize() {
                Some(d) => d,
                None => continue,
            };

            keys.push(RotationKey {
                bone: seg.bone.clone(),
                frame: frame.frame,
                rotation: Quat::from_rotation_arc(rest_dir, target_dir),
            });
        }
    }

    tracing::debug!(
        "Solved {} rotation keys over {} frames",
        keys.len(),
        doc.frames.len()
    );
    keys
}

fn landmark_set<'a>(frame: &'a FrameRecord, part: BodyPart) -> &'a LandmarkSet {
    match part {
        BodyPart::Body => &frame.body,
        BodyPart::LeftHand => &frame.left_hand,
        BodyPart::RightHand => &frame.right_hand,
    }
}

/// Compute per-frame marker world positions (landmark → marker, 1:1).
pub fn solve_markers(
    doc: &SessionDocument,
    markers: &MarkerMapping,
    transform: &CoordinateTransform,
) -> Vec<PositionKey> {
    let mut keys = Vec::new();
    for frame in &doc.frames {
        for marker in markers.markers() {
            if let Some(point) = landmark_set(frame, marker.part).get(&marker.landmark) {
                keys.push(PositionKey {
                    marker: marker.marker.clone(),
                    frame: frame.frame,
                    location: transform.to_world(point),
                });
            }
        }
    }
    keys
}

/// Set and key each rotation on the rig. Returns the number of keys written.
///
/// Keys for bones the rig does not have are dropped with one warning per bone.
pub fn apply_rotations<R: Rig + ?Sized>(
    rig: &mut R,
    keys: &[RotationKey],
) -> Result<usize, RetargetError> {
    let mut missing = HashSet::new();
    let mut applied = 0;

    for key in keys {
        if !rig.has_bone(&key.bone) {
            if missing.insert(key.bone.as_str()) {
                tracing::warn!("Rig has no bone '{}', dropping its keys", key.bone);
            }
            continue;
        }
        rig.set_rotation(&key.bone, key.frame, key.rotation)?;
        rig.insert_keyframe(&key.bone, key.frame, Channel::Rotation)?;
        applied += 1;
    }

    Ok(applied)
}

/// Set and key each marker location on the rig. Returns the number of keys written.
pub fn apply_positions<R: Rig + ?Sized>(
    rig: &mut R,
    keys: &[PositionKey],
) -> Result<usize, RetargetError> {
    let mut missing = HashSet::new();
    let mut applied = 0;

    for key in keys {
        if !rig.has_bone(&key.marker) {
            if missing.insert(key.marker.as_str()) {
                tracing::warn!("Rig has no marker '{}', dropping its keys", key.marker);
            }
            continue;
        }
        rig.set_location(&key.marker, key.frame, key.location)?;
        rig.insert_keyframe(&key.marker, key.frame, Channel::Location)?;
        applied += 1;
    }

    Ok(applied)
}
