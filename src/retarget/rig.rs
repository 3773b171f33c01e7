//! Host rig adapter
//!
//! The retargeting solvers are host independent. [`Rig`] is the narrow set of
//! operations they need from an authoring tool or engine: enumerate bones with
//! their rest head/tail, set a pose value at a frame and key it.
//! [`AnimationClip`] is the in-process implementation used by the CLI; it
//! records keyframes and serializes them to JSON.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::RetargetError;
use crate::retarget::mapping::{BoneMapping, MarkerMapping};
use crate::retarget::transform::CoordinateTransform;
use crate::session::FrameRecord;

/// A bone with its rest-pose head and tail in rig world space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigBone {
    pub name: String,
    pub head: Vec3,
    pub tail: Vec3,
}

impl RigBone {
    pub fn new(name: &str, head: Vec3, tail: Vec3) -> Self {
        Self {
            name: name.to_string(),
            head,
            tail,
        }
    }

    /// Normalized head → tail direction, `None` for zero-length bones
    pub fn rest_direction(&self) -> Option<Vec3> {
        (self.tail - self.head).try_normalize()
    }
}

/// Animatable pose channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Rotation,
    Location,
}

/// Operations the retargeting core needs from a host rig
pub trait Rig {
    /// Bones with their rest head/tail positions
    fn bones(&self) -> Vec<RigBone>;

    /// Set a bone's pose-space rotation at `frame`
    fn set_rotation(&mut self, bone: &str, frame: u32, rotation: Quat) -> Result<(), RetargetError>;

    /// Set a bone's location at `frame`
    fn set_location(&mut self, bone: &str, frame: u32, location: Vec3) -> Result<(), RetargetError>;

    /// Key the current value of `channel` on `bone` at `frame`
    fn insert_keyframe(&mut self, bone: &str, frame: u32, channel: Channel) -> Result<(), RetargetError>;

    fn has_bone(&self, bone: &str) -> bool {
        self.bones().iter().any(|b| b.name == bone)
    }
}

/// Rest armature definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Armature {
    pub bones: Vec<RigBone>,
}

/// Built-in T-pose: (bone, head, tail) in Y-up metres, subject facing -Z
const DEFAULT_BODY_BONES: &[(&str, [f32; 3], [f32; 3])] = &[
    ("upper_arm.L", [0.18, 1.40, 0.0], [0.46, 1.40, 0.0]),
    ("forearm.L", [0.46, 1.40, 0.0], [0.72, 1.40, 0.0]),
    ("upper_arm.R", [-0.18, 1.40, 0.0], [-0.46, 1.40, 0.0]),
    ("forearm.R", [-0.46, 1.40, 0.0], [-0.72, 1.40, 0.0]),
    ("thigh.L", [0.10, 0.95, 0.0], [0.10, 0.52, 0.0]),
    ("shin.L", [0.10, 0.52, 0.0], [0.10, 0.08, 0.0]),
    ("thigh.R", [-0.10, 0.95, 0.0], [-0.10, 0.52, 0.0]),
    ("shin.R", [-0.10, 0.52, 0.0], [-0.10, 0.08, 0.0]),
];

impl Armature {
    /// T-pose armature covering the default bone mapping
    pub fn default_body() -> Self {
        Self {
            bones: DEFAULT_BODY_BONES
                .iter()
                .map(|&(name, head, tail)| {
                    RigBone::new(name, Vec3::from_array(head), Vec3::from_array(tail))
                })
                .collect(),
        }
    }

    /// Load an armature from a TOML file of `[[bones]]` tables
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RetargetError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RetargetError::Armature(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(s: &str) -> Result<Self, RetargetError> {
        let armature: Self =
            toml::from_str(s).map_err(|e| RetargetError::Armature(e.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        for bone in &armature.bones {
            if !seen.insert(bone.name.as_str()) {
                return Err(RetargetError::Armature(format!(
                    "duplicate bone '{}'",
                    bone.name
                )));
            }
        }
        Ok(armature)
    }

    /// Rest armature taken from the tracked subject in one frame.
    ///
    /// Each mapped bone runs from its `from` landmark to its `to` landmark in
    /// world space. Bones with an absent endpoint, or whose endpoints
    /// coincide, are left out.
    pub fn from_frame(
        frame: &FrameRecord,
        mapping: &BoneMapping,
        transform: &CoordinateTransform,
    ) -> Result<Self, RetargetError> {
        let mut bones = Vec::with_capacity(mapping.len());
        for seg in mapping.segments() {
            let (head, tail) = match (frame.body.get(&seg.from), frame.body.get(&seg.to)) {
                (Some(a), Some(b)) => (transform.to_world(a), transform.to_world(b)),
                _ => {
                    tracing::debug!(
                        "Frame {} has no '{}'/'{}' pair for bone '{}'",
                        frame.frame,
                        seg.from,
                        seg.to,
                        seg.bone
                    );
                    continue;
                }
            };
            if (tail - head).try_normalize().is_none() {
                tracing::warn!(
                    "Bone '{}' has zero length in frame {}, skipping",
                    seg.bone,
                    frame.frame
                );
                continue;
            }
            bones.push(RigBone::new(&seg.bone, head, tail));
        }

        if bones.is_empty() {
            return Err(RetargetError::Armature(format!(
                "frame {} has no complete bone segments",
                frame.frame
            )));
        }
        tracing::info!("Built {} rest bones from frame {}", bones.len(), frame.frame);
        Ok(Self { bones })
    }

    pub fn get(&self, name: &str) -> Option<&RigBone> {
        self.bones.iter().find(|b| b.name == name)
    }
}

/// Keyframes recorded for one bone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// (frame, [x, y, z, w])
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rotation: Vec<(u32, [f32; 4])>,
    /// (frame, [x, y, z])
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub location: Vec<(u32, [f32; 3])>,
}

#[derive(Debug, Clone, Copy)]
struct PoseValue {
    rotation: Quat,
    location: Vec3,
}

impl Default for PoseValue {
    fn default() -> Self {
        Self {
            rotation: Quat::IDENTITY,
            location: Vec3::ZERO,
        }
    }
}

/// Keyframe recording rig
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationClip {
    pub fps: u32,
    pub frame_start: u32,
    pub frame_end: u32,
    #[serde(skip)]
    bones: Vec<RigBone>,
    #[serde(skip)]
    current: HashMap<String, PoseValue>,
    pub tracks: BTreeMap<String, Track>,
}

impl AnimationClip {
    /// Clip over the bones of an armature
    pub fn new(fps: u32, armature: &Armature) -> Self {
        Self {
            fps,
            frame_start: 1,
            frame_end: 1,
            bones: armature.bones.clone(),
            current: HashMap::new(),
            tracks: BTreeMap::new(),
        }
    }

    /// Clip over point-like marker objects (zero-length bones at the origin)
    pub fn for_markers(fps: u32, markers: &MarkerMapping) -> Self {
        let armature = Armature {
            bones: markers
                .markers()
                .iter()
                .map(|m| RigBone::new(&m.marker, Vec3::ZERO, Vec3::ZERO))
                .collect(),
        };
        Self::new(fps, &armature)
    }

    /// Set the keyed frame range, e.g. `1..=total_frames`
    pub fn set_frame_range(&mut self, start: u32, end: u32) {
        self.frame_start = start;
        self.frame_end = end.max(start);
    }

    pub fn track(&self, bone: &str) -> Option<&Track> {
        self.tracks.get(bone)
    }

    /// Total number of keys across all tracks and channels
    pub fn key_count(&self) -> usize {
        self.tracks
            .values()
            .map(|t| t.rotation.len() + t.location.len())
            .sum()
    }

    pub fn to_json(&self) -> Result<String, RetargetError> {
        serde_json::to_string_pretty(self).map_err(|e| RetargetError::Write(e.to_string()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RetargetError> {
        let json = self.to_json()?;
        std::fs::write(path.as_ref(), json).map_err(|e| {
            RetargetError::Write(format!("{}: {}", path.as_ref().display(), e))
        })
    }

    fn pose_mut(&mut self, bone: &str) -> Result<&mut PoseValue, RetargetError> {
        if !self.bones.iter().any(|b| b.name == bone) {
            return Err(RetargetError::UnknownBone(bone.to_string()));
        }
        Ok(self.current.entry(bone.to_string()).or_default())
    }
}

/// Replace the key at `frame` or insert it keeping frame order
fn upsert<T>(keys: &mut Vec<(u32, T)>, frame: u32, value: T) {
    match keys.binary_search_by_key(&frame, |(f, _)| *f) {
        Ok(i) => keys[i].1 = value,
        Err(i) => keys.insert(i, (frame, value)),
    }
}

impl Rig for AnimationClip {
    fn bones(&self) -> Vec<RigBone> {
        self.bones.clone()
    }

    fn set_rotation(&mut self, bone: &str, _frame: u32, rotation: Quat) -> Result<(), RetargetError> {
        self.pose_mut(bone)?.rotation = rotation;
        Ok(())
    }

    fn set_location(&mut self, bone: &str, _frame: u32, location: Vec3) -> Result<(), RetargetError> {
        self.pose_mut(bone)?.location = location;
        Ok(())
    }

    fn insert_keyframe(&mut self, bone: &str, frame: u32, channel: Channel) -> Result<(), RetargetError> {
        let value = *self.pose_mut(bone)?;
        let track = self.tracks.entry(bone.to_string()).or_default();
        match channel {
            Channel::Rotation => upsert(&mut track.rotation, frame, value.rotation.to_array()),
            Channel::Location => upsert(&mut track.location, frame, value.location.to_array()),
        }
        self.frame_end = self.frame_end.max(frame);
        Ok(())
    }

    fn has_bone(&self, bone: &str) -> bool {
        self.bones.iter().any(|b| b.name == bone)
    }
}
