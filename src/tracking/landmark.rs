//! Landmark types and the MediaPipe keypoint schema
//!
//! A [`LandmarkSet`] always carries the names of its schema in schema order.
//! An undetected point is stored as `None` and serialized as JSON `null`,
//! never as a zero vector.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// MediaPipe Pose landmark names, indexed by extractor output position.
pub const POSE_LANDMARKS: [&str; 33] = [
    "nose",
    "left_eye_inner",
    "left_eye",
    "left_eye_outer",
    "right_eye_inner",
    "right_eye",
    "right_eye_outer",
    "left_ear",
    "right_ear",
    "mouth_left",
    "mouth_right",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_pinky",
    "right_pinky",
    "left_index",
    "right_index",
    "left_thumb",
    "right_thumb",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
    "left_heel",
    "right_heel",
    "left_foot_index",
    "right_foot_index",
];

/// MediaPipe Hands landmark names, indexed by extractor output position.
pub const HAND_LANDMARKS: [&str; 21] = [
    "wrist",
    "thumb_cmc",
    "thumb_mcp",
    "thumb_ip",
    "thumb_tip",
    "index_mcp",
    "index_pip",
    "index_dip",
    "index_tip",
    "middle_mcp",
    "middle_pip",
    "middle_dip",
    "middle_tip",
    "ring_mcp",
    "ring_pip",
    "ring_dip",
    "ring_tip",
    "pinky_mcp",
    "pinky_pip",
    "pinky_dip",
    "pinky_tip",
];

const LIMB_LANDMARKS: [&str; 12] = [
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// Extractor index of a pose landmark name
pub fn pose_index(name: &str) -> Option<usize> {
    POSE_LANDMARKS.iter().position(|n| *n == name)
}

/// Extractor index of a hand landmark name
pub fn hand_index(name: &str) -> Option<usize> {
    HAND_LANDMARKS.iter().position(|n| *n == name)
}

/// Which body landmarks a session records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodySchema {
    /// All 33 pose landmarks
    Full,
    /// Shoulders, elbows, wrists, hips, knees, ankles
    Limbs,
    /// Nose plus the limb set
    Unreal,
}

impl Default for BodySchema {
    fn default() -> Self {
        Self::Unreal
    }
}

impl BodySchema {
    /// Ordered landmark names for this preset
    pub fn names(&self) -> Vec<&'static str> {
        match self {
            Self::Full => POSE_LANDMARKS.to_vec(),
            Self::Limbs => LIMB_LANDMARKS.to_vec(),
            Self::Unreal => {
                let mut names = Vec::with_capacity(LIMB_LANDMARKS.len() + 1);
                names.push("nose");
                names.extend_from_slice(&LIMB_LANDMARKS);
                names
            }
        }
    }
}

/// A single normalized keypoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    /// Normalized X (0.0 - 1.0 of frame width)
    pub x: f32,
    /// Normalized Y (0.0 - 1.0 of frame height, downwards)
    pub y: f32,
    /// Depth relative to the hip midpoint (body) or wrist (hand)
    pub z: f32,
    /// Visibility score (0.0 - 1.0); hand landmarks carry none
    #[serde(default, alias = "v", skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
        }
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Whether the point passes a strict visibility threshold.
    ///
    /// Points without a visibility score always pass.
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility.map_or(true, |v| v > threshold)
    }
}

/// Named landmark slots for one body part, in schema order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    entries: Vec<(String, Option<LandmarkPoint>)>,
}

impl LandmarkSet {
    /// An all-absent set with one slot per schema name
    pub fn empty<S: AsRef<str>>(schema: &[S]) -> Self {
        Self {
            entries: schema
                .iter()
                .map(|name| (name.as_ref().to_string(), None))
                .collect(),
        }
    }

    /// Set a slot, appending it if the name is new
    pub fn set(&mut self, name: &str, point: Option<LandmarkPoint>) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = point,
            None => self.entries.push((name.to_string(), point)),
        }
    }

    /// The point for `name`, or `None` if absent or not in the set
    pub fn get(&self, name: &str) -> Option<&LandmarkPoint> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, p)| p.as_ref())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Slot names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&LandmarkPoint>)> {
        self.entries.iter().map(|(n, p)| (n.as_str(), p.as_ref()))
    }

    /// Number of slots holding a point
    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|(_, p)| p.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for LandmarkSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, point) in &self.entries {
            map.serialize_entry(name, point)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LandmarkSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor;

        impl<'de> Visitor<'de> for SetVisitor {
            type Value = LandmarkSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of landmark name to point or null")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<LandmarkSet, A::Error> {
                let mut set = LandmarkSet {
                    entries: Vec::with_capacity(access.size_hint().unwrap_or(0)),
                };
                while let Some((name, point)) =
                    access.next_entry::<String, Option<LandmarkPoint>>()?
                {
                    set.set(&name, point);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(SetVisitor)
    }
}
