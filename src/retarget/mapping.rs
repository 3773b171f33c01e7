//! Bone and marker mapping tables

use serde::{Deserialize, Serialize};

/// Segment definitions: (bone, from_landmark, to_landmark).
///
/// Landmark names are pose schema names; each bone points from its proximal
/// to its distal joint.
const DEFAULT_SEGMENTS: &[(&str, &str, &str)] = &[
    ("upper_arm.L", "left_shoulder", "left_elbow"),
    ("forearm.L", "left_elbow", "left_wrist"),
    ("upper_arm.R", "right_shoulder", "right_elbow"),
    ("forearm.R", "right_elbow", "right_wrist"),
    ("thigh.L", "left_hip", "left_knee"),
    ("shin.L", "left_knee", "left_ankle"),
    ("thigh.R", "right_hip", "right_knee"),
    ("shin.R", "right_knee", "right_ankle"),
];

/// Body markers: (marker, landmark)
const DEFAULT_BODY_MARKERS: &[(&str, &str)] = &[
    ("Head", "nose"),
    ("L_Shoulder", "left_shoulder"),
    ("R_Shoulder", "right_shoulder"),
    ("L_UpperArm", "left_elbow"),
    ("R_UpperArm", "right_elbow"),
    ("L_Forearm", "left_wrist"),
    ("R_Forearm", "right_wrist"),
    ("L_Hip", "left_hip"),
    ("R_Hip", "right_hip"),
    ("L_Knee", "left_knee"),
    ("R_Knee", "right_knee"),
    ("L_Foot", "left_ankle"),
    ("R_Foot", "right_ankle"),
];

/// Finger tip markers: (finger, hand landmark). Marker names are
/// `<side>_<finger>_3`, the last joint of each finger chain.
const DEFAULT_FINGER_MARKERS: &[(&str, &str)] = &[
    ("Thumb", "thumb_tip"),
    ("Index", "index_tip"),
    ("Middle", "middle_tip"),
    ("Ring", "ring_tip"),
    ("Pinky", "pinky_tip"),
];

/// One rotation-driven bone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoneSegment {
    pub bone: String,
    /// Landmark at the bone head
    pub from: String,
    /// Landmark at the bone tail
    pub to: String,
}

/// Ordered bone → landmark-pair table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoneMapping {
    segments: Vec<BoneSegment>,
}

impl Default for BoneMapping {
    fn default() -> Self {
        Self::new(
            DEFAULT_SEGMENTS
                .iter()
                .map(|&(bone, from, to)| BoneSegment {
                    bone: bone.to_string(),
                    from: from.to_string(),
                    to: to.to_string(),
                })
                .collect(),
        )
    }
}

impl BoneMapping {
    pub fn new(segments: Vec<BoneSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[BoneSegment] {
        &self.segments
    }

    pub fn get(&self, bone: &str) -> Option<&BoneSegment> {
        self.segments.iter().find(|s| s.bone == bone)
    }

    /// All landmark names referenced by the table
    pub fn landmarks(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .flat_map(|s| [s.from.as_str(), s.to.as_str()])
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Which landmark set a marker reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    Body,
    LeftHand,
    RightHand,
}

impl BodyPart {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::LeftHand => "left_hand",
            Self::RightHand => "right_hand",
        }
    }
}

/// One position-driven marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub marker: String,
    #[serde(default = "default_part")]
    pub part: BodyPart,
    pub landmark: String,
}

fn default_part() -> BodyPart {
    BodyPart::Body
}

/// Ordered marker → landmark table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerMapping {
    markers: Vec<Marker>,
}

impl Default for MarkerMapping {
    fn default() -> Self {
        let mut markers: Vec<Marker> = DEFAULT_BODY_MARKERS
            .iter()
            .map(|&(marker, landmark)| Marker {
                marker: marker.to_string(),
                part: BodyPart::Body,
                landmark: landmark.to_string(),
            })
            .collect();

        for (side, part) in [("L", BodyPart::LeftHand), ("R", BodyPart::RightHand)] {
            for &(finger, landmark) in DEFAULT_FINGER_MARKERS {
                markers.push(Marker {
                    marker: format!("{}_{}_3", side, finger),
                    part,
                    landmark: landmark.to_string(),
                });
            }
        }

        Self { markers }
    }
}

impl MarkerMapping {
    pub fn new(markers: Vec<Marker>) -> Self {
        Self { markers }
    }

    /// One body marker per schema landmark, named after the landmark
    pub fn identity<S: AsRef<str>>(body_landmarks: &[S]) -> Self {
        Self {
            markers: body_landmarks
                .iter()
                .map(|name| Marker {
                    marker: name.as_ref().to_string(),
                    part: BodyPart::Body,
                    landmark: name.as_ref().to_string(),
                })
                .collect(),
        }
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::landmark::{hand_index, pose_index};

    #[test]
    fn test_default_bone_mapping() {
        let mapping = BoneMapping::default();
        assert_eq!(mapping.len(), 8);
        let seg = mapping.get("forearm.R").unwrap();
        assert_eq!(seg.from, "right_elbow");
        assert_eq!(seg.to, "right_wrist");
        for name in mapping.landmarks() {
            assert!(pose_index(name).is_some(), "{} is not a pose landmark", name);
        }
    }

    #[test]
    fn test_default_markers_reference_known_landmarks() {
        let markers = MarkerMapping::default();
        assert_eq!(markers.len(), 13 + 10);
        for m in markers.markers() {
            let known = match m.part {
                BodyPart::Body => pose_index(&m.landmark).is_some(),
                _ => hand_index(&m.landmark).is_some(),
            };
            assert!(known, "{} -> {}", m.marker, m.landmark);
        }
        assert!(markers
            .markers()
            .iter()
            .any(|m| m.marker == "R_Pinky_3" && m.part == BodyPart::RightHand));
    }

    #[test]
    fn test_identity_markers() {
        let markers = MarkerMapping::identity(&["nose", "left_hip"]);
        assert_eq!(markers.markers()[1].marker, "left_hip");
        assert_eq!(markers.markers()[1].part, BodyPart::Body);
    }

    #[test]
    fn test_parse_bone_mapping_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            bones: BoneMapping,
        }
        let toml = r#"
            [[bones]]
            bone = "spine"
            from = "left_hip"
            to = "left_shoulder"
        "#;
        let parsed: Wrapper = toml::from_str(toml).unwrap();
        assert_eq!(parsed.bones.len(), 1);
        assert_eq!(parsed.bones.segments()[0].bone, "spine");
    }
}
