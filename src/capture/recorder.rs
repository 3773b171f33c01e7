//! Frame recorder
//!
//! Turns raw extractor detections into [`FrameRecord`]s with a fixed schema
//! and accumulates them into a session.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::session::{FrameRecord, SessionDocument, SessionMetadata, TimestampOrigin};
use crate::tracking::extractor::{RawDetection, RawHand, SourceInfo};
use crate::tracking::landmark::{hand_index, pose_index, LandmarkPoint, LandmarkSet};

/// Per-point and per-frame acceptance rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderPolicy {
    /// Body points at or below this visibility are recorded as absent
    pub visibility_threshold: Option<f32>,
    /// Frames with fewer present body points are not retained
    pub min_visible_body: Option<usize>,
    pub timestamp_origin: TimestampOrigin,
}

impl Default for RecorderPolicy {
    fn default() -> Self {
        Self {
            visibility_threshold: None,
            min_visible_body: None,
            timestamp_origin: TimestampOrigin::ZeroBased,
        }
    }
}

impl RecorderPolicy {
    /// Visibility gate at 0.5 and at least 8 visible body points per frame
    pub fn filtered() -> Self {
        Self {
            visibility_threshold: Some(0.5),
            min_visible_body: Some(8),
            ..Default::default()
        }
    }
}

/// What happened to a recorded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Retained,
    /// Rejected by the admission policy; `visible` body points were present
    Rejected { visible: usize },
}

/// Which hand slot a detected hand fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// Parse an extractor label ("Left" / "Right", any case)
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "left" | "l" => Some(Self::Left),
            "right" | "r" => Some(Self::Right),
            _ => None,
        }
    }
}

/// Split detected hands into (left, right).
///
/// Labelled hands take their labelled slot first. Unlabelled hands, and
/// labelled ones whose slot is taken, fall back to detection order: index 0
/// prefers left, later indices prefer right, and either takes the other slot
/// when its preferred one is occupied. Hands beyond two are dropped.
pub fn assign_hands(hands: &[RawHand]) -> (Option<&RawHand>, Option<&RawHand>) {
    let mut left: Option<&RawHand> = None;
    let mut right: Option<&RawHand> = None;
    let mut unassigned = Vec::new();

    for (i, hand) in hands.iter().enumerate() {
        match hand.handedness.as_deref().and_then(Handedness::from_label) {
            Some(Handedness::Left) if left.is_none() => left = Some(hand),
            Some(Handedness::Right) if right.is_none() => right = Some(hand),
            _ => unassigned.push((i, hand)),
        }
    }

    for (i, hand) in unassigned {
        let prefer_left = i == 0;
        match (prefer_left, left.is_none(), right.is_none()) {
            (true, true, _) | (false, true, false) => left = Some(hand),
            (false, _, true) | (true, false, true) => right = Some(hand),
            _ => tracing::debug!("Dropping extra hand at detection index {}", i),
        }
    }

    (left, right)
}

/// Accumulates frame records for one capture session
pub struct FrameRecorder {
    body: Vec<(String, usize)>,
    hand: Vec<(String, usize)>,
    policy: RecorderPolicy,
    source: SourceInfo,
    fps: u32,
    processed: u32,
    frames: Vec<FrameRecord>,
}

impl FrameRecorder {
    /// Build a recorder for the given landmark schema.
    ///
    /// Every name must be a known MediaPipe pose or hand landmark.
    pub fn new<S: AsRef<str>>(
        body_schema: &[S],
        hand_schema: &[S],
        policy: RecorderPolicy,
        source: SourceInfo,
    ) -> Result<Self, ConfigError> {
        let body = resolve(body_schema, pose_index, "capture.body_landmarks")?;
        let hand = resolve(hand_schema, hand_index, "capture.hand_landmarks")?;
        let fps = crate::session::clamp_fps(source.fps);

        Ok(Self {
            body,
            hand,
            policy,
            source,
            fps,
            processed: 0,
            frames: Vec::new(),
        })
    }

    /// Clamped session frame rate
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Source frames seen so far (retained, rejected and failed)
    pub fn processed(&self) -> u32 {
        self.processed
    }

    /// Frames retained so far
    pub fn retained(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&FrameRecord> {
        self.frames.last()
    }

    /// Record the next source frame
    pub fn record(&mut self, detection: &RawDetection) -> RecordOutcome {
        self.processed += 1;
        let record = self.build_frame(self.processed, detection);

        if let Some(min) = self.policy.min_visible_body {
            let visible = record.body.present_count();
            if visible < min {
                tracing::trace!(
                    "Frame {} rejected: {} of {} body points visible",
                    record.frame,
                    visible,
                    min
                );
                return RecordOutcome::Rejected { visible };
            }
        }

        self.frames.push(record);
        RecordOutcome::Retained
    }

    /// Count a source frame whose detection failed; nothing is retained
    pub fn skip(&mut self, reason: &str) {
        self.processed += 1;
        tracing::warn!("Error processing frame {}: {}", self.processed, reason);
    }

    /// Build the record for source frame `frame` without retaining it
    pub fn build_frame(&self, frame: u32, detection: &RawDetection) -> FrameRecord {
        let mut body = LandmarkSet::empty(&self.body_names());
        if let Some(points) = &detection.body {
            for (name, idx) in &self.body {
                let point = points.get(*idx).copied().flatten().filter(|p| {
                    self.policy
                        .visibility_threshold
                        .map_or(true, |t| p.is_visible(t))
                });
                body.set(name, point);
            }
        }

        let (left, right) = assign_hands(&detection.hands);

        FrameRecord {
            frame,
            timestamp: self.policy.timestamp_origin.timestamp(frame, self.fps),
            body,
            left_hand: self.hand_set(left),
            right_hand: self.hand_set(right),
        }
    }

    fn body_names(&self) -> Vec<&str> {
        self.body.iter().map(|(n, _)| n.as_str()).collect()
    }

    fn hand_set(&self, hand: Option<&RawHand>) -> LandmarkSet {
        let names: Vec<&str> = self.hand.iter().map(|(n, _)| n.as_str()).collect();
        let mut set = LandmarkSet::empty(&names);
        if let Some(hand) = hand {
            for (name, idx) in &self.hand {
                let point = hand
                    .landmarks
                    .get(*idx)
                    .copied()
                    .flatten()
                    .map(|p| LandmarkPoint::new(p.x, p.y, p.z));
                set.set(name, point);
            }
        }
        set
    }

    /// Close the session
    pub fn finish(self) -> SessionDocument {
        let metadata = SessionMetadata::new(
            self.source.fps,
            self.source.width,
            self.source.height,
            self.body.into_iter().map(|(n, _)| n).collect(),
            self.hand.into_iter().map(|(n, _)| n).collect(),
            self.policy.timestamp_origin,
        )
        .with_counts(self.frames.len() as u32, self.processed);

        SessionDocument {
            metadata,
            frames: self.frames,
        }
    }
}

fn resolve<S: AsRef<str>>(
    names: &[S],
    index_of: fn(&str) -> Option<usize>,
    field: &str,
) -> Result<Vec<(String, usize)>, ConfigError> {
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            index_of(name)
                .map(|idx| (name.to_string(), idx))
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("unknown landmark '{}'", name),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::landmark::{BodySchema, HAND_LANDMARKS, POSE_LANDMARKS};

    fn body_points(visibility: f32) -> Vec<Option<LandmarkPoint>> {
        (0..POSE_LANDMARKS.len())
            .map(|i| {
                Some(LandmarkPoint::new(i as f32 / 100.0, 0.5, 0.0).with_visibility(visibility))
            })
            .collect()
    }

    fn hand(label: Option<&str>, x: f32) -> RawHand {
        RawHand {
            handedness: label.map(str::to_string),
            landmarks: (0..HAND_LANDMARKS.len())
                .map(|_| Some(LandmarkPoint::new(x, 0.5, 0.0).with_visibility(1.0)))
                .collect(),
        }
    }

    fn recorder(policy: RecorderPolicy) -> FrameRecorder {
        let source = SourceInfo {
            fps: 30.0,
            width: 1280,
            height: 720,
            frame_count: None,
        };
        FrameRecorder::new(&BodySchema::Limbs.names(), &HAND_LANDMARKS, policy, source).unwrap()
    }

    #[test]
    fn test_full_schema_present_even_when_undetected() {
        let mut rec = recorder(RecorderPolicy::default());
        rec.record(&RawDetection::default());

        let frame = rec.last_frame().unwrap();
        assert_eq!(frame.body.len(), 12);
        assert_eq!(frame.body.present_count(), 0);
        assert_eq!(frame.left_hand.len(), 21);
        assert_eq!(frame.right_hand.present_count(), 0);
    }

    #[test]
    fn test_body_points_read_by_pose_index() {
        let mut rec = recorder(RecorderPolicy::default());
        rec.record(&RawDetection {
            body: Some(body_points(0.9)),
            hands: Vec::new(),
        });

        let frame = rec.last_frame().unwrap();
        let shoulder = frame.body.get("left_shoulder").unwrap();
        assert!((shoulder.x - 0.11).abs() < 1e-6);
        assert_eq!(shoulder.visibility, Some(0.9));
        assert!((frame.body.get("right_ankle").unwrap().x - 0.28).abs() < 1e-6);
    }

    #[test]
    fn test_short_body_vector_leaves_points_absent() {
        let mut rec = recorder(RecorderPolicy::default());
        let mut points = body_points(0.9);
        points.truncate(20);
        points[13] = None;
        rec.record(&RawDetection {
            body: Some(points),
            hands: Vec::new(),
        });

        let frame = rec.last_frame().unwrap();
        assert!(frame.body.get("left_shoulder").is_some());
        assert!(frame.body.get("left_elbow").is_none());
        assert!(frame.body.get("left_hip").is_none());
    }

    #[test]
    fn test_visibility_threshold_applies_to_body_only() {
        let policy = RecorderPolicy {
            visibility_threshold: Some(0.5),
            ..Default::default()
        };
        let mut rec = recorder(policy);
        rec.record(&RawDetection {
            body: Some(body_points(0.5)),
            hands: vec![hand(Some("Left"), 0.3)],
        });

        let frame = rec.last_frame().unwrap();
        assert_eq!(frame.body.present_count(), 0);
        assert_eq!(frame.left_hand.present_count(), 21);
        assert_eq!(frame.left_hand.get("wrist").unwrap().visibility, None);
    }

    #[test]
    fn test_admission_policy_counts_processed() {
        let mut rec = recorder(RecorderPolicy::filtered());
        assert_eq!(rec.record(&RawDetection::default()), RecordOutcome::Rejected { visible: 0 });

        let mut points = body_points(0.9);
        for p in points.iter_mut().skip(11).take(5) {
            *p = None;
        }
        assert_eq!(
            rec.record(&RawDetection { body: Some(points), hands: Vec::new() }),
            RecordOutcome::Rejected { visible: 7 }
        );

        assert_eq!(
            rec.record(&RawDetection { body: Some(body_points(0.9)), hands: Vec::new() }),
            RecordOutcome::Retained
        );
        rec.skip("extractor timeout");

        let doc = rec.finish();
        assert_eq!(doc.metadata.total_frames, 1);
        assert_eq!(doc.metadata.processed_frames, 4);
        assert_eq!(doc.frames[0].frame, 3);
        assert!((doc.metadata.duration - 1.0 / 30.0).abs() < 1e-9);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_timestamps_follow_origin() {
        let mut rec = recorder(RecorderPolicy {
            timestamp_origin: TimestampOrigin::OneBased,
            ..Default::default()
        });
        rec.record(&RawDetection::default());
        rec.record(&RawDetection::default());
        let frames = rec.frames();
        assert!((frames[0].timestamp - 1.0 / 30.0).abs() < 1e-12);
        assert!((frames[1].timestamp - 2.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_assign_hands_by_label() {
        let hands = vec![hand(Some("Right"), 0.1), hand(Some("left"), 0.2)];
        let (left, right) = assign_hands(&hands);
        assert!((left.unwrap().landmarks[0].unwrap().x - 0.2).abs() < 1e-6);
        assert!((right.unwrap().landmarks[0].unwrap().x - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_assign_hands_by_order_without_labels() {
        let hands = vec![hand(None, 0.1), hand(None, 0.2)];
        let (left, right) = assign_hands(&hands);
        assert!((left.unwrap().landmarks[0].unwrap().x - 0.1).abs() < 1e-6);
        assert!((right.unwrap().landmarks[0].unwrap().x - 0.2).abs() < 1e-6);

        let single = vec![hand(None, 0.3)];
        let (left, right) = assign_hands(&single);
        assert!(left.is_some());
        assert!(right.is_none());
    }

    #[test]
    fn test_assign_hands_label_collision_takes_free_slot() {
        let hands = vec![hand(Some("Left"), 0.1), hand(Some("Left"), 0.2), hand(None, 0.3)];
        let (left, right) = assign_hands(&hands);
        assert!((left.unwrap().landmarks[0].unwrap().x - 0.1).abs() < 1e-6);
        assert!((right.unwrap().landmarks[0].unwrap().x - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_schema_name_rejected() {
        let result = FrameRecorder::new(
            &["nose", "antenna"],
            &["wrist"],
            RecorderPolicy::default(),
            SourceInfo::default(),
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_fps_clamped_from_source() {
        let source = SourceInfo {
            fps: 0.0,
            ..Default::default()
        };
        let rec = FrameRecorder::new(&["nose"], &["wrist"], RecorderPolicy::default(), source)
            .unwrap();
        assert_eq!(rec.fps(), 30);
        assert_eq!(rec.finish().metadata.fps, 30);
    }
}
