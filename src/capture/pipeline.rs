//! Capture loop: detection source → recorder (and optional live sender)

use std::sync::atomic::{AtomicBool, Ordering};

use crate::capture::recorder::{FrameRecorder, RecordOutcome};
use crate::tracking::extractor::{DetectionSource, FrameEvent};
use crate::tracking::sender::DatagramSender;

/// Counters for one capture run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub processed: u32,
    pub retained: u32,
    /// Frames dropped by the admission policy
    pub rejected: u32,
    /// Frames whose detection failed
    pub failed: u32,
    /// Stopped by the stop flag rather than end of source
    pub interrupted: bool,
    /// The source failed mid-stream; frames recorded before it are kept
    pub source_error: Option<String>,
}

/// Drive `source` until it is exhausted or `stop` is set.
///
/// Per-frame detection failures are skipped. A source read error ends the
/// loop and is reported in [`CaptureStats::source_error`]; the recorder keeps
/// everything retained up to that point. Every processed detection is also
/// handed to `sink` when one is given, regardless of whether the recorder
/// retains it. The stop flag is checked once per frame.
pub fn run_capture<S>(
    source: &mut S,
    recorder: &mut FrameRecorder,
    mut sink: Option<&mut DatagramSender>,
    stop: &AtomicBool,
    progress_interval: u32,
) -> CaptureStats
where
    S: DetectionSource + ?Sized,
{
    let mut stats = CaptureStats::default();
    let interval = progress_interval.max(1);

    loop {
        if stop.load(Ordering::Relaxed) {
            tracing::info!("Capture interrupted after {} frames", stats.processed);
            stats.interrupted = true;
            break;
        }

        let event = match source.next_event() {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(
                    "Extractor stream failed after {} frames: {}",
                    stats.processed,
                    e
                );
                stats.source_error = Some(e.to_string());
                break;
            }
        };

        match event {
            FrameEvent::Detected(detection) => {
                if let Some(sender) = sink.as_deref_mut() {
                    sender.send(&detection);
                }
                match recorder.record(&detection) {
                    RecordOutcome::Retained => stats.retained += 1,
                    RecordOutcome::Rejected { .. } => stats.rejected += 1,
                }
            }
            FrameEvent::Failed(reason) => {
                recorder.skip(&reason);
                stats.failed += 1;
            }
        }

        stats.processed = recorder.processed();
        if stats.processed % interval == 0 {
            tracing::info!(
                "Processed {} frames ({} retained)",
                stats.processed,
                stats.retained
            );
        }
    }

    tracing::info!(
        "Capture finished: {} processed, {} retained, {} rejected, {} failed",
        stats.processed,
        stats.retained,
        stats.rejected,
        stats.failed
    );

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::recorder::RecorderPolicy;
    use crate::error::CaptureError;
    use crate::tracking::extractor::{RawDetection, SourceInfo};
    use crate::tracking::landmark::{LandmarkPoint, HAND_LANDMARKS};
    use std::collections::VecDeque;

    struct ScriptedSource {
        info: SourceInfo,
        events: VecDeque<FrameEvent>,
    }

    impl ScriptedSource {
        fn new(events: Vec<FrameEvent>) -> Self {
            Self {
                info: SourceInfo {
                    fps: 30.0,
                    width: 640,
                    height: 480,
                    frame_count: None,
                },
                events: events.into(),
            }
        }
    }

    impl DetectionSource for ScriptedSource {
        fn source_info(&self) -> &SourceInfo {
            &self.info
        }

        fn next_event(&mut self) -> Result<Option<FrameEvent>, CaptureError> {
            Ok(self.events.pop_front())
        }
    }

    fn body_frame() -> FrameEvent {
        let points = (0..33)
            .map(|i| Some(LandmarkPoint::new(i as f32 / 33.0, 0.5, 0.0).with_visibility(0.9)))
            .collect();
        FrameEvent::Detected(RawDetection {
            body: Some(points),
            hands: Vec::new(),
        })
    }

    fn recorder(policy: RecorderPolicy) -> FrameRecorder {
        FrameRecorder::new(
            &["left_shoulder", "left_elbow", "left_wrist"],
            &HAND_LANDMARKS[..2],
            policy,
            SourceInfo {
                fps: 30.0,
                width: 640,
                height: 480,
                frame_count: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_failed_frames_are_skipped() {
        let mut source = ScriptedSource::new(vec![
            body_frame(),
            FrameEvent::Failed("graph timeout".to_string()),
            body_frame(),
        ]);
        let mut rec = recorder(RecorderPolicy::default());
        let stop = AtomicBool::new(false);

        let stats = run_capture(&mut source, &mut rec, None, &stop, 30);
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.retained, 2);
        assert_eq!(stats.failed, 1);
        assert!(!stats.interrupted);

        let doc = rec.finish();
        let frames: Vec<u32> = doc.frames.iter().map(|f| f.frame).collect();
        assert_eq!(frames, vec![1, 3]);
        assert_eq!(doc.metadata.processed_frames, 3);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_rejected_frames_are_counted() {
        let mut source = ScriptedSource::new(vec![
            FrameEvent::Detected(RawDetection::default()),
            body_frame(),
        ]);
        let mut rec = recorder(RecorderPolicy {
            min_visible_body: Some(2),
            ..Default::default()
        });
        let stop = AtomicBool::new(false);

        let stats = run_capture(&mut source, &mut rec, None, &stop, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.retained, 1);
        assert_eq!(rec.frames()[0].frame, 2);
    }

    #[test]
    fn test_stop_flag_ends_capture() {
        let mut source = ScriptedSource::new(vec![body_frame(), body_frame()]);
        let mut rec = recorder(RecorderPolicy::default());
        let stop = AtomicBool::new(true);

        let stats = run_capture(&mut source, &mut rec, None, &stop, 30);
        assert!(stats.interrupted);
        assert_eq!(stats.processed, 0);
        assert_eq!(rec.finish().frames.len(), 0);
    }

    struct BrokenSource {
        info: SourceInfo,
        events: VecDeque<FrameEvent>,
    }

    impl DetectionSource for BrokenSource {
        fn source_info(&self) -> &SourceInfo {
            &self.info
        }

        fn next_event(&mut self) -> Result<Option<FrameEvent>, CaptureError> {
            match self.events.pop_front() {
                Some(event) => Ok(Some(event)),
                None => Err(CaptureError::Subprocess("pipe closed".to_string())),
            }
        }
    }

    #[test]
    fn test_source_error_keeps_recorded_frames() {
        let mut source = BrokenSource {
            info: ScriptedSource::new(Vec::new()).info,
            events: vec![body_frame(), body_frame()].into(),
        };
        let mut rec = recorder(RecorderPolicy::default());
        let stop = AtomicBool::new(false);

        let stats = run_capture(&mut source, &mut rec, None, &stop, 30);
        assert_eq!(stats.retained, 2);
        assert!(stats.source_error.unwrap().contains("pipe closed"));

        let doc = rec.finish();
        assert_eq!(doc.frames.len(), 2);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_sender_receives_every_detection() {
        let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();
        let mut sender = DatagramSender::new(&crate::config::SenderConfig {
            enabled: true,
            address: "127.0.0.1".to_string(),
            port,
        })
        .unwrap();

        let mut source = ScriptedSource::new(vec![
            body_frame(),
            FrameEvent::Failed("boom".to_string()),
            FrameEvent::Detected(RawDetection::default()),
        ]);
        let mut rec = recorder(RecorderPolicy::default());
        let stop = AtomicBool::new(false);

        run_capture(&mut source, &mut rec, Some(&mut sender), &stop, 30);
        assert_eq!(sender.sent(), 2);

        let mut buf = [0u8; 8192];
        let n = receiver.recv(&mut buf).unwrap();
        let first: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(first.as_object().unwrap().len(), 33);
        let n = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"{}");
    }
}
