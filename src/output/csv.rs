//! Flat per-frame CSV table for engine data-table import
//!
//! One row per retained frame: `Frame,Timestamp` followed by an
//! `<part>_X,<part>_Y,<part>_Z` triple per exported body landmark. A landmark
//! that was not detected is written as `0,0,0`, so consumers cannot tell it
//! apart from the origin unless `include_presence` adds a `<part>_Valid`
//! column.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::retarget::transform::CoordinateTransform;
use crate::session::{FrameRecord, SessionDocument};

/// Session → CSV writer
#[derive(Debug, Clone)]
pub struct CsvExporter {
    parts: Vec<String>,
    transform: CoordinateTransform,
    include_presence: bool,
    precision: usize,
}

impl CsvExporter {
    pub fn new(config: &ExportConfig) -> Result<Self, ExportError> {
        if config.parts.is_empty() {
            return Err(ExportError::NoParts);
        }
        Ok(Self {
            parts: config.parts.clone(),
            transform: config.transform,
            include_presence: config.include_presence,
            precision: config.precision,
        })
    }

    /// Column names in output order
    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["Frame".to_string(), "Timestamp".to_string()];
        for part in &self.parts {
            header.push(format!("{}_X", part));
            header.push(format!("{}_Y", part));
            header.push(format!("{}_Z", part));
        }
        if self.include_presence {
            header.extend(self.parts.iter().map(|part| format!("{}_Valid", part)));
        }
        header
    }

    /// Write the table for `doc`. Returns the number of data rows.
    pub fn write<W: Write>(&self, doc: &SessionDocument, writer: W) -> Result<usize, ExportError> {
        for part in &self.parts {
            if !doc.metadata.body_landmarks.iter().any(|n| n == part) {
                tracing::warn!(
                    "Part '{}' is not recorded in this session, its columns will be zero",
                    part
                );
            }
        }

        let mut wtr = WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);

        wtr.write_record(self.header())?;
        for frame in &doc.frames {
            wtr.write_record(self.row(frame))?;
        }
        wtr.flush().map_err(|e| ExportError::Csv(e.to_string()))?;

        Ok(doc.frames.len())
    }

    /// Write the table to `path`
    pub fn save<P: AsRef<Path>>(&self, doc: &SessionDocument, path: P) -> Result<usize, ExportError> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| ExportError::Csv(format!("{}: {}", path.display(), e)))?;
        let rows = self.write(doc, file)?;
        tracing::info!("Wrote {} rows to {}", rows, path.display());
        Ok(rows)
    }

    fn row(&self, frame: &FrameRecord) -> Vec<String> {
        let mut row = Vec::with_capacity(2 + self.parts.len() * 4);
        row.push(frame.frame.to_string());
        row.push(frame.timestamp.to_string());

        let mut presence = Vec::new();
        for part in &self.parts {
            match frame.body.get(part) {
                Some(point) => {
                    let world = self.transform.to_world(point);
                    row.push(self.format(world.x));
                    row.push(self.format(world.y));
                    row.push(self.format(world.z));
                    presence.push("1".to_string());
                }
                None => {
                    row.extend(["0", "0", "0"].map(String::from));
                    presence.push("0".to_string());
                }
            }
        }

        if self.include_presence {
            row.extend(presence);
        }
        row
    }

    fn format(&self, value: f32) -> String {
        let factor = 10f64.powi(self.precision as i32);
        let rounded = (value as f64 * factor).round() / factor;
        // no "-0.00"
        let rounded = if rounded == 0.0 { 0.0 } else { rounded };
        format!("{:.*}", self.precision, rounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionMetadata, TimestampOrigin};
    use crate::tracking::landmark::{BodySchema, LandmarkPoint, LandmarkSet};

    fn session(frames: Vec<FrameRecord>) -> SessionDocument {
        let body = BodySchema::Unreal
            .names()
            .into_iter()
            .map(String::from)
            .collect();
        let metadata = SessionMetadata::new(30.0, 640, 480, body, Vec::new(), TimestampOrigin::ZeroBased)
            .with_counts(frames.len() as u32, frames.len() as u32);
        SessionDocument { metadata, frames }
    }

    fn frame(index: u32, points: &[(&str, [f32; 3])]) -> FrameRecord {
        let mut body = LandmarkSet::empty(&BodySchema::Unreal.names());
        for &(name, [x, y, z]) in points {
            body.set(name, Some(LandmarkPoint::new(x, y, z)));
        }
        FrameRecord {
            frame: index,
            timestamp: (index - 1) as f64 / 30.0,
            body,
            left_hand: LandmarkSet::empty::<&str>(&[]),
            right_hand: LandmarkSet::empty::<&str>(&[]),
        }
    }

    fn render(exporter: &CsvExporter, doc: &SessionDocument) -> String {
        let mut out = Vec::new();
        exporter.write(doc, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn column(header: &[&str], name: &str) -> usize {
        header.iter().position(|h| *h == name).unwrap()
    }

    #[test]
    fn test_header_order() {
        let exporter = CsvExporter::new(&ExportConfig::default()).unwrap();
        let header = exporter.header();
        assert_eq!(header.len(), 2 + 13 * 3);
        assert_eq!(&header[..5], &["Frame", "Timestamp", "nose_X", "nose_Y", "nose_Z"]);
        assert_eq!(header.last().unwrap(), "right_ankle_Z");
    }

    #[test]
    fn test_missing_landmark_is_zero_filled() {
        let exporter = CsvExporter::new(&ExportConfig::default()).unwrap();
        let doc = session(vec![frame(1, &[("left_knee", [0.75, 0.25, -0.1])])]);
        let text = render(&exporter, &doc);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let header: Vec<&str> = lines[0].split(',').collect();
        let row: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(row.len(), header.len());

        let knee = column(&header, "right_knee_X");
        assert_eq!(&row[knee..knee + 3], &["0", "0", "0"]);

        let knee = column(&header, "left_knee_X");
        assert_eq!(&row[knee..knee + 3], &["50.00", "-50.00", "20.00"]);

        assert_eq!(row[0], "1");
        assert_eq!(row[1], "0");
        assert!(row.iter().all(|f| !f.is_empty()));
    }

    #[test]
    fn test_presence_columns() {
        let config = ExportConfig {
            parts: vec!["nose".into(), "right_knee".into()],
            include_presence: true,
            precision: 1,
            ..Default::default()
        };
        let exporter = CsvExporter::new(&config).unwrap();
        let doc = session(vec![frame(2, &[("nose", [0.5, 0.5, 0.0])])]);
        let text = render(&exporter, &doc);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "Frame,Timestamp,nose_X,nose_Y,nose_Z,right_knee_X,right_knee_Y,right_knee_Z,nose_Valid,right_knee_Valid"
        );
        assert!(lines[1].starts_with("2,"));
        assert!(lines[1].ends_with(",0.0,0.0,0.0,0,0,0,1,0"), "{}", lines[1]);
    }

    #[test]
    fn test_empty_session_has_header_only() {
        let exporter = CsvExporter::new(&ExportConfig::default()).unwrap();
        let text = render(&exporter, &session(Vec::new()));
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_no_parts() {
        let config = ExportConfig {
            parts: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(CsvExporter::new(&config), Err(ExportError::NoParts)));
    }

    #[test]
    fn test_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        let exporter = CsvExporter::new(&ExportConfig::default()).unwrap();
        let rows = exporter
            .save(&session(vec![frame(1, &[]), frame(2, &[])]), &path)
            .unwrap();
        assert_eq!(rows, 2);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
