//! Append-only CSV log of per-frame facial measurements.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use facelens_vision::FaceAnalysis;

pub const HEADERS: [&str; 9] = [
    "Image Path",
    "Face Width",
    "Left Eyebrow",
    "Right Eyebrow",
    "Mouth Openness",
    "Left Eye Openness",
    "Right Eye Openness",
    "Vertical Tilt",
    "Horizontal Tilt",
];

const MISSING: &str = "N/A";

pub struct FeatureLog {
    path: PathBuf,
}

impl FeatureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is new.
    pub fn append(&self, image_path: &str, features: &FaceAnalysis) -> Result<()> {
        let is_new = !self.path.exists();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;

        let mut out = String::new();
        if is_new {
            out.push_str(&HEADERS.join(","));
            out.push_str("\r\n");
        }
        out.push_str(&format_row(image_path, features));
        out.push_str("\r\n");

        file.write_all(out.as_bytes())
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

fn format_row(image_path: &str, f: &FaceAnalysis) -> String {
    let values = [
        f.face_width,
        f.left_eyebrow_distance,
        f.right_eyebrow_distance,
        f.mouth_openness,
        f.left_eye_openness,
        f.right_eye_openness,
        f.vertical_tilt,
        f.horizontal_tilt,
    ];

    let mut fields = Vec::with_capacity(HEADERS.len());
    fields.push(escape(image_path));
    fields.extend(values.iter().map(|v| {
        if v.is_finite() {
            v.to_string()
        } else {
            MISSING.to_string()
        }
    }));
    fields.join(",")
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis() -> FaceAnalysis {
        FaceAnalysis {
            face_width: 120.5,
            left_eyebrow_distance: 14.0,
            right_eyebrow_distance: 13.25,
            mouth_openness: 3.0,
            left_eye_openness: 6.5,
            right_eye_openness: 6.0,
            vertical_tilt: 171.0,
            horizontal_tilt: 12.5,
        }
    }

    #[test]
    fn header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = FeatureLog::new(dir.path().join("features.csv"));

        log.append("output/processed_frame_1.jpg", &analysis()).unwrap();
        log.append("output/processed_frame_2.jpg", &analysis()).unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADERS.join(","));
        assert_eq!(
            lines[1],
            "output/processed_frame_1.jpg,120.5,14,13.25,3,6.5,6,171,12.5"
        );
        assert!(lines[2].starts_with("output/processed_frame_2.jpg,"));
    }

    #[test]
    fn existing_file_gets_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.csv");
        std::fs::write(&path, "").unwrap();

        FeatureLog::new(&path).append("frame", &analysis()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("frame,120.5"));
    }

    #[test]
    fn non_finite_values_are_missing() {
        let mut f = analysis();
        f.vertical_tilt = f32::NAN;
        let row = format_row("x", &f);
        assert!(row.ends_with(",N/A,12.5"));
    }

    #[test]
    fn awkward_paths_are_quoted() {
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let log = FeatureLog::new(dir.path().join("logs/nested/features.csv"));
        log.append("frame", &analysis()).unwrap();
        assert!(log.path().exists());
    }
}
